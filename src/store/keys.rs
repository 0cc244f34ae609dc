//! Session key canonicalization.
//!
//! `sanitize_session_id` maps every character outside `[A-Za-z0-9_.-]` to `_`,
//! strips leading and trailing dots, and collapses runs of underscores into one.
//! The result is safe as a file name and as a sled key, but it is lossy:
//! `2024-01-01T10:00:00` and `2024-01-01T10_00_00` both sanitize to
//! `2024-01-01T10_00_00`.
//!
//! `session_key` removes that ambiguity. An id that sanitizes to itself is used
//! verbatim. Any other id gets `__` plus the first 16 hex digits of its SHA-256.
//! Sanitized text never contains `__`, so a verbatim key can never equal a
//! suffixed one, and two suffixed keys only collide on a hash collision.

use sha2::{Digest, Sha256};

use crate::store::StoreError;

const KEY_HASH_HEX_LEN: usize = 16;

/// Upper bound on externally supplied session ids.
pub const MAX_SESSION_ID_LEN: usize = 256;

pub fn sanitize_session_id(session_id: &str) -> String {
    let replaced: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.trim_matches('.').chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

pub fn session_key(session_id: &str) -> Result<String, StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::Validation("session id is required".to_string()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(StoreError::Validation(format!(
            "session id exceeds {MAX_SESSION_ID_LEN} bytes"
        )));
    }

    let sanitized = sanitize_session_id(session_id);
    if sanitized == session_id {
        return Ok(sanitized);
    }

    let digest = Sha256::digest(session_id.as_bytes());
    let hash = hex::encode(digest);
    Ok(format!("{sanitized}__{}", &hash[..KEY_HASH_HEX_LEN]))
}

/// Prefix under which a session's frames are stored in the sled frames tree.
pub fn frame_prefix(key: &str) -> String {
    format!("{key}:")
}

/// Frames are ordered by arrival sequence, zero-padded so byte order equals numeric order.
pub fn frame_key(key: &str, seq: u64) -> String {
    format!("{key}:{seq:020}")
}
