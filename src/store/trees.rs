pub const FRAMES: &str = "frames";
pub const SESSION_META: &str = "session_meta";
