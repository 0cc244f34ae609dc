use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_AOI_ZONES, DEFAULT_BLINK_MIN_FRAMES, DEFAULT_CALIBRATION_FRAMES,
    DEFAULT_EAR_MULTIPLIER, DEFAULT_EAR_THRESHOLD, DEFAULT_FIXATION_MIN_FRAMES,
    DEFAULT_FIXATION_THRESHOLD, DEFAULT_FPS, DEFAULT_SESSION_TTL_HOURS,
    DEFAULT_STORE_RETRY_BACKOFF_MS, DEFAULT_STORE_WRITE_RETRIES,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub gaze: GazeEnvConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Sled,
    File,
}

impl FromStr for StoreBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sled" => Ok(Self::Sled),
            "file" | "json" => Ok(Self::File),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub sled_path: String,
    pub data_dir: String,
    pub write_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    /// Idle sessions older than this are deleted; 0 disables the sweep.
    pub session_ttl_hours: u64,
    pub sweep_cron: String,
    pub clear_on_shutdown: bool,
}

/// Raw pipeline settings as read from the environment.
/// Validated and converted by `GazeConfig::from_env`.
#[derive(Debug, Clone)]
pub struct GazeEnvConfig {
    pub aoi_zones: String,
    pub ear_multiplier: f64,
    pub default_ear_threshold: f64,
    pub fixation_threshold: f64,
    pub blink_min_frames: u32,
    pub fixation_min_frames: u32,
    pub calibration_frames: u32,
    pub fps: f64,
}

impl Default for GazeEnvConfig {
    fn default() -> Self {
        Self {
            aoi_zones: DEFAULT_AOI_ZONES.to_string(),
            ear_multiplier: DEFAULT_EAR_MULTIPLIER,
            default_ear_threshold: DEFAULT_EAR_THRESHOLD,
            fixation_threshold: DEFAULT_FIXATION_THRESHOLD,
            blink_min_frames: DEFAULT_BLINK_MIN_FRAMES,
            fixation_min_frames: DEFAULT_FIXATION_MIN_FRAMES,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
            fps: DEFAULT_FPS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8001_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            store: StoreConfig {
                backend: env_or_parse("STORE_BACKEND", StoreBackendKind::Sled),
                sled_path: env_or("SLED_PATH", "./data/gaze.sled"),
                data_dir: env_or("GAZE_DATA_DIR", "./gaze_data"),
                write_retries: env_or_parse("STORE_WRITE_RETRIES", DEFAULT_STORE_WRITE_RETRIES),
                retry_backoff_ms: env_or_parse(
                    "STORE_RETRY_BACKOFF_MS",
                    DEFAULT_STORE_RETRY_BACKOFF_MS,
                ),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                session_ttl_hours: env_or_parse("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS),
                sweep_cron: env_or("SESSION_SWEEP_CRON", "0 0 * * * *"),
                clear_on_shutdown: env_or_bool("CLEAR_SESSIONS_ON_SHUTDOWN", false),
            },
            gaze: GazeEnvConfig {
                aoi_zones: env_or("GAZE_AOI_ZONES", DEFAULT_AOI_ZONES),
                ear_multiplier: env_or_parse("GAZE_EAR_MULTIPLIER", DEFAULT_EAR_MULTIPLIER),
                default_ear_threshold: env_or_parse(
                    "GAZE_DEFAULT_EAR_THRESHOLD",
                    DEFAULT_EAR_THRESHOLD,
                ),
                fixation_threshold: env_or_parse(
                    "GAZE_FIXATION_THRESHOLD",
                    DEFAULT_FIXATION_THRESHOLD,
                ),
                blink_min_frames: env_or_parse("GAZE_BLINK_MIN_FRAMES", DEFAULT_BLINK_MIN_FRAMES),
                fixation_min_frames: env_or_parse(
                    "GAZE_FIXATION_MIN_FRAMES",
                    DEFAULT_FIXATION_MIN_FRAMES,
                ),
                calibration_frames: env_or_parse(
                    "GAZE_CALIBRATION_FRAMES",
                    DEFAULT_CALIBRATION_FRAMES,
                ),
                fps: env_or_parse("GAZE_FPS", DEFAULT_FPS),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "STORE_BACKEND",
            "STORE_WRITE_RETRIES",
            "SESSION_TTL_HOURS",
            "CLEAR_SESSIONS_ON_SHUTDOWN",
            "GAZE_EAR_MULTIPLIER",
            "GAZE_CALIBRATION_FRAMES",
            "GAZE_AOI_ZONES",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.store.backend, StoreBackendKind::Sled);
        assert_eq!(cfg.store.write_retries, 3);
        assert_eq!(cfg.worker.session_ttl_hours, 24);
        assert!(!cfg.worker.clear_on_shutdown);
        assert_eq!(cfg.gaze.calibration_frames, 30);
        assert_eq!(cfg.gaze.aoi_zones, DEFAULT_AOI_ZONES);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("STORE_WRITE_RETRIES", "5");
        env::set_var("GAZE_EAR_MULTIPLIER", "0.8");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.store.write_retries, 5);
        assert!((cfg.gaze.ear_multiplier - 0.8).abs() < 1e-12);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("GAZE_CALIBRATION_FRAMES", "-3");
        env::set_var("STORE_BACKEND", "postgres");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.gaze.calibration_frames, 30);
        assert_eq!(cfg.store.backend, StoreBackendKind::Sled);
    }

    #[test]
    fn backend_and_flags() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("STORE_BACKEND", "FILE");
        env::set_var("CLEAR_SESSIONS_ON_SHUTDOWN", "yes");

        let cfg = Config::from_env();
        assert_eq!(cfg.store.backend, StoreBackendKind::File);
        assert!(cfg.worker.clear_on_shutdown);
    }
}
