//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::separation::Device;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Root of per-job working directories
    pub work_dir: PathBuf,
    /// Root of the result cache
    pub cache_dir: PathBuf,
    /// Directory for rolling log files
    pub log_dir: PathBuf,
    /// Number of jobs processed concurrently
    pub max_workers: usize,
    /// How often SSE readers poll a job's log
    pub log_poll_interval: Duration,
    /// Maximum accepted upload body size in bytes
    pub upload_limit: usize,
    pub demucs_path: String,
    pub spleeter_path: String,
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
    pub demucs_timeout: Duration,
    pub spleeter_timeout: Duration,
    pub phase_cancel_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Whether an accelerator is available to capable strategies
    pub acceleration: bool,
    /// Device label handed to tools when accelerated (e.g. "cuda")
    pub acceleration_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            work_dir: PathBuf::from("./audio_workspace"),
            cache_dir: PathBuf::from("./audio_cache"),
            log_dir: PathBuf::from("./logs"),
            max_workers: 2,
            log_poll_interval: Duration::from_millis(500),
            upload_limit: 200 * 1024 * 1024, // 200MB
            demucs_path: "demucs".to_string(),
            spleeter_path: "spleeter".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            demucs_timeout: Duration::from_secs(600),
            spleeter_timeout: Duration::from_secs(600),
            phase_cancel_timeout: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(900),
            acceleration: false,
            acceleration_label: "cpu".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `WORK_DIR`, `CACHE_DIR`, `LOG_DIR`
    /// - `MAX_WORKERS`, `LOG_POLL_INTERVAL_MS`, `UPLOAD_LIMIT_BYTES`
    /// - `DEMUCS_PATH`, `SPLEETER_PATH`, `FFMPEG_PATH`, `YTDLP_PATH`
    /// - `DEMUCS_TIMEOUT_SECS`, `SPLEETER_TIMEOUT_SECS`,
    ///   `PHASE_CANCEL_TIMEOUT_SECS`, `FETCH_TIMEOUT_SECS`
    /// - `ACCELERATION` (`true`/`false`), `ACCELERATION_LABEL`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("API_BIND_ADDRESS") {
            config.bind_address = v;
        }
        parse_into(&get, "API_PORT", &mut config.port);

        if let Some(v) = get("WORK_DIR") {
            config.work_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CACHE_DIR") {
            config.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }

        parse_into(&get, "MAX_WORKERS", &mut config.max_workers);
        if config.max_workers == 0 {
            warn!("MAX_WORKERS must be at least 1, using 1");
            config.max_workers = 1;
        }
        parse_millis_into(&get, "LOG_POLL_INTERVAL_MS", &mut config.log_poll_interval);
        parse_into(&get, "UPLOAD_LIMIT_BYTES", &mut config.upload_limit);

        if let Some(v) = get("DEMUCS_PATH") {
            config.demucs_path = v;
        }
        if let Some(v) = get("SPLEETER_PATH") {
            config.spleeter_path = v;
        }
        if let Some(v) = get("FFMPEG_PATH") {
            config.ffmpeg_path = v;
        }
        if let Some(v) = get("YTDLP_PATH") {
            config.ytdlp_path = v;
        }

        parse_secs_into(&get, "DEMUCS_TIMEOUT_SECS", &mut config.demucs_timeout);
        parse_secs_into(&get, "SPLEETER_TIMEOUT_SECS", &mut config.spleeter_timeout);
        parse_secs_into(
            &get,
            "PHASE_CANCEL_TIMEOUT_SECS",
            &mut config.phase_cancel_timeout,
        );
        parse_secs_into(&get, "FETCH_TIMEOUT_SECS", &mut config.fetch_timeout);

        parse_into(&get, "ACCELERATION", &mut config.acceleration);
        if let Some(v) = get("ACCELERATION_LABEL") {
            config.acceleration_label = v;
        }

        config
    }

    /// Device handed to separation strategies.
    pub fn device(&self) -> Device {
        Device {
            accelerated: self.acceleration,
            label: self.acceleration_label.clone(),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse_into<T, G>(get: &G, key: &str, target: &mut T)
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %raw, "Ignoring invalid config value"),
        }
    }
}

fn parse_secs_into<G>(get: &G, key: &str, target: &mut Duration)
where
    G: Fn(&str) -> Option<String>,
{
    let mut secs = target.as_secs();
    parse_into(get, key, &mut secs);
    *target = Duration::from_secs(secs);
}

fn parse_millis_into<G>(get: &G, key: &str, target: &mut Duration)
where
    G: Fn(&str) -> Option<String>,
{
    let mut millis = target.as_millis() as u64;
    parse_into(get, key, &mut millis);
    *target = Duration::from_millis(millis.max(1));
}
