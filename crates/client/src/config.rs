//! Client configuration
//!
//! Resolved once at startup. Priority, highest first: explicit override >
//! `LONERS_*` env > `<data dir>/config.toml` > built-in defaults.
//! The data directory itself comes from override > `LONERS_DATA_DIR` > `~/.loners`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:5000";
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_MIN: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(5);

const CONFIG_FILE: &str = "config.toml";
const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, including the `/api` prefix
    pub api_url: String,
    /// Origin of the Socket.IO server
    pub socket_url: String,
    pub data_dir: PathBuf,
    /// Interval of the application-level `ping` emit
    pub keepalive_interval: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    /// Per-request timeout; `None` leaves the transport default
    pub request_timeout: Option<Duration>,
}

/// Values given explicitly, e.g. by command-line flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub socket_url: Option<String>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    socket_url: Option<String>,
    keepalive_secs: Option<u64>,
    reconnect_min_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Resolve from the process environment and the config file
    pub fn load(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_dir = match overrides.data_dir {
            Some(dir) => dir,
            None => match non_empty(env("LONERS_DATA_DIR")) {
                Some(dir) => PathBuf::from(dir),
                None => dirs::home_dir().ok_or(ConfigError::NoHomeDir)?.join(".loners"),
            },
        };

        let file = read_file_config(&data_dir.join(CONFIG_FILE))?;

        let api_url = overrides
            .api_url
            .or_else(|| non_empty(env("LONERS_API_URL")))
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let socket_url = overrides
            .socket_url
            .or_else(|| non_empty(env("LONERS_SOCKET_URL")))
            .or(file.socket_url)
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());

        let config = Self {
            api_url: validate_url(api_url)?,
            socket_url: validate_url(socket_url)?,
            data_dir,
            keepalive_interval: file
                .keepalive_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_KEEPALIVE),
            reconnect_min: file
                .reconnect_min_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_MIN),
            reconnect_max: file
                .reconnect_max_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_MAX),
            request_timeout: file.request_timeout_secs.map(Duration::from_secs),
        };
        Ok(config)
    }

    /// Defaults rooted at `data_dir`, ignoring env and config file
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            data_dir: data_dir.into(),
            keepalive_interval: DEFAULT_KEEPALIVE,
            reconnect_min: DEFAULT_RECONNECT_MIN,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            request_timeout: None,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// WebSocket endpoint of the Socket.IO server (Engine.IO v4)
    pub fn websocket_url(&self) -> String {
        let origin = self.socket_url.trim_end_matches('/');
        let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            origin.to_string()
        };
        format!("{ws_origin}/socket.io/?EIO=4&transport=websocket")
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_url(url: String) -> Result<String, ConfigError> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidUrl(url))
    }
}
