//! Error types

use std::path::PathBuf;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("home directory not found; set LONERS_DATA_DIR")]
    NoHomeDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid url {0:?}: expected http:// or https://")]
    InvalidUrl(String),
}

/// Failure of a call against the API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status
    #[error("{path} returned HTTP {status}")]
    Status {
        status: StatusCode,
        path: String,
        message: Option<String>,
    },
    #[error("invalid response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Text suitable for a transient notice in the UI
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            ApiError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                "Your session has expired, please log in again".to_string()
            }
            ApiError::Status { status, .. } if status.is_server_error() => {
                "The server is having trouble, please try again".to_string()
            }
            ApiError::Transport(_) => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}
