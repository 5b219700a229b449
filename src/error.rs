use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load environment file: {0}")]
    EnvFile(String),

    #[error("git {step} failed: {message}")]
    Git { step: String, message: String },
}

impl SyncError {
    /// Transport failures worth another attempt. Status errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
