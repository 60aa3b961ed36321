//! Error types for the switcher control core

use thiserror::Error;

/// Result type alias for switcher operations
pub type SwitcherResult<T> = Result<T, SwitcherError>;

/// Errors that leave the core. Stream faults and rejected commands are
/// recovered in place and never show up here.
#[derive(Error, Debug)]
pub enum SwitcherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transcript source (or the capture device behind it) could not be acquired
    #[error("Transcript source unavailable: {0}")]
    SourceInit(String),

    #[error("Device dispatch failed: {0}")]
    Dispatch(String),
}

impl From<reqwest::Error> for SwitcherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SwitcherError::Dispatch(format!("timed out: {}", err))
        } else {
            SwitcherError::Dispatch(err.to_string())
        }
    }
}
