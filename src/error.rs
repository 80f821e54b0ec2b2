//! WolfShip Error Types

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for WolfShip operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfShip error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid date pattern: {0:?}")]
    InvalidDatePattern(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation targeted a log file that was already closed
    #[error("Log file already closed: {}", .0.display())]
    LogFileClosed(PathBuf),

    // Worker pool errors
    #[error("Pool already stopped")]
    PoolStopped,

    // Upload errors
    #[error("Upload of {} failed: {reason}", path.display())]
    Upload { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Shutdown in progress")]
    ShuttingDown,

    // Internal errors
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upload { .. } | Error::Io(_))
    }

    /// Check if this error means a buffer was reused after close
    pub fn is_use_after_close(&self) -> bool {
        matches!(self, Error::LogFileClosed(_))
    }
}
