//! Error types shared by Inforobot crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, InforobotError>;

/// Main error type for shared types
#[derive(Error, Debug)]
pub enum InforobotError {
    #[error("Invalid request status: {0}")]
    InvalidStatus(String),

    #[error("Invalid index id: '{0}'")]
    InvalidIndexId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
