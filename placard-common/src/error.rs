//! Common error types for placard

use thiserror::Error;

/// Common result type for placard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across placard services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Write rejected because the value exceeds the store's per-value limit
    #[error("Value for '{key}' is {size} bytes, store limit is {limit}")]
    Capacity {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Content locator could not be decoded
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
