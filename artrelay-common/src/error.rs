//! Common error types for artrelay

use thiserror::Error;

/// Common result type for artrelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the artrelay crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Telegram Bot API rejected a call
    #[error("Telegram API error: {0}")]
    Telegram(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}
