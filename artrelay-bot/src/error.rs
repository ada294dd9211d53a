//! Error types for artrelay-bot

use thiserror::Error;

/// Adapter-level extraction failure.
///
/// Never crosses the orchestrator boundary: the pipeline converts every
/// variant into a failed `ArtworkResult` with fixed user-facing text. Only
/// persistence errors (`sqlx::Error` via `artrelay_common::Error`) propagate
/// raw, and only up to the top-level command handler.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Source unreachable or transport-level failure
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Source answered with an error or an unusable payload
    #[error("malformed source response: {0}")]
    Parse(String),

    /// External extractor subprocess failed
    #[error("extractor failed: {0}")]
    Extraction(String),

    /// Local file I/O during extraction or download
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for adapter operations
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
