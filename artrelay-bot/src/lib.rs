//! artrelay-bot - Artwork Relay Service
//!
//! Ingests artwork-post URLs from several content platforms, normalizes them
//! into canonical page records, deduplicates and caches them in SQLite,
//! derives tags and an HTML caption, publishes batched media groups to a
//! curated Telegram channel, and re-serves the unmodified originals on
//! request.

pub mod backrefs;
pub mod commands;
pub mod compress;
pub mod db;
pub mod error;
pub mod models;
pub mod originals;
pub mod pipeline;
pub mod platforms;
pub mod publisher;
pub mod telegram;

pub use commands::AppState;
pub use error::AdapterError;
