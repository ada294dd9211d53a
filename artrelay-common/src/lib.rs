//! # Artrelay Common Library
//!
//! Shared code for the artrelay workspace:
//! - Error types
//! - Configuration loading
//! - HTML escaping for caption interpolation
//! - Page-range parsing

pub mod config;
pub mod error;
pub mod escape;
pub mod pages;

pub use config::Config;
pub use error::{Error, Result};
pub use escape::html_escape;
pub use pages::parse_page_ranges;
