//! Error types for dashmetrics operations.
//!
//! Extraction itself is tolerant: a missing table, header row or cell never
//! surfaces here. [`DashError`] is reserved for the things a caller has to act
//! on: unreadable files, invalid selectors or configuration, and JSON that
//! cannot be read or written.
//!
//! # Example
//!
//! ```rust
//! use dashmetrics_core::{DashError, Result};
//!
//! fn require_html(html: &str) -> Result<&str> {
//!     if html.trim().is_empty() {
//!         return Err(DashError::NoUsableSource);
//!     }
//!     Ok(html)
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction, aggregation and file handling.
#[derive(Error, Debug)]
pub enum DashError {
    /// HTML parsing errors.
    ///
    /// Returned when a CSS selector handed to the DOM layer is invalid.
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// Input document or source file not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File read/write errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation errors.
    ///
    /// Raised when a metric document cannot be encoded, or when a config file
    /// is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors.
    ///
    /// Returned when a selector table or a config file is present but invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No metric family produced anything usable.
    #[error("No usable metric source")]
    NoUsableSource,
}

/// Result type alias for DashError.
pub type Result<T> = std::result::Result<T, DashError>;
