//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A policy layer or rule set failed validation.
    #[error("invalid policy: {0}")]
    Invalid(String),

    /// A label, id, or rule file could not be parsed.
    #[error("failed to parse policy: {0}")]
    Parse(String),

    /// An I/O error occurred while reading a rule file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
