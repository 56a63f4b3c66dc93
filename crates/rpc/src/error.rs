//! RPC transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode response: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A `*_json` field did not hold what it should.
    #[error("invalid wire field '{field}': {reason}")]
    Wire { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
