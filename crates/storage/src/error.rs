use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-swap write lost: the stored version moved on.
    #[error("{table} {id} changed since version {expected}")]
    Conflict {
        table: &'static str,
        id: String,
        expected: u64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
