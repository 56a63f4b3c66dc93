//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No data directory could be determined and no path was configured.
    #[error("no database path: set [storage] path in {config} or pass --db")]
    NoDatabasePath { config: PathBuf },

    /// No acting agent was given for a command that needs one.
    #[error("no agent: pass --as or set STEWARD_AGENT")]
    NoAgent,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An engine operation was refused or failed.
    #[error(transparent)]
    Engine(#[from] engine::Error),

    #[error(transparent)]
    Rpc(#[from] rpc::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
