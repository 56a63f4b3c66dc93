//! Stewardship error types.

use thiserror::Error;

/// Errors raised by grant, appeal, and intervention transitions.
///
/// Every variant is raised before any state is mutated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A grant was requested without verifiable authority.
    #[error("evidence invalid: {0}")]
    EvidenceInvalid(String),

    /// A delegation or policy write exceeds the authority held.
    #[error("scope exceeded: {0}")]
    ScopeExceeded(String),

    /// An intervention action needs the support threshold first.
    #[error("threshold not reached: {total} of {threshold}")]
    ThresholdNotReached { total: f64, threshold: f64 },

    /// The grant, appeal, or window has lapsed.
    #[error("expired: {0}")]
    Expired(String),

    /// The actor may not perform this action.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// The entity's current state does not allow this action.
    #[error("cannot {action} {entity} in status '{from}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
