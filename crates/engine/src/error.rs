use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The backing store could not be reached.
    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("evidence invalid: {0}")]
    EvidenceInvalid(String),

    #[error("scope exceeded: {0}")]
    ScopeExceeded(String),

    #[error("grant not found: {0}")]
    GrantNotFound(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("appeal not found: {0}")]
    AppealNotFound(String),

    #[error("intervention not found: {0}")]
    InterventionNotFound(String),

    #[error("threshold not reached: {total} of {threshold}")]
    ThresholdNotReached { total: f64, threshold: f64 },

    /// Someone else wrote first. Re-fetch and reapply.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether retrying the same call (after a re-fetch) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification(_) | Error::NotConnected(_))
    }

    /// Stable name of the variant, for logs and wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotConnected(_) => "not_connected",
            Error::NotAuthenticated => "not_authenticated",
            Error::EvidenceInvalid(_) => "evidence_invalid",
            Error::ScopeExceeded(_) => "scope_exceeded",
            Error::GrantNotFound(_) => "grant_not_found",
            Error::PolicyNotFound(_) => "policy_not_found",
            Error::AppealNotFound(_) => "appeal_not_found",
            Error::InterventionNotFound(_) => "intervention_not_found",
            Error::ThresholdNotReached { .. } => "threshold_not_reached",
            Error::ConcurrentModification(_) => "concurrent_modification",
            Error::Expired(_) => "expired",
            Error::NotPermitted(_) => "not_permitted",
            Error::InvalidTransition(_) => "invalid_transition",
            Error::Invalid(_) => "invalid",
            Error::Storage(_) => "storage",
        }
    }
}

impl From<stewardship::Error> for Error {
    fn from(e: stewardship::Error) -> Self {
        use stewardship::Error as S;
        match e {
            S::EvidenceInvalid(msg) => Error::EvidenceInvalid(msg),
            S::ScopeExceeded(msg) => Error::ScopeExceeded(msg),
            S::ThresholdNotReached { total, threshold } => {
                Error::ThresholdNotReached { total, threshold }
            }
            S::Expired(msg) => Error::Expired(msg),
            S::NotPermitted(msg) => Error::NotPermitted(msg),
            e @ S::InvalidTransition { .. } => Error::InvalidTransition(e.to_string()),
            other => Error::Invalid(other.to_string()),
        }
    }
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        match e {
            e @ storage::Error::Conflict { .. } => Error::ConcurrentModification(e.to_string()),
            storage::Error::Database(e) => Error::NotConnected(e.to_string()),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<policy::Error> for Error {
    fn from(e: policy::Error) -> Self {
        Error::Invalid(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
