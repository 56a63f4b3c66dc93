//! Stewardship: who may restrict whom, and how that authority is checked.
//!
//! - [`StewardshipGrant`]: evidence-backed authority over a subject,
//!   delegatable as a strict subset, reviewed and expiring.
//! - [`StewardshipAppeal`]: the subject's always-available challenge to a
//!   grant, routed to an [`ArbitrationLayer`].
//! - [`CommunityIntervention`]: weighted community support that, past
//!   [`INTERVENTION_THRESHOLD`], notifies the subject and goes to arbitration.
//! - [`ActivityLog`]: session reports kept under the subject's monitoring rules.
//!
//! Everything here is a pure state machine over values; callers persist the
//! results and supply the clock.

mod activity;
mod appeal;
mod error;
mod grant;
mod intervention;
mod limits;
mod weight;

pub use activity::{ActivityLog, ActivityLogId, NewActivity};
pub use appeal::{
    AppealDecision, AppealDraft, AppealFiling, AppealId, AppealOutcome, AppealStatus, AppealType,
    ArbitrationLayer, DraftStep, StewardshipAppeal,
};
pub use error::{Error, Result};
pub use grant::{
    AuthorityBasis, Delegation, GrantId, GrantStatus, NewGrant, StewardshipGrant,
};
pub use intervention::{
    CommunityIntervention, InterventionId, InterventionStatus, NewIntervention, Resolution,
    ReviewRecord, StatusChange, SubjectResponse, SupportOutcome, Supporter,
};
pub use limits::Limits;
pub use weight::{
    tenths_to_weight, RelationshipLevel, INTERVENTION_THRESHOLD, INTERVENTION_THRESHOLD_TENTHS,
};
