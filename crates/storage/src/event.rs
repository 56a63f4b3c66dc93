//! Audit events: one per successful mutation, never updated or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditKind {
    PolicyUpserted { subject_id: String, version: u64 },
    GrantCreated { subject_id: String, steward_id: String },
    GrantDelegated { parent_id: String, steward_id: String },
    GrantRevoked,
    GrantReviewed,
    GrantExpired,
    GrantReinstated,
    AppealFiled { grant_id: String },
    AppealAssigned { arbitrator: String },
    AppealEscalated { layer: String },
    AppealDecided { approved: bool },
    AppealExpired,
    InterventionInitiated { subject_id: String },
    InterventionSupported { weight_tenths: u32 },
    InterventionStatus { status: String },
    ActivityLogged { session_id: String },
}

impl AuditKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuditKind::PolicyUpserted { .. } => "policy_upserted",
            AuditKind::GrantCreated { .. } => "grant_created",
            AuditKind::GrantDelegated { .. } => "grant_delegated",
            AuditKind::GrantRevoked => "grant_revoked",
            AuditKind::GrantReviewed => "grant_reviewed",
            AuditKind::GrantExpired => "grant_expired",
            AuditKind::GrantReinstated => "grant_reinstated",
            AuditKind::AppealFiled { .. } => "appeal_filed",
            AuditKind::AppealAssigned { .. } => "appeal_assigned",
            AuditKind::AppealEscalated { .. } => "appeal_escalated",
            AuditKind::AppealDecided { .. } => "appeal_decided",
            AuditKind::AppealExpired => "appeal_expired",
            AuditKind::InterventionInitiated { .. } => "intervention_initiated",
            AuditKind::InterventionSupported { .. } => "intervention_supported",
            AuditKind::InterventionStatus { .. } => "intervention_status",
            AuditKind::ActivityLogged { .. } => "activity_logged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub entity_id: String,
    /// `"system"` for deadline sweeps.
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
}

impl AuditEvent {
    pub fn new(
        entity_id: impl Into<String>,
        actor_id: impl Into<String>,
        kind: AuditKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            actor_id: actor_id.into(),
            timestamp,
            kind,
        }
    }
}
