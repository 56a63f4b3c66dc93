//! Wire shapes of the RPC methods.
//!
//! Stored and returned records carry their collections as JSON-encoded
//! strings (`*_json`), the way existing clients expect them. This module is
//! the only place those strings are built or parsed; everything on the
//! engine side of it is typed.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use engine::{GrantView, PolicyWrite};
use policy::{
    AgeRating, CapabilityFlags, CapabilityOverrides, ComputedPolicy, ContentRequest, ContentRules,
    DevicePolicy, FailMode, FeatureRules, MonitoringRules, PolicyId, RuleSet, Tier, TimeRules,
    TimeWindow,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stewardship::{
    ActivityLog, AppealFiling, AppealId, AppealType, AuthorityBasis, CommunityIntervention,
    Delegation, GrantId, InterventionId, NewActivity, NewGrant, NewIntervention,
    RelationshipLevel, Resolution, StewardshipAppeal,
};

/// Encode a collection as a JSON array string.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a `*_json` field. An empty string is an empty list.
pub fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| Error::Wire {
        field,
        reason: e.to_string(),
    })
}

// --- inputs --------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceInput {
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectInput {
    pub subject_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpsertPolicyInput {
    /// Omitted for the caller's own layer.
    pub subject_id: Option<String>,
    pub device_id: Option<String>,
    pub expected_version: Option<u64>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,

    pub blocked_categories: Vec<String>,
    pub blocked_hashes: Vec<String>,
    pub age_rating_max: Option<AgeRating>,
    pub reach_level_max: Option<u8>,

    pub session_max_minutes: Option<u32>,
    pub daily_max_minutes: Option<u32>,
    pub time_windows_json: String,
    pub cooldown_minutes: Option<u32>,

    pub disabled_features: Vec<String>,
    pub disabled_routes: Vec<String>,
    pub require_approval: Vec<String>,

    pub log_sessions: Option<bool>,
    pub log_categories: Option<bool>,
    pub log_policy_events: Option<bool>,
    pub retention_days: Option<u32>,
    pub subject_can_view: Option<bool>,
}

impl UpsertPolicyInput {
    fn monitoring(&self) -> Option<MonitoringRules> {
        let given = self.log_sessions.is_some()
            || self.log_categories.is_some()
            || self.log_policy_events.is_some()
            || self.retention_days.is_some()
            || self.subject_can_view.is_some();
        given.then(|| MonitoringRules {
            log_sessions: self.log_sessions.unwrap_or(false),
            log_categories: self.log_categories.unwrap_or(false),
            log_policy_events: self.log_policy_events.unwrap_or(false),
            retention_days: self.retention_days.unwrap_or(0),
            subject_can_view: self.subject_can_view.unwrap_or(true),
        })
    }
}

impl TryFrom<UpsertPolicyInput> for PolicyWrite {
    type Error = Error;

    fn try_from(input: UpsertPolicyInput) -> Result<Self> {
        let time_windows: Vec<TimeWindow> = from_json("time_windows_json", &input.time_windows_json)?;
        let monitoring = input.monitoring();
        let rules = RuleSet {
            content: ContentRules {
                blocked_categories: input.blocked_categories.into_iter().collect(),
                blocked_hashes: input.blocked_hashes.into_iter().collect(),
                age_rating_max: input.age_rating_max,
                reach_level_max: input.reach_level_max,
            },
            time: TimeRules {
                session_max_minutes: input.session_max_minutes,
                daily_max_minutes: input.daily_max_minutes,
                time_windows,
                cooldown_minutes: input.cooldown_minutes,
            },
            features: FeatureRules {
                disabled_features: input.disabled_features.into_iter().collect(),
                disabled_routes: input.disabled_routes.into_iter().collect(),
                require_approval: input.require_approval.into_iter().collect(),
            },
            monitoring,
        };
        Ok(PolicyWrite {
            subject_id: input.subject_id,
            device_id: input.device_id,
            rules,
            expected_version: input.expected_version,
            effective_from: input.effective_from,
            effective_until: input.effective_until,
        })
    }
}

/// Grant request with the capability flags inline.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGrantInput {
    pub subject_id: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    pub authority_basis: AuthorityBasis,
    pub evidence_hash: Option<String>,
    pub verified_by: String,
    #[serde(flatten)]
    pub capabilities: CapabilityFlags,
    #[serde(default)]
    pub delegatable: bool,
    pub expires_in_days: u32,
    pub review_in_days: u32,
}

impl From<CreateGrantInput> for NewGrant {
    fn from(input: CreateGrantInput) -> Self {
        NewGrant {
            subject_id: input.subject_id,
            tier: input.tier,
            authority_basis: input.authority_basis,
            evidence_hash: input.evidence_hash,
            verified_by: input.verified_by,
            capabilities: input.capabilities,
            delegatable: input.delegatable,
            expires_in_days: input.expires_in_days,
            review_in_days: input.review_in_days,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegateGrantInput {
    pub parent_grant_id: GrantId,
    pub new_steward_id: String,
    #[serde(flatten)]
    pub overrides: CapabilityOverrides,
    #[serde(default)]
    pub delegatable: bool,
    pub expires_in_days: u32,
}

impl From<DelegateGrantInput> for Delegation {
    fn from(input: DelegateGrantInput) -> Self {
        Delegation {
            parent_grant_id: input.parent_grant_id,
            new_steward_id: input.new_steward_id,
            overrides: input.overrides,
            delegatable: input.delegatable,
            expires_in_days: input.expires_in_days,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantInput {
    pub grant_id: GrantId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileAppealInput {
    pub grant_id: GrantId,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    pub appeal_type: AppealType,
    pub grounds: Vec<String>,
    #[serde(default)]
    pub evidence_json: String,
    #[serde(default)]
    pub advocate_id: Option<String>,
    #[serde(default)]
    pub advocate_notes: Option<String>,
}

impl TryFrom<FileAppealInput> for AppealFiling {
    type Error = Error;

    fn try_from(input: FileAppealInput) -> Result<Self> {
        Ok(AppealFiling {
            grant_id: input.grant_id,
            policy_id: input.policy_id,
            appeal_type: input.appeal_type,
            grounds: input.grounds,
            evidence: from_json("evidence_json", &input.evidence_json)?,
            advocate_id: input.advocate_id,
            advocate_notes: input.advocate_notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppealInput {
    pub appeal_id: AppealId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecideAppealInput {
    pub appeal_id: AppealId,
    pub approved: bool,
    #[serde(default)]
    pub decision_notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateInterventionInput {
    pub subject_id: String,
    pub relationship_level: RelationshipLevel,
    pub pattern_description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub evidence_json: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<InitiateInterventionInput> for NewIntervention {
    type Error = Error;

    fn try_from(input: InitiateInterventionInput) -> Result<Self> {
        Ok(NewIntervention {
            subject_id: input.subject_id,
            relationship_level: input.relationship_level,
            pattern_description: input.pattern_description,
            categories: input.categories.into_iter().collect(),
            evidence_hashes: from_json("evidence_json", &input.evidence_json)?,
            reason: input.reason,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupportInterventionInput {
    pub intervention_id: InterventionId,
    pub relationship_level: RelationshipLevel,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterventionInput {
    pub intervention_id: InterventionId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondInput {
    pub intervention_id: InterventionId,
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveInput {
    pub intervention_id: InterventionId,
    pub resolution: Resolution,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub intervention_id: InterventionId,
    pub restore: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentCheckInput {
    #[serde(default)]
    pub device_id: Option<String>,
    /// Overrides the configured fail mode for this check only.
    #[serde(default)]
    pub fail_mode: Option<FailMode>,
    #[serde(flatten)]
    pub request: ContentRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCheckInput {
    #[serde(default)]
    pub device_id: Option<String>,
    pub feature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteCheckInput {
    #[serde(default)]
    pub device_id: Option<String>,
    pub route: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeCheckInput {
    pub device_id: Option<String>,
    /// The device's local wall-clock time.
    pub local_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogActivityInput {
    #[serde(default)]
    pub device_id: Option<String>,
    pub session_id: String,
    pub session_started_at: DateTime<Utc>,
    pub session_duration_minutes: u32,
    #[serde(default)]
    pub categories_accessed: Vec<String>,
    #[serde(default)]
    pub policy_events_json: String,
}

impl TryFrom<LogActivityInput> for NewActivity {
    type Error = Error;

    fn try_from(input: LogActivityInput) -> Result<Self> {
        Ok(NewActivity {
            device_id: input.device_id,
            session_id: input.session_id,
            session_started_at: input.session_started_at,
            session_duration_minutes: input.session_duration_minutes,
            categories_accessed: input.categories_accessed.into_iter().collect(),
            policy_events: from_json("policy_events_json", &input.policy_events_json)?,
        })
    }
}

// --- outputs -------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedPolicyOutput {
    pub subject_id: String,
    pub blocked_categories_json: String,
    pub blocked_hashes_json: String,
    pub age_rating_max: Option<AgeRating>,
    pub reach_level_max: Option<u8>,
    pub session_max_minutes: Option<u32>,
    pub daily_max_minutes: Option<u32>,
    /// Windows grouped per layer; access needs a match in every group.
    pub time_windows_json: String,
    pub cooldown_minutes: Option<u32>,
    pub disabled_features_json: String,
    pub disabled_routes_json: String,
    pub require_approval_json: String,
    pub log_sessions: bool,
    pub log_categories: bool,
    pub log_policy_events: bool,
    pub retention_days: u32,
    pub subject_can_view: bool,
    pub layers_json: String,
}

impl ComputedPolicyOutput {
    pub fn new(policy: &ComputedPolicy) -> Result<Self> {
        Ok(Self {
            subject_id: policy.subject_id.clone(),
            blocked_categories_json: to_json(&policy.content.blocked_categories)?,
            blocked_hashes_json: to_json(&policy.content.blocked_hashes)?,
            age_rating_max: policy.content.age_rating_max,
            reach_level_max: policy.content.reach_level_max,
            session_max_minutes: policy.time.session_max_minutes,
            daily_max_minutes: policy.time.daily_max_minutes,
            time_windows_json: to_json(&policy.time_windows)?,
            cooldown_minutes: policy.time.cooldown_minutes,
            disabled_features_json: to_json(&policy.features.disabled_features)?,
            disabled_routes_json: to_json(&policy.features.disabled_routes)?,
            require_approval_json: to_json(&policy.features.require_approval)?,
            log_sessions: policy.monitoring.log_sessions,
            log_categories: policy.monitoring.log_categories,
            log_policy_events: policy.monitoring.log_policy_events,
            retention_days: policy.monitoring.retention_days,
            subject_can_view: policy.monitoring.subject_can_view,
            layers_json: to_json(&policy.layers)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePolicyOutput {
    pub id: PolicyId,
    pub subject_id: String,
    pub device_id: Option<String>,
    pub author_id: String,
    pub author_tier: Tier,
    pub inherits_from: Option<PolicyId>,
    pub blocked_categories_json: String,
    pub blocked_hashes_json: String,
    pub age_rating_max: Option<AgeRating>,
    pub reach_level_max: Option<u8>,
    pub session_max_minutes: Option<u32>,
    pub daily_max_minutes: Option<u32>,
    pub time_windows_json: String,
    pub cooldown_minutes: Option<u32>,
    pub disabled_features_json: String,
    pub disabled_routes_json: String,
    pub require_approval_json: String,
    #[serde(flatten)]
    pub monitoring: MonitoringRules,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DevicePolicyOutput {
    pub fn new(policy: &DevicePolicy) -> Result<Self> {
        Ok(Self {
            id: policy.id,
            subject_id: policy.subject_id.clone(),
            device_id: policy.device_id.clone(),
            author_id: policy.author_id.clone(),
            author_tier: policy.author_tier,
            inherits_from: policy.inherits_from,
            blocked_categories_json: to_json(&policy.content.blocked_categories)?,
            blocked_hashes_json: to_json(&policy.content.blocked_hashes)?,
            age_rating_max: policy.content.age_rating_max,
            reach_level_max: policy.content.reach_level_max,
            session_max_minutes: policy.time.session_max_minutes,
            daily_max_minutes: policy.time.daily_max_minutes,
            time_windows_json: to_json(&policy.time.time_windows)?,
            cooldown_minutes: policy.time.cooldown_minutes,
            disabled_features_json: to_json(&policy.features.disabled_features)?,
            disabled_routes_json: to_json(&policy.features.disabled_routes)?,
            require_approval_json: to_json(&policy.features.require_approval)?,
            monitoring: policy.monitoring.clone(),
            effective_from: policy.effective_from,
            effective_until: policy.effective_until,
            version: policy.version,
            created_at: policy.created_at,
            updated_at: policy.updated_at,
        })
    }
}

/// Grants have no collections; their typed form is already the wire form.
pub type GrantOutput = GrantView;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppealOutput {
    pub id: AppealId,
    pub appellant_id: String,
    pub grant_id: GrantId,
    pub policy_id: Option<PolicyId>,
    pub appeal_type: AppealType,
    pub grounds_json: String,
    pub evidence_json: String,
    pub advocate_id: Option<String>,
    pub advocate_notes: Option<String>,
    pub arbitration_layer: String,
    pub assigned_to: Option<String>,
    pub status: String,
    pub status_changed_at: DateTime<Utc>,
    pub decision_json: Option<String>,
    pub filed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl AppealOutput {
    pub fn new(appeal: &StewardshipAppeal) -> Result<Self> {
        Ok(Self {
            id: appeal.id,
            appellant_id: appeal.appellant_id.clone(),
            grant_id: appeal.grant_id,
            policy_id: appeal.policy_id,
            appeal_type: appeal.appeal_type,
            grounds_json: to_json(&appeal.grounds)?,
            evidence_json: to_json(&appeal.evidence)?,
            advocate_id: appeal.advocate_id.clone(),
            advocate_notes: appeal.advocate_notes.clone(),
            arbitration_layer: appeal.arbitration_layer.to_string(),
            assigned_to: appeal.assigned_to.clone(),
            status: appeal.status.to_string(),
            status_changed_at: appeal.status_changed_at,
            decision_json: appeal.decision.as_ref().map(to_json).transpose()?,
            filed_at: appeal.filed_at,
            expires_at: appeal.expires_at,
            version: appeal.version,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionOutput {
    pub id: InterventionId,
    pub subject_id: String,
    pub initiated_by: String,
    pub status: String,
    pub total_weight: f64,
    pub supporter_count: usize,
    pub supporters_json: String,
    pub pattern_description: String,
    pub categories_json: String,
    pub evidence_json: String,
    pub status_history_json: String,
    pub gathering_deadline: DateTime<Utc>,
    pub notify_deadline: Option<DateTime<Utc>>,
    pub response_window_ends_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl InterventionOutput {
    pub fn new(intervention: &CommunityIntervention) -> Result<Self> {
        let supporters: Vec<_> = intervention.supporters.values().collect();
        Ok(Self {
            id: intervention.id,
            subject_id: intervention.subject_id.clone(),
            initiated_by: intervention.initiated_by.clone(),
            status: intervention.status.to_string(),
            total_weight: intervention.total_weight(),
            supporter_count: intervention.supporter_count(),
            supporters_json: to_json(&supporters)?,
            pattern_description: intervention.pattern_description.clone(),
            categories_json: to_json(&intervention.categories)?,
            evidence_json: to_json(&intervention.evidence_hashes)?,
            status_history_json: to_json(&intervention.status_history)?,
            gathering_deadline: intervention.gathering_deadline,
            notify_deadline: intervention.notify_deadline,
            response_window_ends_at: intervention.response_window_ends_at,
            next_review_at: intervention.next_review_at,
            version: intervention.version,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityLogOutput {
    pub id: String,
    pub subject_id: String,
    pub device_id: Option<String>,
    pub session_id: String,
    pub session_started_at: DateTime<Utc>,
    pub session_duration_minutes: u32,
    pub categories_accessed_json: String,
    pub policy_events_json: String,
    pub logged_at: DateTime<Utc>,
    pub retention_expires_at: DateTime<Utc>,
}

impl ActivityLogOutput {
    pub fn new(log: &ActivityLog) -> Result<Self> {
        Ok(Self {
            id: log.id.to_string(),
            subject_id: log.subject_id.clone(),
            device_id: log.device_id.clone(),
            session_id: log.session_id.clone(),
            session_started_at: log.session_started_at,
            session_duration_minutes: log.session_duration_minutes,
            categories_accessed_json: to_json(&log.categories_accessed)?,
            policy_events_json: to_json(&log.policy_events)?,
            logged_at: log.logged_at,
            retention_expires_at: log.retention_expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::BTreeSet;

    fn set_from_json(field: &'static str, raw: &str) -> Result<BTreeSet<String>> {
        Ok(from_json::<String>(field, raw)?.into_iter().collect())
    }

    #[test]
    fn upsert_input_decodes_windows_and_monitoring() {
        let input: UpsertPolicyInput = serde_json::from_value(serde_json::json!({
            "subject_id": "kid",
            "blocked_categories": ["gambling"],
            "time_windows_json": r#"[{"start":"08:00","end":"20:00"}]"#,
            "disabled_routes": ["/identity/**"],
            "log_sessions": true,
            "retention_days": 14
        }))
        .unwrap();
        let write = PolicyWrite::try_from(input).unwrap();

        assert!(write.rules.content.blocked_categories.contains("gambling"));
        assert_eq!(
            write.rules.time.time_windows[0].start,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        let monitoring = write.rules.monitoring.unwrap();
        assert!(monitoring.log_sessions && monitoring.subject_can_view);
        assert_eq!(monitoring.retention_days, 14);
    }

    #[test]
    fn omitted_monitoring_leaves_it_unset() {
        let write = PolicyWrite::try_from(UpsertPolicyInput::default()).unwrap();
        assert!(write.rules.monitoring.is_none());
    }

    #[test]
    fn malformed_json_field_names_the_field() {
        let input = UpsertPolicyInput {
            time_windows_json: "[{".into(),
            ..Default::default()
        };
        match PolicyWrite::try_from(input) {
            Err(Error::Wire { field, .. }) => assert_eq!(field, "time_windows_json"),
            other => panic!("expected a wire error, got {other:?}"),
        }
    }

    #[test]
    fn grant_flags_are_inline() {
        let input: CreateGrantInput = serde_json::from_value(serde_json::json!({
            "subject_id": "kid",
            "authority_basis": "minor_guardianship",
            "evidence_hash": "sha256:abc",
            "verified_by": "registry",
            "content_filtering": true,
            "time_limits": true,
            "expires_in_days": 365,
            "review_in_days": 90
        }))
        .unwrap();
        let grant = NewGrant::from(input);
        assert!(grant.capabilities.content_filtering && grant.capabilities.time_limits);
        assert!(!grant.capabilities.policy_delegation);
    }

    #[test]
    fn computed_policy_sets_are_json_strings() {
        let mut policy = ComputedPolicy::unrestricted("kid");
        policy.content.blocked_categories.insert("gambling".into());
        policy.features.disabled_routes.insert("/admin/**".into());

        let out = ComputedPolicyOutput::new(&policy).unwrap();
        assert_eq!(out.blocked_categories_json, r#"["gambling"]"#);
        assert_eq!(
            set_from_json("disabled_routes_json", &out.disabled_routes_json).unwrap(),
            BTreeSet::from(["/admin/**".to_string()])
        );
        assert_eq!(out.time_windows_json, "[]");
    }
}
