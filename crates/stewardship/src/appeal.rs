//! Appeals against stewardship grants.
//!
//! Anyone under stewardship can appeal. Nothing here consults the
//! subject's computed policy: a policy cannot disable the right to appeal.

use crate::{AuthorityBasis, Error, GrantId, GrantStatus, Limits, Result, StewardshipGrant};
use chrono::{DateTime, Utc};
use policy::{PolicyId, Tier};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppealId(pub Uuid);

impl AppealId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AppealId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AppealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppealId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(Self)
            .map_err(|_| Error::Invalid(format!("invalid appeal id '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealType {
    /// The capabilities granted are broader than the basis supports.
    Scope,
    /// The restrictions are disproportionate.
    Excessive,
    /// The evidence behind the grant is wrong.
    InvalidEvidence,
    /// The subject asks for a capability back.
    CapabilityRequest,
}

const SCOPE_GROUNDS: &[&str] = &[
    "Capabilities exceed what the authority basis covers",
    "Restrictions extend to areas the steward has no role in",
    "Delegation went beyond the original grant",
];

const EXCESSIVE_GROUNDS: &[&str] = &[
    "Restrictions are disproportionate to the concern",
    "Time limits prevent essential activities",
    "Monitoring is more invasive than necessary",
    "Restrictions have not been reviewed as promised",
];

const INVALID_EVIDENCE_GROUNDS: &[&str] = &[
    "The evidence does not establish the claimed authority",
    "The evidence is outdated",
    "The verifier was not independent",
];

const CAPABILITY_REQUEST_GROUNDS: &[&str] = &[
    "I have demonstrated responsible use",
    "My circumstances have changed",
    "I need this capability for school or work",
];

impl AppealType {
    pub const ALL: [AppealType; 4] = [
        AppealType::Scope,
        AppealType::Excessive,
        AppealType::InvalidEvidence,
        AppealType::CapabilityRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppealType::Scope => "scope",
            AppealType::Excessive => "excessive",
            AppealType::InvalidEvidence => "invalid_evidence",
            AppealType::CapabilityRequest => "capability_request",
        }
    }

    /// Predefined grounds offered for this type, in display order.
    pub fn grounds_catalog(self) -> &'static [&'static str] {
        match self {
            AppealType::Scope => SCOPE_GROUNDS,
            AppealType::Excessive => EXCESSIVE_GROUNDS,
            AppealType::InvalidEvidence => INVALID_EVIDENCE_GROUNDS,
            AppealType::CapabilityRequest => CAPABILITY_REQUEST_GROUNDS,
        }
    }
}

impl std::fmt::Display for AppealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppealType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Invalid(format!("unknown appeal type '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Filed,
    Assigned,
    Decided,
    Expired,
}

impl AppealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppealStatus::Filed => "filed",
            AppealStatus::Assigned => "assigned",
            AppealStatus::Decided => "decided",
            AppealStatus::Expired => "expired",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, AppealStatus::Filed | AppealStatus::Assigned)
    }
}

impl std::fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who arbitrates an appeal. Ordered by escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationLayer {
    Steward,
    Community,
    Constitutional,
}

impl ArbitrationLayer {
    /// Layer an appeal starts at.
    pub fn for_appeal(appeal_type: AppealType, basis: AuthorityBasis) -> Self {
        match appeal_type {
            AppealType::CapabilityRequest => ArbitrationLayer::Steward,
            AppealType::InvalidEvidence => ArbitrationLayer::Constitutional,
            AppealType::Scope | AppealType::Excessive => match basis {
                AuthorityBasis::CourtOrder | AuthorityBasis::CommunityConsensus => {
                    ArbitrationLayer::Constitutional
                }
                _ => ArbitrationLayer::Community,
            },
        }
    }

    pub fn escalate(self) -> Option<Self> {
        match self {
            ArbitrationLayer::Steward => Some(ArbitrationLayer::Community),
            ArbitrationLayer::Community => Some(ArbitrationLayer::Constitutional),
            ArbitrationLayer::Constitutional => None,
        }
    }

    /// Weakest grant tier that arbitrates at this layer. The steward layer
    /// belongs to the grant's own steward.
    pub fn minimum_tier(self) -> Option<Tier> {
        match self {
            ArbitrationLayer::Steward => None,
            ArbitrationLayer::Community => Some(Tier::Coordinator),
            ArbitrationLayer::Constitutional => Some(Tier::Constitutional),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArbitrationLayer::Steward => "steward",
            ArbitrationLayer::Community => "community",
            ArbitrationLayer::Constitutional => "constitutional",
        }
    }
}

impl std::fmt::Display for ArbitrationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealDecision {
    pub approved: bool,
    pub notes: String,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

/// What a decided or lapsed appeal does to its grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealOutcome {
    RevokeGrant,
    ReinstateGrant,
}

/// Everything needed to file, as collected by [`AppealDraft`] or sent
/// directly by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealFiling {
    pub grant_id: GrantId,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    pub appeal_type: AppealType,
    pub grounds: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub advocate_id: Option<String>,
    #[serde(default)]
    pub advocate_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StewardshipAppeal {
    pub id: AppealId,
    /// Always the grant's subject, including when an advocate filed.
    pub appellant_id: String,
    pub grant_id: GrantId,
    pub policy_id: Option<PolicyId>,

    pub appeal_type: AppealType,
    pub grounds: Vec<String>,
    pub evidence: Vec<String>,

    pub advocate_id: Option<String>,
    pub advocate_notes: Option<String>,

    pub arbitration_layer: ArbitrationLayer,
    pub assigned_to: Option<String>,

    pub status: AppealStatus,
    pub status_changed_at: DateTime<Utc>,
    pub decision: Option<AppealDecision>,

    pub filed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StewardshipAppeal {
    /// File an appeal against `grant`. The caller applies
    /// [`StewardshipGrant::mark_appealed`] in the same write.
    pub fn file(
        actor: &str,
        filing: AppealFiling,
        grant: &StewardshipGrant,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if filing.grant_id != grant.id {
            return Err(Error::Invalid("filing does not match grant".into()));
        }
        let acting_as_advocate = filing.advocate_id.as_deref() == Some(actor);
        if actor != grant.subject_id && !acting_as_advocate {
            return Err(Error::NotPermitted(
                "only the subject or their advocate can appeal a grant".into(),
            ));
        }
        let grounds: Vec<String> = filing
            .grounds
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        if grounds.is_empty() {
            return Err(Error::Invalid("an appeal needs at least one ground".into()));
        }
        if grant.status != GrantStatus::Active {
            return Err(Error::InvalidTransition {
                entity: "grant",
                from: grant.status.to_string(),
                action: "appeal",
            });
        }

        Ok(Self {
            id: AppealId::new(),
            appellant_id: grant.subject_id.clone(),
            grant_id: grant.id,
            policy_id: filing.policy_id,
            appeal_type: filing.appeal_type,
            grounds,
            evidence: filing.evidence,
            advocate_id: filing.advocate_id,
            advocate_notes: filing.advocate_notes,
            arbitration_layer: ArbitrationLayer::for_appeal(
                filing.appeal_type,
                grant.authority_basis,
            ),
            assigned_to: None,
            status: AppealStatus::Filed,
            status_changed_at: now,
            decision: None,
            filed_at: now,
            expires_at: now + limits.appeal_window(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    fn ensure_open(&self, action: &'static str, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_open() {
            return Err(Error::InvalidTransition {
                entity: "appeal",
                from: self.status.to_string(),
                action,
            });
        }
        if now >= self.expires_at {
            return Err(Error::Expired(format!("appeal {} is past its deadline", self.id)));
        }
        Ok(())
    }

    fn set_status(&mut self, status: AppealStatus, now: DateTime<Utc>) {
        self.status = status;
        self.status_changed_at = now;
        self.updated_at = now;
    }

    pub fn assign(&mut self, arbitrator: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open("assign", now)?;
        if arbitrator.is_empty() {
            return Err(Error::Invalid("arbitrator id is required".into()));
        }
        if arbitrator == self.appellant_id {
            return Err(Error::NotPermitted("an appellant cannot arbitrate their own appeal".into()));
        }
        self.assigned_to = Some(arbitrator.to_string());
        self.set_status(AppealStatus::Assigned, now);
        Ok(())
    }

    /// Whether `actor` may decide this appeal. Steward-layer appeals may be
    /// decided by the grant's steward until someone else is assigned.
    pub fn may_decide(&self, actor: &str, grant: &StewardshipGrant) -> bool {
        match &self.assigned_to {
            Some(arbitrator) => arbitrator == actor,
            None => self.arbitration_layer == ArbitrationLayer::Steward && grant.steward_id == actor,
        }
    }

    pub fn decide(
        &mut self,
        actor: &str,
        grant: &StewardshipGrant,
        approved: bool,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<AppealOutcome> {
        self.ensure_open("decide", now)?;
        if !self.may_decide(actor, grant) {
            return Err(Error::NotPermitted(format!(
                "{actor} is not the arbitrator for appeal {}",
                self.id
            )));
        }
        self.decision = Some(AppealDecision {
            approved,
            notes: notes.into(),
            decided_by: actor.to_string(),
            decided_at: now,
        });
        self.set_status(AppealStatus::Decided, now);
        Ok(self.outcome_for(approved))
    }

    fn outcome_for(&self, approved: bool) -> AppealOutcome {
        if approved && self.appeal_type != AppealType::CapabilityRequest {
            AppealOutcome::RevokeGrant
        } else {
            AppealOutcome::ReinstateGrant
        }
    }

    /// Move an undecided appeal to the next layer and clear the assignment.
    pub fn escalate(&mut self, now: DateTime<Utc>) -> Result<ArbitrationLayer> {
        self.ensure_open("escalate", now)?;
        let next = self
            .arbitration_layer
            .escalate()
            .ok_or_else(|| Error::InvalidTransition {
                entity: "appeal",
                from: self.arbitration_layer.to_string(),
                action: "escalate",
            })?;
        self.arbitration_layer = next;
        self.assigned_to = None;
        self.set_status(AppealStatus::Filed, now);
        Ok(next)
    }

    /// Expire an undecided appeal past its deadline. The grant is reinstated.
    pub fn expire_if_lapsed(&mut self, now: DateTime<Utc>) -> Option<AppealOutcome> {
        if !self.status.is_open() || now < self.expires_at {
            return None;
        }
        self.set_status(AppealStatus::Expired, now);
        Some(AppealOutcome::ReinstateGrant)
    }
}

/// Steps of the filing flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    Type,
    Grounds,
    Advocate,
    Review,
}

/// An appeal being assembled step by step before it is filed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppealDraft {
    step: Option<DraftStep>,
    appeal_type: Option<AppealType>,
    selected: Vec<&'static str>,
    custom_ground: String,
    advocate_id: Option<String>,
    advocate_notes: Option<String>,
}

impl AppealDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> DraftStep {
        self.step.unwrap_or(DraftStep::Type)
    }

    pub fn appeal_type(&self) -> Option<AppealType> {
        self.appeal_type
    }

    /// Choosing a different type drops grounds picked from the old catalog.
    pub fn choose_type(&mut self, appeal_type: AppealType) {
        if self.appeal_type != Some(appeal_type) {
            self.selected.clear();
        }
        self.appeal_type = Some(appeal_type);
    }

    /// Select or deselect a catalog ground. Returns whether it is now selected.
    pub fn toggle_ground(&mut self, ground: &str) -> Result<bool> {
        let appeal_type = self
            .appeal_type
            .ok_or_else(|| Error::Invalid("choose an appeal type first".into()))?;
        let entry = appeal_type
            .grounds_catalog()
            .iter()
            .find(|g| **g == ground)
            .ok_or_else(|| {
                Error::Invalid(format!("'{ground}' is not a ground for {appeal_type} appeals"))
            })?;
        if let Some(pos) = self.selected.iter().position(|g| g == entry) {
            self.selected.remove(pos);
            Ok(false)
        } else {
            self.selected.push(*entry);
            Ok(true)
        }
    }

    pub fn set_custom_ground(&mut self, text: impl Into<String>) {
        self.custom_ground = text.into();
    }

    pub fn request_advocate(&mut self, advocate_id: Option<String>, notes: Option<String>) {
        self.advocate_id = advocate_id;
        self.advocate_notes = notes;
    }

    /// Selected catalog grounds in catalog order, then the custom text.
    pub fn grounds(&self) -> Vec<String> {
        let mut grounds: Vec<String> = match self.appeal_type {
            Some(t) => t
                .grounds_catalog()
                .iter()
                .filter(|g| self.selected.contains(*g))
                .map(|g| g.to_string())
                .collect(),
            None => Vec::new(),
        };
        let custom = self.custom_ground.trim();
        if !custom.is_empty() {
            grounds.push(custom.to_string());
        }
        grounds
    }

    pub fn next(&mut self) -> Result<DraftStep> {
        let next = match self.step() {
            DraftStep::Type if self.appeal_type.is_none() => {
                return Err(Error::Invalid("choose an appeal type".into()));
            }
            DraftStep::Type => DraftStep::Grounds,
            DraftStep::Grounds if self.grounds().is_empty() => {
                return Err(Error::Invalid("select or write at least one ground".into()));
            }
            DraftStep::Grounds => DraftStep::Advocate,
            DraftStep::Advocate | DraftStep::Review => DraftStep::Review,
        };
        self.step = Some(next);
        Ok(next)
    }

    pub fn back(&mut self) -> DraftStep {
        let prev = match self.step() {
            DraftStep::Type | DraftStep::Grounds => DraftStep::Type,
            DraftStep::Advocate => DraftStep::Grounds,
            DraftStep::Review => DraftStep::Advocate,
        };
        self.step = Some(prev);
        prev
    }

    /// Produce the filing. Only valid from the review step.
    pub fn submit(
        &self,
        grant_id: GrantId,
        policy_id: Option<PolicyId>,
        evidence: Vec<String>,
    ) -> Result<AppealFiling> {
        if self.step() != DraftStep::Review {
            return Err(Error::Invalid("review the appeal before submitting".into()));
        }
        let appeal_type = self
            .appeal_type
            .ok_or_else(|| Error::Invalid("choose an appeal type".into()))?;
        Ok(AppealFiling {
            grant_id,
            policy_id,
            appeal_type,
            grounds: self.grounds(),
            evidence,
            advocate_id: self.advocate_id.clone(),
            advocate_notes: self.advocate_notes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewGrant;
    use chrono::Duration;
    use policy::CapabilityFlags;

    fn grant(basis: AuthorityBasis) -> StewardshipGrant {
        StewardshipGrant::create(
            "steward",
            NewGrant {
                subject_id: "subject".into(),
                tier: None,
                authority_basis: basis,
                evidence_hash: Some("sha256:abc".into()),
                verified_by: "notary".into(),
                capabilities: CapabilityFlags::all(),
                delegatable: false,
                expires_in_days: 365,
                review_in_days: 90,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn filing(grant: &StewardshipGrant, appeal_type: AppealType) -> AppealFiling {
        AppealFiling {
            grant_id: grant.id,
            policy_id: None,
            appeal_type,
            grounds: vec!["  too strict  ".into(), "   ".into()],
            evidence: Vec::new(),
            advocate_id: None,
            advocate_notes: None,
        }
    }

    #[test]
    fn arbitration_layer_depends_on_type_and_basis() {
        use AppealType::*;
        use ArbitrationLayer as L;
        assert_eq!(L::for_appeal(CapabilityRequest, AuthorityBasis::CourtOrder), L::Steward);
        assert_eq!(L::for_appeal(InvalidEvidence, AuthorityBasis::MutualConsent), L::Constitutional);
        assert_eq!(L::for_appeal(Scope, AuthorityBasis::MinorGuardianship), L::Community);
        assert_eq!(L::for_appeal(Excessive, AuthorityBasis::CourtOrder), L::Constitutional);
        assert_eq!(L::Constitutional.escalate(), None);
    }

    #[test]
    fn filing_trims_grounds_and_sets_deadline() {
        let now = Utc::now();
        let g = grant(AuthorityBasis::MinorGuardianship);
        let appeal =
            StewardshipAppeal::file("subject", filing(&g, AppealType::Excessive), &g, &Limits::default(), now)
                .unwrap();
        assert_eq!(appeal.grounds, vec!["too strict".to_string()]);
        assert_eq!(appeal.status, AppealStatus::Filed);
        assert_eq!(appeal.expires_at, now + Duration::days(30));
        assert_eq!(appeal.arbitration_layer, ArbitrationLayer::Community);
    }

    #[test]
    fn advocate_files_on_behalf_of_subject() {
        let g = grant(AuthorityBasis::MinorGuardianship);
        let mut f = filing(&g, AppealType::Scope);
        f.advocate_id = Some("advocate".into());
        let appeal =
            StewardshipAppeal::file("advocate", f, &g, &Limits::default(), Utc::now()).unwrap();
        assert_eq!(appeal.appellant_id, "subject");

        let stranger = StewardshipAppeal::file(
            "stranger",
            filing(&g, AppealType::Scope),
            &g,
            &Limits::default(),
            Utc::now(),
        );
        assert!(matches!(stranger, Err(Error::NotPermitted(_))));
    }

    #[test]
    fn empty_grounds_are_rejected() {
        let g = grant(AuthorityBasis::MinorGuardianship);
        let mut f = filing(&g, AppealType::Scope);
        f.grounds = vec![" ".into()];
        let result = StewardshipAppeal::file("subject", f, &g, &Limits::default(), Utc::now());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn approved_challenge_revokes_and_request_reinstates() {
        let now = Utc::now();
        let g = grant(AuthorityBasis::MinorGuardianship);
        let limits = Limits::default();

        let mut challenge =
            StewardshipAppeal::file("subject", filing(&g, AppealType::Scope), &g, &limits, now).unwrap();
        assert!(challenge.decide("steward", &g, true, "", now).is_err());
        challenge.assign("arbiter", now).unwrap();
        let outcome = challenge.decide("arbiter", &g, true, "agreed", now).unwrap();
        assert_eq!(outcome, AppealOutcome::RevokeGrant);
        assert!(challenge.decide("arbiter", &g, false, "", now).is_err());

        let mut request =
            StewardshipAppeal::file("subject", filing(&g, AppealType::CapabilityRequest), &g, &limits, now)
                .unwrap();
        let outcome = request.decide("steward", &g, true, "granted", now).unwrap();
        assert_eq!(outcome, AppealOutcome::ReinstateGrant);
    }

    #[test]
    fn escalation_and_expiry() {
        let now = Utc::now();
        let g = grant(AuthorityBasis::MinorGuardianship);
        let mut appeal = StewardshipAppeal::file(
            "subject",
            filing(&g, AppealType::CapabilityRequest),
            &g,
            &Limits::default(),
            now,
        )
        .unwrap();
        appeal.assign("arbiter", now).unwrap();
        assert_eq!(appeal.escalate(now).unwrap(), ArbitrationLayer::Community);
        assert!(appeal.assigned_to.is_none());
        assert_eq!(appeal.status, AppealStatus::Filed);

        assert!(appeal.expire_if_lapsed(now).is_none());
        let later = appeal.expires_at;
        assert!(appeal.assign("arbiter", later).is_err());
        assert_eq!(appeal.expire_if_lapsed(later), Some(AppealOutcome::ReinstateGrant));
        assert_eq!(appeal.status, AppealStatus::Expired);
    }

    #[test]
    fn draft_walks_steps_in_order() {
        let mut draft = AppealDraft::new();
        assert!(draft.next().is_err());
        draft.choose_type(AppealType::Excessive);
        assert_eq!(draft.next().unwrap(), DraftStep::Grounds);
        assert!(draft.next().is_err());

        let catalog = AppealType::Excessive.grounds_catalog();
        draft.toggle_ground(catalog[2]).unwrap();
        draft.toggle_ground(catalog[0]).unwrap();
        draft.set_custom_ground("  I need to call my friends ");
        assert!(draft.toggle_ground("made up").is_err());
        assert_eq!(
            draft.grounds(),
            vec![
                catalog[0].to_string(),
                catalog[2].to_string(),
                "I need to call my friends".to_string()
            ]
        );

        assert_eq!(draft.next().unwrap(), DraftStep::Advocate);
        assert!(draft.submit(GrantId::new(), None, Vec::new()).is_err());
        draft.request_advocate(Some("advocate".into()), None);
        assert_eq!(draft.next().unwrap(), DraftStep::Review);

        let filing = draft.submit(GrantId::new(), None, Vec::new()).unwrap();
        assert_eq!(filing.appeal_type, AppealType::Excessive);
        assert_eq!(filing.grounds.len(), 3);
        assert_eq!(filing.advocate_id.as_deref(), Some("advocate"));
    }

    #[test]
    fn changing_type_clears_catalog_selection() {
        let mut draft = AppealDraft::new();
        draft.choose_type(AppealType::Scope);
        draft.toggle_ground(AppealType::Scope.grounds_catalog()[0]).unwrap();
        draft.choose_type(AppealType::CapabilityRequest);
        assert!(draft.grounds().is_empty());
    }
}
