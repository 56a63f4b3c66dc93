//! Stewardship grants: authority to manage another agent's capabilities.
//!
//! Lifecycle: `active → {revoked, expired, appealed}` and
//! `appealed → {active, revoked}`. Grants are never deleted; a revoked
//! ancestor makes every delegated descendant effectively revoked, which is
//! computed when read rather than written into the descendants.

use crate::{AppealId, Error, Limits, Result};
use chrono::{DateTime, Duration, Utc};
use policy::{CapabilityFlags, CapabilityOverrides, Tier};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a stewardship grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantId(pub Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GrantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GrantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(Self)
            .map_err(|_| Error::Invalid(format!("invalid grant id '{s}'")))
    }
}

/// How a stewardship was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityBasis {
    MinorGuardianship,
    CourtOrder,
    MedicalNecessity,
    CommunityConsensus,
    OrganizationalRole,
    MutualConsent,
}

impl AuthorityBasis {
    pub const ALL: [AuthorityBasis; 6] = [
        AuthorityBasis::MinorGuardianship,
        AuthorityBasis::CourtOrder,
        AuthorityBasis::MedicalNecessity,
        AuthorityBasis::CommunityConsensus,
        AuthorityBasis::OrganizationalRole,
        AuthorityBasis::MutualConsent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityBasis::MinorGuardianship => "minor_guardianship",
            AuthorityBasis::CourtOrder => "court_order",
            AuthorityBasis::MedicalNecessity => "medical_necessity",
            AuthorityBasis::CommunityConsensus => "community_consensus",
            AuthorityBasis::OrganizationalRole => "organizational_role",
            AuthorityBasis::MutualConsent => "mutual_consent",
        }
    }
}

impl std::fmt::Display for AuthorityBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityBasis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| Error::Invalid(format!("unknown authority basis '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Revoked,
    Expired,
    Appealed,
}

impl GrantStatus {
    /// Strength of a status when combining along a delegation chain; the
    /// weakest link wins.
    fn rank(self) -> u8 {
        match self {
            GrantStatus::Active => 3,
            GrantStatus::Appealed => 2,
            GrantStatus::Expired => 1,
            GrantStatus::Revoked => 0,
        }
    }

    pub fn weakest(self, other: GrantStatus) -> GrantStatus {
        if other.rank() < self.rank() { other } else { self }
    }

    /// Whether a grant in this status still confers authority.
    ///
    /// An appeal does not suspend a grant; the arbitration outcome does.
    pub fn is_effective(self) -> bool {
        matches!(self, GrantStatus::Active | GrantStatus::Appealed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Revoked => "revoked",
            GrantStatus::Expired => "expired",
            GrantStatus::Appealed => "appealed",
        }
    }
}

impl std::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StewardshipGrant {
    pub id: GrantId,
    pub steward_id: String,
    pub subject_id: String,
    pub tier: Tier,

    pub authority_basis: AuthorityBasis,
    pub evidence_hash: Option<String>,
    pub verified_by: String,

    pub capabilities: CapabilityFlags,

    pub delegatable: bool,
    pub delegated_from: Option<GrantId>,
    pub delegation_depth: u32,

    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub review_at: DateTime<Utc>,
    pub review_interval_days: u32,
    pub status: GrantStatus,

    pub appeal_id: Option<AppealId>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for an original (depth 0) grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGrant {
    pub subject_id: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    pub authority_basis: AuthorityBasis,
    pub evidence_hash: Option<String>,
    pub verified_by: String,
    pub capabilities: CapabilityFlags,
    #[serde(default)]
    pub delegatable: bool,
    pub expires_in_days: u32,
    pub review_in_days: u32,
}

/// Input for delegating part of a grant to another steward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub parent_grant_id: GrantId,
    pub new_steward_id: String,
    #[serde(default)]
    pub overrides: CapabilityOverrides,
    #[serde(default)]
    pub delegatable: bool,
    pub expires_in_days: u32,
}

fn days(n: u32) -> Duration {
    Duration::days(i64::from(n))
}

impl StewardshipGrant {
    /// Create an original grant held by `steward_id`.
    pub fn create(steward_id: &str, input: NewGrant, now: DateTime<Utc>) -> Result<Self> {
        let evidence = input
            .evidence_hash
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        if evidence.is_none() {
            return Err(Error::EvidenceInvalid(
                "a grant requires an evidence reference".into(),
            ));
        }
        if input.verified_by.trim().is_empty() {
            return Err(Error::EvidenceInvalid("evidence must name its verifier".into()));
        }
        if input.subject_id.is_empty() || steward_id.is_empty() {
            return Err(Error::Invalid("steward and subject are required".into()));
        }
        if input.subject_id == steward_id {
            return Err(Error::NotPermitted("cannot grant stewardship to yourself".into()));
        }
        if input.expires_in_days == 0 {
            return Err(Error::Invalid("expires_in_days must be positive".into()));
        }
        if input.review_in_days == 0 {
            return Err(Error::Invalid("review_in_days must be positive".into()));
        }

        let tier = match input.tier {
            Some(Tier::Personal) => {
                return Err(Error::Invalid("grants cannot carry the self tier".into()));
            }
            Some(tier) => tier,
            None if input.capabilities.policy_delegation => Tier::Coordinator,
            None => Tier::Guardian,
        };

        let expires_at = now + days(input.expires_in_days);
        let review_at = (now + days(input.review_in_days)).min(expires_at);

        Ok(Self {
            id: GrantId::new(),
            steward_id: steward_id.to_string(),
            subject_id: input.subject_id,
            tier,
            authority_basis: input.authority_basis,
            evidence_hash: evidence.map(str::to_string),
            verified_by: input.verified_by,
            capabilities: input.capabilities,
            delegatable: input.delegatable,
            delegated_from: None,
            delegation_depth: 0,
            granted_at: now,
            expires_at,
            review_at,
            review_interval_days: input.review_in_days,
            status: GrantStatus::Active,
            appeal_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Derive a child grant. `parent_effective` is this grant's effective
    /// status along its own chain.
    pub fn delegate(
        &self,
        actor: &str,
        input: &Delegation,
        parent_effective: GrantStatus,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if self.steward_id != actor {
            return Err(Error::NotPermitted("only the steward can delegate a grant".into()));
        }
        match parent_effective {
            GrantStatus::Active => {}
            GrantStatus::Expired => {
                return Err(Error::Expired(format!("grant {} has lapsed", self.id)));
            }
            other => {
                return Err(Error::InvalidTransition {
                    entity: "grant",
                    from: other.to_string(),
                    action: "delegate",
                });
            }
        }
        if !self.delegatable {
            return Err(Error::NotPermitted("this grant cannot be delegated".into()));
        }
        if !self.tier.can_delegate() {
            return Err(Error::NotPermitted(format!(
                "{} grants cannot be delegated",
                self.tier
            )));
        }
        let depth = self.delegation_depth + 1;
        if depth > limits.max_delegation_depth {
            return Err(Error::ScopeExceeded(format!(
                "maximum delegation depth {} reached",
                limits.max_delegation_depth
            )));
        }
        let capabilities = input.overrides.apply_to(&self.capabilities);
        let excess = capabilities.excess_over(&self.capabilities);
        if !excess.is_empty() {
            let names: Vec<_> = excess.iter().map(|k| k.as_str()).collect();
            return Err(Error::ScopeExceeded(format!(
                "parent grant does not hold {}",
                names.join(", ")
            )));
        }
        if input.new_steward_id.is_empty() || input.new_steward_id == self.subject_id {
            return Err(Error::Invalid("invalid delegate steward".into()));
        }
        if input.expires_in_days == 0 {
            return Err(Error::Invalid("expires_in_days must be positive".into()));
        }

        let expires_at = (now + days(input.expires_in_days)).min(self.expires_at);

        Ok(Self {
            id: GrantId::new(),
            steward_id: input.new_steward_id.clone(),
            subject_id: self.subject_id.clone(),
            tier: self.tier,
            authority_basis: self.authority_basis,
            evidence_hash: self.evidence_hash.clone(),
            verified_by: actor.to_string(),
            capabilities,
            delegatable: input.delegatable && depth < limits.max_delegation_depth,
            delegated_from: Some(self.id),
            delegation_depth: depth,
            granted_at: now,
            expires_at,
            review_at: expires_at,
            review_interval_days: input.expires_in_days,
            status: GrantStatus::Active,
            appeal_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Revoke this grant. Returns `false` if it was already terminal.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            GrantStatus::Active | GrantStatus::Appealed => {
                self.status = GrantStatus::Revoked;
                self.appeal_id = None;
                self.updated_at = now;
                true
            }
            GrantStatus::Revoked | GrantStatus::Expired => false,
        }
    }

    pub fn mark_appealed(&mut self, appeal_id: AppealId, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            GrantStatus::Active | GrantStatus::Appealed => {
                self.status = GrantStatus::Appealed;
                self.appeal_id = Some(appeal_id);
                self.updated_at = now;
                Ok(())
            }
            other => Err(Error::InvalidTransition {
                entity: "grant",
                from: other.to_string(),
                action: "appeal",
            }),
        }
    }

    /// The appeal failed or lapsed: the grant stands.
    pub fn reinstate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.close_appeal(GrantStatus::Active, "reinstate", now)
    }

    /// The appeal succeeded: the grant is revoked.
    pub fn uphold_appeal(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.close_appeal(GrantStatus::Revoked, "uphold appeal against", now)
    }

    fn close_appeal(&mut self, to: GrantStatus, action: &'static str, now: DateTime<Utc>) -> Result<()> {
        if self.status != GrantStatus::Appealed {
            return Err(Error::InvalidTransition {
                entity: "grant",
                from: self.status.to_string(),
                action,
            });
        }
        self.status = to;
        self.appeal_id = None;
        self.updated_at = now;
        Ok(())
    }

    /// Steward reconfirms the grant; the next review moves forward.
    pub fn review(&mut self, actor: &str, limits: &Limits, now: DateTime<Utc>) -> Result<()> {
        if self.steward_id != actor {
            return Err(Error::NotPermitted("only the steward can review a grant".into()));
        }
        if !self.status.is_effective() {
            return Err(Error::InvalidTransition {
                entity: "grant",
                from: self.status.to_string(),
                action: "review",
            });
        }
        if let Some(reason) = self.lapse_reason(limits, now) {
            return Err(Error::Expired(format!("grant {}: {reason}", self.id)));
        }
        self.review_at = (now + days(self.review_interval_days.max(1))).min(self.expires_at);
        self.updated_at = now;
        Ok(())
    }

    /// Why a still-active grant should be expired at `now`, if it should.
    pub fn lapse_reason(&self, limits: &Limits, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.status.is_effective() {
            return None;
        }
        if now >= self.expires_at {
            Some("past expiry")
        } else if now > self.review_at + limits.review_grace() {
            Some("review overdue")
        } else {
            None
        }
    }

    /// Expire the grant if it has lapsed. Returns whether it changed.
    pub fn expire_if_lapsed(&mut self, limits: &Limits, now: DateTime<Utc>) -> bool {
        if self.lapse_reason(limits, now).is_none() {
            return false;
        }
        self.status = GrantStatus::Expired;
        self.updated_at = now;
        true
    }

    /// Own status with time-based lapse applied, without writing it.
    pub fn status_at(&self, limits: &Limits, now: DateTime<Utc>) -> GrantStatus {
        if self.lapse_reason(limits, now).is_some() {
            GrantStatus::Expired
        } else {
            self.status
        }
    }

    /// Status for access decisions: the weakest of this grant and every
    /// ancestor it was delegated from.
    pub fn effective_status<'a>(
        &self,
        ancestors: impl IntoIterator<Item = &'a StewardshipGrant>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> GrantStatus {
        ancestors
            .into_iter()
            .fold(self.status_at(limits, now), |acc, g| acc.weakest(g.status_at(limits, now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::CapabilityKind;

    fn new_grant() -> NewGrant {
        NewGrant {
            subject_id: "kid".into(),
            tier: None,
            authority_basis: AuthorityBasis::MinorGuardianship,
            evidence_hash: Some("sha256:birth-cert".into()),
            verified_by: "registry".into(),
            capabilities: CapabilityFlags {
                content_filtering: true,
                time_limits: true,
                ..Default::default()
            },
            delegatable: true,
            expires_in_days: 365,
            review_in_days: 90,
        }
    }

    fn delegation(parent: &StewardshipGrant) -> Delegation {
        Delegation {
            parent_grant_id: parent.id,
            new_steward_id: "aunt".into(),
            overrides: CapabilityOverrides::default(),
            delegatable: true,
            expires_in_days: 30,
        }
    }

    #[test]
    fn create_requires_evidence() {
        let now = Utc::now();
        let mut input = new_grant();
        input.evidence_hash = Some("   ".into());
        assert!(matches!(
            StewardshipGrant::create("parent", input, now),
            Err(Error::EvidenceInvalid(_))
        ));

        let grant = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        assert_eq!(grant.delegation_depth, 0);
        assert_eq!(grant.status, GrantStatus::Active);
        assert_eq!(grant.tier, Tier::Guardian);
        assert_eq!(grant.review_at, now + Duration::days(90));
    }

    #[test]
    fn cannot_steward_yourself() {
        let result = StewardshipGrant::create("kid", new_grant(), Utc::now());
        assert!(matches!(result, Err(Error::NotPermitted(_))));
    }

    #[test]
    fn delegation_is_a_subset_one_level_deeper() {
        let now = Utc::now();
        let parent = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        let mut input = delegation(&parent);
        input.overrides.time_limits = Some(false);

        let child = parent
            .delegate("parent", &input, GrantStatus::Active, &Limits::default(), now)
            .unwrap();
        assert!(child.capabilities.is_subset_of(&parent.capabilities));
        assert!(!child.capabilities.time_limits);
        assert_eq!(child.delegation_depth, parent.delegation_depth + 1);
        assert_eq!(child.delegated_from, Some(parent.id));
        assert_eq!(child.review_at, child.expires_at);
    }

    #[test]
    fn superset_delegation_is_rejected() {
        let now = Utc::now();
        let parent = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        let mut input = delegation(&parent);
        input.overrides.activity_monitoring = Some(true);

        let err = parent
            .delegate("parent", &input, GrantStatus::Active, &Limits::default(), now)
            .unwrap_err();
        match err {
            Error::ScopeExceeded(msg) => {
                assert!(msg.contains(CapabilityKind::ActivityMonitoring.as_str()))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn advisory_tiers_cannot_delegate() {
        let now = Utc::now();
        let mut input = new_grant();
        input.tier = Some(Tier::Guide);
        let mentor = StewardshipGrant::create("mentor", input, now).unwrap();
        assert!(mentor.delegatable);

        let err = mentor
            .delegate("mentor", &delegation(&mentor), GrantStatus::Active, &Limits::default(), now)
            .unwrap_err();
        assert!(matches!(err, Error::NotPermitted(_)));
    }

    #[test]
    fn delegation_depth_is_bounded() {
        let now = Utc::now();
        let limits = Limits {
            max_delegation_depth: 1,
            ..Default::default()
        };
        let parent = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        let child = parent
            .delegate("parent", &delegation(&parent), GrantStatus::Active, &limits, now)
            .unwrap();
        assert!(!child.delegatable);

        let mut forced = child.clone();
        forced.delegatable = true;
        let mut input = delegation(&forced);
        input.new_steward_id = "cousin".into();
        let err = forced
            .delegate("aunt", &input, GrantStatus::Active, &limits, now)
            .unwrap_err();
        assert!(matches!(err, Error::ScopeExceeded(_)));
    }

    #[test]
    fn child_expiry_never_exceeds_parent() {
        let now = Utc::now();
        let mut input = new_grant();
        input.expires_in_days = 10;
        input.review_in_days = 5;
        let parent = StewardshipGrant::create("parent", input, now).unwrap();
        let mut d = delegation(&parent);
        d.expires_in_days = 100;
        let child = parent
            .delegate("parent", &d, GrantStatus::Active, &Limits::default(), now)
            .unwrap();
        assert_eq!(child.expires_at, parent.expires_at);
    }

    #[test]
    fn revoked_ancestor_revokes_descendants_at_read_time() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut parent = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        let child = parent
            .delegate("parent", &delegation(&parent), GrantStatus::Active, &limits, now)
            .unwrap();

        assert!(parent.revoke(now));
        assert_eq!(child.status, GrantStatus::Active);
        assert_eq!(child.effective_status([&parent], &limits, now), GrantStatus::Revoked);
        assert!(!parent.revoke(now));
    }

    #[test]
    fn missed_review_expires_after_grace() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut grant = StewardshipGrant::create("parent", new_grant(), now).unwrap();

        let within_grace = grant.review_at + Duration::days(3);
        assert!(!grant.expire_if_lapsed(&limits, within_grace));

        let late = grant.review_at + limits.review_grace() + Duration::hours(1);
        assert_eq!(grant.status_at(&limits, late), GrantStatus::Expired);
        assert!(grant.review("parent", &limits, late).is_err());
        assert!(grant.expire_if_lapsed(&limits, late));
        assert_eq!(grant.status, GrantStatus::Expired);
    }

    #[test]
    fn review_moves_the_next_review_forward() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut grant = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        let at = grant.review_at;
        grant.review("parent", &limits, at).unwrap();
        assert_eq!(grant.review_at, at + Duration::days(90));
        assert!(grant.review("someone-else", &limits, at).is_err());
    }

    #[test]
    fn appeal_transitions() {
        let now = Utc::now();
        let mut grant = StewardshipGrant::create("parent", new_grant(), now).unwrap();
        assert!(grant.reinstate(now).is_err());

        grant.mark_appealed(AppealId::new(), now).unwrap();
        assert_eq!(grant.status, GrantStatus::Appealed);
        assert!(grant.status.is_effective());
        grant.reinstate(now).unwrap();
        assert_eq!(grant.status, GrantStatus::Active);
        assert!(grant.appeal_id.is_none());

        grant.mark_appealed(AppealId::new(), now).unwrap();
        grant.uphold_appeal(now).unwrap();
        assert_eq!(grant.status, GrantStatus::Revoked);
        assert!(grant.mark_appealed(AppealId::new(), now).is_err());
    }
}
