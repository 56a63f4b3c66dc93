#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use engine::{Arbitrators, ManualClock, PolicyWrite, Service};
use policy::{CapabilityFlags, CapabilityKind, DevicePolicy, RuleSet};
use std::sync::Arc;
use stewardship::{AuthorityBasis, NewGrant, StewardshipGrant};
use storage::Store;

pub struct Harness {
    pub service: Service,
    pub clock: Arc<ManualClock>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(Arbitrators::default())
}

/// A harness where `community` sit as community arbitrators.
pub fn harness_seating(community: &[&str]) -> Harness {
    harness_with(Arbitrators {
        community: community.iter().map(|a| a.to_string()).collect(),
        ..Default::default()
    })
}

pub fn harness_with(arbitrators: Arbitrators) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let service = Service::new(Store::in_memory().unwrap())
        .with_clock(Arc::clone(&clock))
        .with_arbitrators(arbitrators);
    Harness { service, clock }
}

pub fn caps(kinds: &[CapabilityKind]) -> CapabilityFlags {
    CapabilityFlags::from_kinds(kinds.iter().copied())
}

pub fn new_grant(subject: &str, capabilities: CapabilityFlags) -> NewGrant {
    NewGrant {
        subject_id: subject.into(),
        tier: None,
        authority_basis: AuthorityBasis::MinorGuardianship,
        evidence_hash: Some("sha256:birth-certificate".into()),
        verified_by: "registry".into(),
        capabilities,
        delegatable: false,
        expires_in_days: 365,
        review_in_days: 90,
    }
}

impl Harness {
    pub fn grant(&self, steward: &str, subject: &str, kinds: &[CapabilityKind]) -> StewardshipGrant {
        self.service
            .create_stewardship_grant(steward, new_grant(subject, caps(kinds)))
            .unwrap()
    }

    /// The author's base layer for the subject, if written.
    pub fn layer(&self, author: &str, subject: &str) -> Option<DevicePolicy> {
        self.service
            .store()
            .list_by_subject::<DevicePolicy>(subject)
            .unwrap()
            .into_iter()
            .find(|p| p.author_id == author && p.device_id.is_none())
    }

    /// Write the author's base layer at its current version.
    pub fn write(&self, author: &str, subject: &str, rules: RuleSet) -> DevicePolicy {
        let expected_version = self.layer(author, subject).map(|p| p.version);
        self.service
            .upsert_policy(
                author,
                PolicyWrite {
                    subject_id: Some(subject.into()),
                    rules,
                    expected_version,
                    ..Default::default()
                },
            )
            .unwrap()
    }
}

pub fn blocking(categories: &[&str]) -> RuleSet {
    let mut rules = RuleSet::default();
    rules
        .content
        .blocked_categories
        .extend(categories.iter().map(|c| c.to_string()));
    rules
}

pub fn disabling(features: &[&str], routes: &[&str]) -> RuleSet {
    let mut rules = RuleSet::default();
    rules
        .features
        .disabled_features
        .extend(features.iter().map(|f| f.to_string()));
    rules
        .features
        .disabled_routes
        .extend(routes.iter().map(|r| r.to_string()));
    rules
}

pub const GUARDIAN_CAPS: [CapabilityKind; 3] = [
    CapabilityKind::ContentFiltering,
    CapabilityKind::FeatureRestrictions,
    CapabilityKind::TimeLimits,
];
