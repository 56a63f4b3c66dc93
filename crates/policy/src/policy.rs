//! Policy layers as authored and stored.

use crate::{ContentRules, FeatureRules, MonitoringRules, Result, RuleSet, Tier, TimeRules};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a device policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(pub Uuid);

impl PolicyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PolicyId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(Self)
            .map_err(|_| crate::Error::Parse(format!("invalid policy id '{s}'")))
    }
}

/// One author's layer of rules for a subject (optionally one device).
///
/// Layers compose root authority first; each layer can only add
/// restrictions to what its ancestors impose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePolicy {
    pub id: PolicyId,
    pub subject_id: String,
    pub device_id: Option<String>,

    pub author_id: String,
    pub author_tier: Tier,
    pub inherits_from: Option<PolicyId>,

    pub content: ContentRules,
    pub time: TimeRules,
    pub features: FeatureRules,
    pub monitoring: MonitoringRules,

    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DevicePolicy {
    /// Start a new layer at version 1.
    pub fn new(
        subject_id: impl Into<String>,
        author_id: impl Into<String>,
        author_tier: Tier,
        rules: RuleSet,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PolicyId::new(),
            subject_id: subject_id.into(),
            device_id: None,
            author_id: author_id.into(),
            author_tier,
            inherits_from: None,
            content: rules.content,
            time: rules.time,
            features: rules.features,
            monitoring: rules.monitoring.unwrap_or_default(),
            effective_from: now,
            effective_until: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    /// Replace the rules in place. Monitoring is kept when `rules` omits it.
    pub fn apply_rules(&mut self, rules: RuleSet, now: DateTime<Utc>) {
        self.content = rules.content;
        self.time = rules.time;
        self.features = rules.features;
        if let Some(monitoring) = rules.monitoring {
            self.monitoring = monitoring;
        }
        self.updated_at = now;
    }

    pub fn rules(&self) -> RuleSet {
        RuleSet {
            content: self.content.clone(),
            time: self.time.clone(),
            features: self.features.clone(),
            monitoring: Some(self.monitoring.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject_id.is_empty() {
            return Err(crate::Error::Invalid("subject_id cannot be empty".into()));
        }
        if self.author_id.is_empty() {
            return Err(crate::Error::Invalid("author_id cannot be empty".into()));
        }
        self.rules().validate()
    }

    /// Whether the layer is in force at `now`.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_from <= now && self.effective_until.is_none_or(|until| now < until)
    }
}

/// A position in a subject's policy chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChainLink {
    pub subject_id: String,
    pub policy_id: PolicyId,
    pub author_tier: Tier,
    pub ordinal: u32,
}

/// Order layers root authority first, subject-closest last.
pub fn order_chain(layers: &mut [DevicePolicy]) {
    layers.sort_by(|a, b| {
        a.author_tier
            .chain_rank()
            .cmp(&b.author_tier.chain_rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Build chain links for layers that are already ordered.
pub fn chain_links(layers: &[DevicePolicy]) -> Vec<PolicyChainLink> {
    layers
        .iter()
        .enumerate()
        .map(|(i, p)| PolicyChainLink {
            subject_id: p.subject_id.clone(),
            policy_id: p.id,
            author_tier: p.author_tier,
            ordinal: i as u32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn layer(tier: Tier, now: DateTime<Utc>) -> DevicePolicy {
        DevicePolicy::new("kid", format!("{tier}-author"), tier, RuleSet::default(), now)
    }

    #[test]
    fn chain_is_ordered_by_tier_rank() {
        let now = Utc::now();
        let mut layers = vec![
            layer(Tier::Personal, now),
            layer(Tier::Guardian, now),
            layer(Tier::Coordinator, now),
        ];
        order_chain(&mut layers);
        let links = chain_links(&layers);
        let tiers: Vec<_> = links.iter().map(|l| l.author_tier).collect();
        assert_eq!(tiers, vec![Tier::Coordinator, Tier::Guardian, Tier::Personal]);
        assert_eq!(links[2].ordinal, 2);
    }

    #[test]
    fn effectiveness_interval() {
        let now = Utc::now();
        let mut p = layer(Tier::Guardian, now);
        assert!(p.is_effective_at(now));
        assert!(!p.is_effective_at(now - Duration::seconds(1)));
        p.effective_until = Some(now + Duration::days(1));
        assert!(!p.is_effective_at(now + Duration::days(1)));
    }

    #[test]
    fn apply_rules_keeps_monitoring_when_omitted() {
        let now = Utc::now();
        let mut p = layer(Tier::Guardian, now);
        p.monitoring.log_sessions = true;
        p.apply_rules(RuleSet::default(), now);
        assert!(p.monitoring.log_sessions);
    }
}
