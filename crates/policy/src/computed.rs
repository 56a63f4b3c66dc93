//! Folding a policy chain into one decision surface.

use crate::{
    is_inalienable, ContentRules, DevicePolicy, FeatureRules, MonitoringRules, PolicyId, Tier,
    TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Freshness token for a computed policy: every contributing entity id
/// mapped to the version that was folded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainVersion(pub BTreeMap<String, u64>);

impl ChainVersion {
    pub fn record(&mut self, id: impl Into<String>, version: u64) {
        self.0.insert(id.into(), version);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Numeric time ceilings after merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    pub session_max_minutes: Option<u32>,
    pub daily_max_minutes: Option<u32>,
    pub cooldown_minutes: Option<u32>,
}

/// Time windows configured by a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerWindows {
    pub policy_id: PolicyId,
    pub author_tier: Tier,
    pub windows: Vec<TimeWindow>,
}

/// The merged decision surface for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedPolicy {
    pub subject_id: String,
    pub content: ContentRules,
    pub time: TimeLimits,
    /// Windows per layer, chain order. Never intersected here.
    pub time_windows: Vec<LayerWindows>,
    pub features: FeatureRules,
    pub monitoring: MonitoringRules,
    /// Layers folded, chain order.
    pub layers: Vec<PolicyId>,
    pub chain_version: ChainVersion,
}

fn tighter<T: Ord + Copy>(current: Option<T>, layer: Option<T>) -> Option<T> {
    match (current, layer) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl ComputedPolicy {
    /// The policy of a subject with no chain: nothing restricted.
    pub fn unrestricted(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            content: ContentRules::default(),
            time: TimeLimits::default(),
            time_windows: Vec::new(),
            features: FeatureRules::default(),
            monitoring: MonitoringRules {
                subject_can_view: true,
                ..Default::default()
            },
            layers: Vec::new(),
            chain_version: ChainVersion::default(),
        }
    }

    /// Fold an ordered chain, root authority first.
    pub fn fold<'a>(
        subject_id: impl Into<String>,
        chain: impl IntoIterator<Item = &'a DevicePolicy>,
    ) -> Self {
        let mut computed = Self::unrestricted(subject_id);
        for layer in chain {
            computed.merge(layer);
        }
        computed
    }

    /// Add one layer. Restriction sets only grow and ceilings only tighten.
    pub fn merge(&mut self, layer: &DevicePolicy) {
        let content = &mut self.content;
        content
            .blocked_categories
            .extend(layer.content.blocked_categories.iter().cloned());
        content
            .blocked_hashes
            .extend(layer.content.blocked_hashes.iter().cloned());
        content.age_rating_max = tighter(content.age_rating_max, layer.content.age_rating_max);
        content.reach_level_max = tighter(content.reach_level_max, layer.content.reach_level_max);

        let time = &mut self.time;
        time.session_max_minutes = tighter(time.session_max_minutes, layer.time.session_max_minutes);
        time.daily_max_minutes = tighter(time.daily_max_minutes, layer.time.daily_max_minutes);
        time.cooldown_minutes = tighter(time.cooldown_minutes, layer.time.cooldown_minutes);
        if !layer.time.time_windows.is_empty() {
            self.time_windows.push(LayerWindows {
                policy_id: layer.id,
                author_tier: layer.author_tier,
                windows: layer.time.time_windows.clone(),
            });
        }

        let features = &mut self.features;
        features.disabled_features.extend(
            layer
                .features
                .disabled_features
                .iter()
                .filter(|f| !is_inalienable(f))
                .cloned(),
        );
        features
            .disabled_routes
            .extend(layer.features.disabled_routes.iter().cloned());
        features
            .require_approval
            .extend(layer.features.require_approval.iter().cloned());

        let monitoring = &mut self.monitoring;
        monitoring.log_sessions |= layer.monitoring.log_sessions;
        monitoring.log_categories |= layer.monitoring.log_categories;
        monitoring.log_policy_events |= layer.monitoring.log_policy_events;
        monitoring.retention_days = monitoring.retention_days.max(layer.monitoring.retention_days);
        monitoring.subject_can_view &= layer.monitoring.subject_can_view;

        self.layers.push(layer.id);
        self.chain_version.record(layer.id.to_string(), layer.version);
    }

    pub fn is_unrestricted(&self) -> bool {
        self.content.is_empty()
            && self.time == TimeLimits::default()
            && self.time_windows.is_empty()
            && self.features.is_empty()
    }
}
