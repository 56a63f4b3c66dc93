use serde::{Deserialize, Serialize};

/// Capability families a steward can be granted over a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    ContentFiltering,
    TimeLimits,
    FeatureRestrictions,
    ActivityMonitoring,
    PolicyDelegation,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 5] = [
        CapabilityKind::ContentFiltering,
        CapabilityKind::TimeLimits,
        CapabilityKind::FeatureRestrictions,
        CapabilityKind::ActivityMonitoring,
        CapabilityKind::PolicyDelegation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::ContentFiltering => "content_filtering",
            CapabilityKind::TimeLimits => "time_limits",
            CapabilityKind::FeatureRestrictions => "feature_restrictions",
            CapabilityKind::ActivityMonitoring => "activity_monitoring",
            CapabilityKind::PolicyDelegation => "policy_delegation",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The capability scope carried by a stewardship grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityFlags {
    #[serde(default)]
    pub content_filtering: bool,
    #[serde(default)]
    pub time_limits: bool,
    #[serde(default)]
    pub feature_restrictions: bool,
    #[serde(default)]
    pub activity_monitoring: bool,
    #[serde(default)]
    pub policy_delegation: bool,
}

impl CapabilityFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            content_filtering: true,
            time_limits: true,
            feature_restrictions: true,
            activity_monitoring: true,
            policy_delegation: true,
        }
    }

    pub fn from_kinds(kinds: impl IntoIterator<Item = CapabilityKind>) -> Self {
        let mut flags = Self::none();
        for kind in kinds {
            flags.set(kind, true);
        }
        flags
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::ContentFiltering => self.content_filtering,
            CapabilityKind::TimeLimits => self.time_limits,
            CapabilityKind::FeatureRestrictions => self.feature_restrictions,
            CapabilityKind::ActivityMonitoring => self.activity_monitoring,
            CapabilityKind::PolicyDelegation => self.policy_delegation,
        }
    }

    pub fn set(&mut self, kind: CapabilityKind, enabled: bool) {
        match kind {
            CapabilityKind::ContentFiltering => self.content_filtering = enabled,
            CapabilityKind::TimeLimits => self.time_limits = enabled,
            CapabilityKind::FeatureRestrictions => self.feature_restrictions = enabled,
            CapabilityKind::ActivityMonitoring => self.activity_monitoring = enabled,
            CapabilityKind::PolicyDelegation => self.policy_delegation = enabled,
        }
    }

    /// Enabled capabilities, in declaration order.
    pub fn enabled(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        CapabilityKind::ALL.into_iter().filter(|k| self.has(*k))
    }

    /// True when every capability enabled here is also enabled in `other`.
    pub fn is_subset_of(&self, other: &CapabilityFlags) -> bool {
        self.enabled().all(|k| other.has(k))
    }

    /// Capabilities enabled here but missing from `other`.
    pub fn excess_over(&self, other: &CapabilityFlags) -> Vec<CapabilityKind> {
        self.enabled().filter(|k| !other.has(*k)).collect()
    }
}

/// Per-flag overrides requested when delegating a grant.
///
/// `None` keeps the parent's value, except for `policy_delegation` which
/// is off unless explicitly requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityOverrides {
    #[serde(default)]
    pub content_filtering: Option<bool>,
    #[serde(default)]
    pub time_limits: Option<bool>,
    #[serde(default)]
    pub feature_restrictions: Option<bool>,
    #[serde(default)]
    pub activity_monitoring: Option<bool>,
    #[serde(default)]
    pub policy_delegation: Option<bool>,
}

impl CapabilityOverrides {
    pub fn get(&self, kind: CapabilityKind) -> Option<bool> {
        match kind {
            CapabilityKind::ContentFiltering => self.content_filtering,
            CapabilityKind::TimeLimits => self.time_limits,
            CapabilityKind::FeatureRestrictions => self.feature_restrictions,
            CapabilityKind::ActivityMonitoring => self.activity_monitoring,
            CapabilityKind::PolicyDelegation => self.policy_delegation,
        }
    }

    /// Apply the overrides on top of `parent`, without checking scope.
    pub fn apply_to(&self, parent: &CapabilityFlags) -> CapabilityFlags {
        let mut flags = CapabilityFlags::none();
        for kind in CapabilityKind::ALL {
            let inherited = match kind {
                CapabilityKind::PolicyDelegation => false,
                _ => parent.has(kind),
            };
            flags.set(kind, self.get(kind).unwrap_or(inherited));
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_relation() {
        let parent = CapabilityFlags {
            content_filtering: true,
            time_limits: true,
            ..Default::default()
        };
        let child = CapabilityFlags {
            time_limits: true,
            ..Default::default()
        };
        assert!(child.is_subset_of(&parent));
        assert!(!parent.is_subset_of(&child));
        assert_eq!(parent.excess_over(&child), vec![CapabilityKind::ContentFiltering]);
    }

    #[test]
    fn overrides_default_to_parent_without_delegation() {
        let parent = CapabilityFlags::all();
        let child = CapabilityOverrides {
            activity_monitoring: Some(false),
            ..Default::default()
        }
        .apply_to(&parent);

        assert!(child.content_filtering);
        assert!(!child.activity_monitoring);
        assert!(!child.policy_delegation);
    }

    #[test]
    fn overrides_can_request_more_than_parent() {
        // Scope is checked by the caller; apply_to only composes.
        let parent = CapabilityFlags::none();
        let child = CapabilityOverrides {
            time_limits: Some(true),
            ..Default::default()
        }
        .apply_to(&parent);
        assert_eq!(child.excess_over(&parent), vec![CapabilityKind::TimeLimits]);
    }
}
