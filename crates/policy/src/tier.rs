//! Steward capability tiers.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Capability tier of a policy author, ordered by edit authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Self-imposed limits on one's own settings.
    #[serde(rename = "self")]
    Personal,
    /// Advisory only; may suggest but not author policy.
    Guide,
    /// Manages settings for verified dependents.
    Guardian,
    /// Manages settings across an organization or community.
    Coordinator,
    /// Governance-level authority.
    Constitutional,
}

/// What a tier may do with policy layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPermissions {
    pub can_edit: bool,
    pub can_view: bool,
    pub can_delegate: bool,
    /// Position in a subject's policy chain, root authority first.
    pub chain_rank: u8,
}

const PERMISSIONS: [TierPermissions; 5] = [
    // self
    TierPermissions { can_edit: true, can_view: true, can_delegate: false, chain_rank: 3 },
    // guide
    TierPermissions { can_edit: false, can_view: true, can_delegate: false, chain_rank: 4 },
    // guardian
    TierPermissions { can_edit: true, can_view: true, can_delegate: true, chain_rank: 1 },
    // coordinator
    TierPermissions { can_edit: true, can_view: true, can_delegate: true, chain_rank: 0 },
    // constitutional
    TierPermissions { can_edit: true, can_view: true, can_delegate: true, chain_rank: 2 },
];

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Personal,
        Tier::Guide,
        Tier::Guardian,
        Tier::Coordinator,
        Tier::Constitutional,
    ];

    pub fn permissions(self) -> &'static TierPermissions {
        &PERMISSIONS[self as usize]
    }

    /// Whether an author of this tier may edit a layer written at `layer`.
    pub fn can_edit(self, layer: Tier) -> bool {
        self.permissions().can_edit && (self == layer || self > layer)
    }

    /// Whether an author of this tier may read a layer written at `layer`.
    ///
    /// Every tier may read its own and lower layers; the subject may read
    /// everything imposed on them.
    pub fn can_view(self, layer: Tier) -> bool {
        self.permissions().can_view && (self == Tier::Personal || self >= layer)
    }

    /// Whether a grant at this tier may be passed on to another steward.
    pub fn can_delegate(self) -> bool {
        self.permissions().can_delegate
    }

    pub fn chain_rank(self) -> u8 {
        self.permissions().chain_rank
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Personal => "self",
            Tier::Guide => "guide",
            Tier::Guardian => "guardian",
            Tier::Coordinator => "coordinator",
            Tier::Constitutional => "constitutional",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Parse(format!("unknown tier '{s}'")))
    }
}
