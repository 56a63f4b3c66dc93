//! Who holds effective authority over a subject right now.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stewardship::{ArbitrationLayer, GrantId, GrantStatus, Limits, StewardshipGrant};

/// Agents who arbitrate above the steward layer without holding a grant
/// over the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Arbitrators {
    pub community: BTreeSet<String>,
    /// Also sit at the community layer.
    pub constitutional: BTreeSet<String>,
}

impl Arbitrators {
    pub fn seats(&self, agent: &str, layer: ArbitrationLayer) -> bool {
        match layer {
            ArbitrationLayer::Steward => false,
            ArbitrationLayer::Community => {
                self.community.contains(agent) || self.constitutional.contains(agent)
            }
            ArbitrationLayer::Constitutional => self.constitutional.contains(agent),
        }
    }
}

/// A subject's grants indexed for chain walks.
pub struct Authority<'a> {
    by_id: HashMap<GrantId, &'a StewardshipGrant>,
    limits: &'a Limits,
    now: DateTime<Utc>,
}

impl<'a> Authority<'a> {
    pub fn new(grants: &'a [StewardshipGrant], limits: &'a Limits, now: DateTime<Utc>) -> Self {
        Self {
            by_id: grants.iter().map(|g| (g.id, g)).collect(),
            limits,
            now,
        }
    }

    /// Ancestors of `grant`, nearest first. `None` if the chain is broken.
    pub fn ancestors(&self, grant: &StewardshipGrant) -> Option<Vec<&'a StewardshipGrant>> {
        let mut out = Vec::new();
        let mut next = grant.delegated_from;
        while let Some(id) = next {
            if out.len() > self.limits.max_delegation_depth as usize {
                return None;
            }
            let parent = self.by_id.get(&id)?;
            out.push(*parent);
            next = parent.delegated_from;
        }
        Some(out)
    }

    pub fn effective_status(&self, grant: &StewardshipGrant) -> GrantStatus {
        match self.ancestors(grant) {
            Some(ancestors) => grant.effective_status(ancestors, self.limits, self.now),
            None => GrantStatus::Revoked,
        }
    }

    /// Grants held by `steward_id` that currently confer authority.
    pub fn effective_for(&self, steward_id: &str) -> Vec<&'a StewardshipGrant> {
        let mut grants: Vec<_> = self
            .by_id
            .values()
            .copied()
            .filter(|g| g.steward_id == steward_id && self.effective_status(g).is_effective())
            .collect();
        grants.sort_by(|a, b| b.tier.cmp(&a.tier).then(a.granted_at.cmp(&b.granted_at)));
        grants
    }

    /// The strongest effective grant held by `steward_id`, if any.
    pub fn strongest_for(&self, steward_id: &str) -> Option<&'a StewardshipGrant> {
        self.effective_for(steward_id).into_iter().next()
    }

    /// Whether `actor` holds an effective grant strong enough to arbitrate
    /// at `layer`.
    pub fn may_arbitrate(&self, actor: &str, layer: ArbitrationLayer) -> bool {
        match (layer.minimum_tier(), self.strongest_for(actor)) {
            (Some(minimum), Some(grant)) => grant.tier >= minimum,
            _ => false,
        }
    }

    /// Whether `actor` stewards any ancestor of `grant`.
    pub fn stewards_ancestor_of(&self, actor: &str, grant: &StewardshipGrant) -> bool {
        self.ancestors(grant)
            .is_some_and(|a| a.iter().any(|g| g.steward_id == actor))
    }
}
