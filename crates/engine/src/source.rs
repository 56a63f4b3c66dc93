//! Fetching a subject's policy chain.

use crate::{Authority, Result};
use chrono::{DateTime, Utc};
use policy::{order_chain, ChainVersion, DevicePolicy, Tier};
use stewardship::{Limits, StewardshipGrant};
use storage::Store;

/// Layers in force for a subject, ordered root authority first.
#[derive(Debug, Clone, Default)]
pub struct FetchedChain {
    pub layers: Vec<DevicePolicy>,
    /// Grants whose standing admitted a layer, with their ancestors.
    pub grant_versions: ChainVersion,
}

impl FetchedChain {
    /// Freshness key covering every policy and grant that contributed.
    pub fn version(&self) -> ChainVersion {
        let mut version = self.grant_versions.clone();
        for layer in &self.layers {
            version.record(layer.id.to_string(), layer.version);
        }
        version
    }
}

/// Where chains come from. [`Store`] is the real one.
pub trait ChainSource {
    fn fetch_chain(
        &self,
        subject_id: &str,
        device_id: Option<&str>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<FetchedChain>;
}

impl ChainSource for Store {
    fn fetch_chain(
        &self,
        subject_id: &str,
        device_id: Option<&str>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<FetchedChain> {
        let policies: Vec<DevicePolicy> = self.list_by_subject(subject_id)?;
        let grants: Vec<StewardshipGrant> = self.list_by_subject(subject_id)?;
        Ok(assemble_chain(subject_id, device_id, policies, &grants, limits, now))
    }
}

/// Keep the layers that are in force and order them.
pub fn assemble_chain(
    subject_id: &str,
    device_id: Option<&str>,
    policies: Vec<DevicePolicy>,
    grants: &[StewardshipGrant],
    limits: &Limits,
    now: DateTime<Utc>,
) -> FetchedChain {
    let authority = Authority::new(grants, limits, now);
    let mut chain = FetchedChain::default();

    for layer in policies {
        if layer.device_id.is_some() && layer.device_id.as_deref() != device_id {
            continue;
        }
        if !layer.is_effective_at(now) {
            continue;
        }
        if let Err(e) = layer.validate() {
            tracing::warn!(policy = %layer.id, error = %e, "skipping malformed policy layer");
            continue;
        }
        if layer.author_tier == Tier::Personal {
            if layer.author_id != subject_id {
                tracing::warn!(policy = %layer.id, "self layer authored by someone else");
                continue;
            }
        } else {
            let editor = authority
                .effective_for(&layer.author_id)
                .into_iter()
                .find(|g| g.tier.can_edit(layer.author_tier));
            let Some(grant) = editor else {
                tracing::debug!(policy = %layer.id, author = %layer.author_id, tier = %layer.author_tier, "author holds no grant that edits this layer");
                continue;
            };
            chain.grant_versions.record(grant.id.to_string(), grant.version);
            for ancestor in authority.ancestors(grant).unwrap_or_default() {
                chain
                    .grant_versions
                    .record(ancestor.id.to_string(), ancestor.version);
            }
        }
        chain.layers.push(layer);
    }

    order_chain(&mut chain.layers);
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{CapabilityFlags, RuleSet};
    use stewardship::{AuthorityBasis, NewGrant};

    fn now() -> DateTime<Utc> {
        "2025-03-03T09:00:00Z".parse().unwrap()
    }

    fn grant(steward: &str, tier: Tier) -> StewardshipGrant {
        StewardshipGrant::create(
            steward,
            NewGrant {
                subject_id: "kid".into(),
                tier: Some(tier),
                authority_basis: AuthorityBasis::MinorGuardianship,
                evidence_hash: Some("sha256:abc".into()),
                verified_by: "registry".into(),
                capabilities: CapabilityFlags::all(),
                delegatable: false,
                expires_in_days: 365,
                review_in_days: 90,
            },
            now(),
        )
        .unwrap()
    }

    fn layer(author: &str, tier: Tier) -> DevicePolicy {
        DevicePolicy::new("kid", author, tier, RuleSet::default(), now())
    }

    #[test]
    fn layers_need_an_editing_grant_at_their_tier() {
        let grants = vec![grant("mentor", Tier::Guide), grant("mom", Tier::Guardian)];
        let policies = vec![
            layer("mentor", Tier::Guardian),
            // Written before mom's grant was narrowed to guardian.
            layer("mom", Tier::Coordinator),
            layer("mom", Tier::Guardian),
            layer("kid", Tier::Personal),
        ];

        let chain = assemble_chain("kid", None, policies, &grants, &Limits::default(), now());
        let kept: Vec<_> = chain
            .layers
            .iter()
            .map(|l| (l.author_id.as_str(), l.author_tier))
            .collect();
        assert_eq!(kept, [("mom", Tier::Guardian), ("kid", Tier::Personal)]);
    }
}
