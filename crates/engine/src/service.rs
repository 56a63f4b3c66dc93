//! The engine's operations.
//!
//! [`Service`] owns the store, the resolver memo, the clock and the
//! configured limits. Every public method takes the authenticated caller's
//! agent id first; an empty id is [`Error::NotAuthenticated`].
//!
//! Writes validate everything before touching the store and then commit
//! the entity, any entity it changes alongside, and the audit event in one
//! transaction. Reads used for access decisions never fail on an
//! unavailable chain; the configured [`FailMode`] decides instead.

mod activity;
mod appeals;
mod grants;
mod interventions;
mod sweep;

pub use grants::GrantView;
pub use sweep::SweepReport;

use crate::{assemble_chain, Arbitrators, Authority, ChainSource, Clock, Error, Resolver, Result, SystemClock};
use chrono::{DateTime, NaiveDateTime, Utc};
use policy::{
    chain_links, AccessGate, ComputedPolicy, ContentRequest, Decision, DevicePolicy, FailMode,
    PolicyChainLink, RuleSet, Tier, TimeAccess,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stewardship::{ArbitrationLayer, Limits, StewardshipGrant};
use storage::{AuditEvent, AuditKind, Store};

/// A write to the caller's layer in a subject's chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyWrite {
    /// `None` writes the caller's own self layer.
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub rules: RuleSet,
    /// Version the caller last read. Required once the caller has a layer
    /// for this subject and device; a mismatch fails the write.
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
}

pub struct Service {
    store: Store,
    resolver: Resolver,
    clock: Box<dyn Clock>,
    limits: Limits,
    arbitrators: Arbitrators,
    fail_mode: FailMode,
}

fn authenticated(caller: &str) -> Result<&str> {
    let caller = caller.trim();
    if caller.is_empty() {
        Err(Error::NotAuthenticated)
    } else {
        Ok(caller)
    }
}

impl Service {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            resolver: Resolver::new(),
            clock: Box::new(SystemClock),
            limits: Limits::default(),
            arbitrators: Arbitrators::default(),
            fail_mode: FailMode::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_arbitrators(mut self, arbitrators: Arbitrators) -> Self {
        self.arbitrators = arbitrators;
        self
    }

    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn grants_over(&self, subject_id: &str) -> Result<Vec<StewardshipGrant>> {
        Ok(self.store.list_by_subject(subject_id)?)
    }

    fn resolve(&self, subject_id: &str, device_id: Option<&str>) -> Result<Arc<ComputedPolicy>> {
        self.resolver
            .resolve(&self.store, subject_id, device_id, &self.limits, self.now())
    }

    /// The strongest tier `caller` may read `subject_id`'s chain at.
    fn viewer_tier(&self, caller: &str, subject_id: &str) -> Result<Tier> {
        if caller == subject_id {
            return Ok(Tier::Personal);
        }
        let grants = self.grants_over(subject_id)?;
        let authority = Authority::new(&grants, &self.limits, self.now());
        authority
            .strongest_for(caller)
            .filter(|g| g.tier.can_view(g.tier))
            .map(|g| g.tier)
            .ok_or_else(|| Error::NotPermitted(format!("{caller} cannot view {subject_id}'s policy")))
    }

    /// Fails unless `caller` sits at `layer` for cases about `subject_id`,
    /// by configuration or by an effective grant of sufficient tier.
    fn require_arbitrator(&self, caller: &str, subject_id: &str, layer: ArbitrationLayer) -> Result<()> {
        if self.arbitrators.seats(caller, layer) {
            return Ok(());
        }
        let grants = self.grants_over(subject_id)?;
        if Authority::new(&grants, &self.limits, self.now()).may_arbitrate(caller, layer) {
            return Ok(());
        }
        Err(Error::NotPermitted(format!(
            "{caller} is not a {layer} arbitrator for {subject_id}"
        )))
    }

    // --- policy chain -------------------------------------------------------

    /// Resolve the caller's own computed policy.
    pub fn get_my_computed_policy(
        &self,
        caller: &str,
        device_id: Option<&str>,
    ) -> Result<Arc<ComputedPolicy>> {
        let caller = authenticated(caller)?;
        self.resolve(caller, device_id)
    }

    /// Layers in force for `subject_id`, root first, limited to what the
    /// caller's tier may see.
    pub fn get_policy_layers(
        &self,
        caller: &str,
        subject_id: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<DevicePolicy>> {
        let caller = authenticated(caller)?;
        let viewer = self.viewer_tier(caller, subject_id)?;
        let chain = self
            .store
            .fetch_chain(subject_id, device_id, &self.limits, self.now())?;
        Ok(chain
            .layers
            .into_iter()
            .filter(|layer| viewer.can_view(layer.author_tier))
            .collect())
    }

    pub fn get_policy_chain(&self, caller: &str, subject_id: &str) -> Result<Vec<PolicyChainLink>> {
        let layers = self.get_policy_layers(caller, subject_id, None)?;
        Ok(chain_links(&layers))
    }

    /// Fold of every steward layer, without the subject's own. `None` when
    /// no steward has written a layer.
    pub fn get_parent_policy(&self, caller: &str, subject_id: &str) -> Result<Option<ComputedPolicy>> {
        let layers = self.get_policy_layers(caller, subject_id, None)?;
        let parents: Vec<_> = layers
            .iter()
            .filter(|l| l.author_tier != Tier::Personal)
            .collect();
        if parents.is_empty() {
            return Ok(None);
        }
        Ok(Some(ComputedPolicy::fold(subject_id, parents)))
    }

    /// Create or replace the caller's layer for a subject.
    pub fn upsert_policy(&self, caller: &str, write: PolicyWrite) -> Result<DevicePolicy> {
        let caller = authenticated(caller)?;
        let subject_id = write.subject_id.clone().unwrap_or_else(|| caller.to_string());
        let now = self.now();
        write.rules.validate()?;

        let grants = self.grants_over(&subject_id)?;
        let tier = if subject_id == caller {
            Tier::Personal
        } else {
            self.authoring_tier(caller, &subject_id, &grants, &write.rules, now)?
        };

        let policy = self.store.atomically(|store| {
            let mut layers: Vec<DevicePolicy> = store.list_by_subject(&subject_id)?;
            let existing = layers
                .iter()
                .position(|p| p.author_id == caller && p.device_id == write.device_id);

            let mut policy = match existing {
                Some(i) => {
                    let mut current = layers.remove(i);
                    match write.expected_version {
                        Some(expected) if expected == current.version => {}
                        Some(expected) => {
                            return Err(Error::ConcurrentModification(format!(
                                "policy {} is at version {}, not {expected}",
                                current.id, current.version
                            )));
                        }
                        None => {
                            return Err(Error::ConcurrentModification(format!(
                                "policy {} exists at version {}; pass expected_version",
                                current.id, current.version
                            )));
                        }
                    }
                    current.apply_rules(write.rules.clone(), now);
                    current.author_tier = tier;
                    current
                }
                None => {
                    if let Some(expected) = write.expected_version {
                        return Err(Error::PolicyNotFound(format!(
                            "no layer by {caller} for {subject_id} at version {expected}"
                        )));
                    }
                    DevicePolicy::new(&subject_id, caller, tier, write.rules.clone(), now)
                        .with_device(write.device_id.clone())
                }
            };
            if let Some(from) = write.effective_from {
                policy.effective_from = from;
            }
            if write.effective_until.is_some() {
                policy.effective_until = write.effective_until;
            }
            policy.validate()?;

            let mut all = layers;
            all.push(policy.clone());
            let chain = assemble_chain(
                &subject_id,
                policy.device_id.as_deref(),
                all,
                &grants,
                &self.limits,
                now,
            );
            policy.inherits_from = chain
                .layers
                .iter()
                .position(|l| l.id == policy.id)
                .and_then(|i| i.checked_sub(1))
                .map(|i| chain.layers[i].id);

            if existing.is_some() {
                store.update(&mut policy)?;
            } else {
                store.insert(&policy)?;
            }

            let base: Vec<DevicePolicy> = chain
                .layers
                .into_iter()
                .filter(|l| l.device_id.is_none())
                .collect();
            store.replace_chain_links(&subject_id, &chain_links(&base))?;
            store.append(&AuditEvent::new(
                policy.id.to_string(),
                caller,
                AuditKind::PolicyUpserted {
                    subject_id: subject_id.clone(),
                    version: policy.version,
                },
                now,
            ))?;
            Ok(policy)
        })?;

        tracing::info!(policy = %policy.id, subject = %subject_id, tier = %tier, version = policy.version, "policy upserted");
        Ok(policy)
    }

    /// Tier a steward writes at: their strongest editing grant whose flags
    /// cover every rule family being set.
    fn authoring_tier(
        &self,
        caller: &str,
        subject_id: &str,
        grants: &[StewardshipGrant],
        rules: &RuleSet,
        now: DateTime<Utc>,
    ) -> Result<Tier> {
        let authority = Authority::new(grants, &self.limits, now);
        let held = authority.effective_for(caller);
        if held.is_empty() {
            return Err(Error::NotPermitted(format!(
                "{caller} holds no grant over {subject_id}"
            )));
        }
        let editors: Vec<_> = held
            .into_iter()
            .filter(|g| g.tier.can_edit(g.tier))
            .collect();
        if editors.is_empty() {
            return Err(Error::NotPermitted("guide tier is advisory only".into()));
        }
        let needed = rules.required_capabilities();
        editors
            .iter()
            .find(|g| needed.iter().all(|k| g.capabilities.has(*k)))
            .map(|g| g.tier)
            .ok_or_else(|| {
                let missing: Vec<_> = needed
                    .iter()
                    .filter(|k| !editors.iter().any(|g| g.capabilities.has(**k)))
                    .map(|k| k.as_str())
                    .collect();
                Error::ScopeExceeded(format!(
                    "grant does not cover {}",
                    if missing.is_empty() {
                        "this combination of rules".to_string()
                    } else {
                        missing.join(", ")
                    }
                ))
            })
    }

    // --- access decisions ----------------------------------------------------

    /// The caller's policy, or `None` if it cannot be obtained right now.
    fn policy_for_gate(&self, caller: &str, device_id: Option<&str>) -> Option<Arc<ComputedPolicy>> {
        match self.resolve(caller, device_id) {
            Ok(policy) => Some(policy),
            Err(e) => {
                tracing::warn!(subject = caller, error = %e, fail_mode = ?self.fail_mode, "policy unavailable for access check");
                None
            }
        }
    }

    pub fn check_content_access(
        &self,
        caller: &str,
        device_id: Option<&str>,
        request: &ContentRequest,
        fail_mode: Option<FailMode>,
    ) -> Result<Decision> {
        let caller = authenticated(caller)?;
        let policy = self.policy_for_gate(caller, device_id);
        let gate = AccessGate::new(policy.as_deref(), self.fail_mode);
        Ok(gate.content_with(request, fail_mode.unwrap_or(self.fail_mode)))
    }

    pub fn check_feature_access(
        &self,
        caller: &str,
        device_id: Option<&str>,
        feature: &str,
    ) -> Result<bool> {
        let caller = authenticated(caller)?;
        let policy = self.policy_for_gate(caller, device_id);
        Ok(AccessGate::new(policy.as_deref(), self.fail_mode).feature(feature))
    }

    pub fn check_route_access(&self, caller: &str, device_id: Option<&str>, route: &str) -> Result<bool> {
        let caller = authenticated(caller)?;
        let policy = self.policy_for_gate(caller, device_id);
        Ok(AccessGate::new(policy.as_deref(), self.fail_mode).route(route))
    }

    /// Time status from the configured ceilings, and from the layers'
    /// windows when the device's local time is given.
    pub fn check_time_access(
        &self,
        caller: &str,
        device_id: Option<&str>,
        local: Option<NaiveDateTime>,
    ) -> Result<TimeAccess> {
        let caller = authenticated(caller)?;
        let policy = self.policy_for_gate(caller, device_id);
        Ok(AccessGate::new(policy.as_deref(), self.fail_mode).time(local))
    }

    pub fn requires_approval(&self, caller: &str, device_id: Option<&str>, feature: &str) -> Result<bool> {
        let caller = authenticated(caller)?;
        Ok(self
            .policy_for_gate(caller, device_id)
            .is_some_and(|p| p.requires_approval(feature)))
    }

    // --- audit ---------------------------------------------------------------

    pub fn audit_trail(&self, entity_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.store.events_for(entity_id)?)
    }

    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        Ok(self.store.recent_events(limit)?)
    }
}
