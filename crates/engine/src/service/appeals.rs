//! Appeal operations.
//!
//! Filing deliberately never resolves the appellant's policy: no
//! restriction can stand between a subject and their appeal.

use super::{authenticated, Service};
use crate::{Error, Result};
use std::collections::BTreeSet;
use stewardship::{
    AppealFiling, AppealId, AppealOutcome, ArbitrationLayer, GrantStatus, StewardshipAppeal,
    StewardshipGrant,
};
use storage::{AuditEvent, AuditKind, Store};

impl Service {
    fn load_appeal(&self, id: &AppealId) -> Result<StewardshipAppeal> {
        self.store
            .get(&id.to_string())?
            .ok_or_else(|| Error::AppealNotFound(id.to_string()))
    }

    pub fn file_appeal(&self, caller: &str, filing: AppealFiling) -> Result<StewardshipAppeal> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut grant = self.load_grant(&filing.grant_id)?;
        let appeal = StewardshipAppeal::file(caller, filing, &grant, &self.limits, now)?;
        grant.mark_appealed(appeal.id, now)?;

        self.store.atomically(|store| {
            store.insert(&appeal)?;
            store.update(&mut grant)?;
            store.append(&AuditEvent::new(
                appeal.id.to_string(),
                caller,
                AuditKind::AppealFiled {
                    grant_id: grant.id.to_string(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(appeal = %appeal.id, grant = %grant.id, layer = %appeal.arbitration_layer, "appeal filed");
        Ok(appeal)
    }

    /// Appeals the caller filed, as subject or as advocate.
    pub fn get_my_appeals(&self, caller: &str) -> Result<Vec<StewardshipAppeal>> {
        let caller = authenticated(caller)?;
        let mut appeals: Vec<StewardshipAppeal> = self.store.list_by_subject(caller)?;
        let advocated: Vec<StewardshipAppeal> = self.store.list_by_actor(caller)?;

        let mut seen: BTreeSet<AppealId> = appeals.iter().map(|a| a.id).collect();
        appeals.extend(advocated.into_iter().filter(|a| seen.insert(a.id)));
        appeals.sort_by(|a, b| a.filed_at.cmp(&b.filed_at));
        Ok(appeals)
    }

    /// Open appeals the caller may decide now.
    pub fn get_appeals_to_decide(&self, caller: &str) -> Result<Vec<StewardshipAppeal>> {
        let caller = authenticated(caller)?;
        let open: Vec<StewardshipAppeal> = self
            .store
            .list_all::<StewardshipAppeal>()?
            .into_iter()
            .filter(|a| a.status.is_open())
            .collect();

        let mut out = Vec::new();
        for appeal in open {
            let grant = self.load_grant(&appeal.grant_id)?;
            if appeal.may_decide(caller, &grant) {
                out.push(appeal);
            }
        }
        Ok(out)
    }

    /// Take an open appeal as its arbitrator.
    ///
    /// Steward-layer appeals belong to the grant's steward. At any other
    /// layer the steward is a party and may not arbitrate, and the caller
    /// must sit at that layer.
    pub fn claim_appeal(&self, caller: &str, appeal_id: &AppealId) -> Result<StewardshipAppeal> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut appeal = self.load_appeal(appeal_id)?;
        let grant = self.load_grant(&appeal.grant_id)?;

        let is_steward = caller == grant.steward_id;
        let steward_layer = appeal.arbitration_layer == ArbitrationLayer::Steward;
        if is_steward != steward_layer {
            return Err(Error::NotPermitted(format!(
                "{caller} cannot arbitrate a {} appeal on this grant",
                appeal.arbitration_layer
            )));
        }
        if appeal.advocate_id.as_deref() == Some(caller) {
            return Err(Error::NotPermitted("an advocate cannot arbitrate".into()));
        }
        if !steward_layer {
            self.require_arbitrator(caller, &grant.subject_id, appeal.arbitration_layer)?;
        }
        appeal.assign(caller, now)?;

        self.store.atomically(|store| {
            store.update(&mut appeal)?;
            store.append(&AuditEvent::new(
                appeal_id.to_string(),
                caller,
                AuditKind::AppealAssigned {
                    arbitrator: caller.to_string(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;
        Ok(appeal)
    }

    /// Move an undecided appeal to the next arbitration layer. Open to the
    /// appellant, their advocate and the current arbitrator.
    pub fn escalate_appeal(&self, caller: &str, appeal_id: &AppealId) -> Result<StewardshipAppeal> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut appeal = self.load_appeal(appeal_id)?;
        let involved = caller == appeal.appellant_id
            || appeal.advocate_id.as_deref() == Some(caller)
            || appeal.assigned_to.as_deref() == Some(caller);
        if !involved {
            return Err(Error::NotPermitted(format!("{caller} cannot escalate appeal {appeal_id}")));
        }
        let layer = appeal.escalate(now)?;

        self.store.atomically(|store| {
            store.update(&mut appeal)?;
            store.append(&AuditEvent::new(
                appeal_id.to_string(),
                caller,
                AuditKind::AppealEscalated {
                    layer: layer.to_string(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(appeal = %appeal_id, layer = %layer, "appeal escalated");
        Ok(appeal)
    }

    pub fn decide_appeal(
        &self,
        caller: &str,
        appeal_id: &AppealId,
        approved: bool,
        notes: &str,
    ) -> Result<StewardshipAppeal> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut appeal = self.load_appeal(appeal_id)?;
        let mut grant = self.load_grant(&appeal.grant_id)?;
        if appeal.arbitration_layer != ArbitrationLayer::Steward {
            self.require_arbitrator(caller, &grant.subject_id, appeal.arbitration_layer)?;
        }
        let outcome = appeal.decide(caller, &grant, approved, notes, now)?;
        let grant_kind = apply_outcome(&mut grant, &appeal, outcome, now)?;

        self.store.atomically(|store| {
            store.update(&mut appeal)?;
            store.append(&AuditEvent::new(
                appeal_id.to_string(),
                caller,
                AuditKind::AppealDecided { approved },
                now,
            ))?;
            save_grant_outcome(store, &mut grant, grant_kind, caller, now)?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(appeal = %appeal_id, approved, outcome = ?outcome, "appeal decided");
        Ok(appeal)
    }
}

/// Apply an appeal's outcome to its grant, if the grant is still waiting
/// on that appeal. Returns the audit kind for the grant change.
pub(super) fn apply_outcome(
    grant: &mut StewardshipGrant,
    appeal: &StewardshipAppeal,
    outcome: AppealOutcome,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Option<AuditKind>> {
    if grant.status != GrantStatus::Appealed || grant.appeal_id != Some(appeal.id) {
        return Ok(None);
    }
    match outcome {
        AppealOutcome::RevokeGrant => {
            grant.uphold_appeal(now)?;
            Ok(Some(AuditKind::GrantRevoked))
        }
        AppealOutcome::ReinstateGrant => {
            grant.reinstate(now)?;
            Ok(Some(AuditKind::GrantReinstated))
        }
    }
}

pub(super) fn save_grant_outcome(
    store: &Store,
    grant: &mut StewardshipGrant,
    kind: Option<AuditKind>,
    actor: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    if let Some(kind) = kind {
        store.update(grant)?;
        store.append(&AuditEvent::new(grant.id.to_string(), actor, kind, now))?;
    }
    Ok(())
}
