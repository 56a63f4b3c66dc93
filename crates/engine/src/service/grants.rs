//! Grant lifecycle operations.

use super::{authenticated, Service};
use crate::{Authority, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stewardship::{Delegation, GrantId, GrantStatus, NewGrant, StewardshipGrant};
use storage::{AuditEvent, AuditKind};

/// A grant with its status as seen through its delegation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantView {
    #[serde(flatten)]
    pub grant: StewardshipGrant,
    pub effective_status: GrantStatus,
}

impl Service {
    pub(crate) fn load_grant(&self, id: &GrantId) -> Result<StewardshipGrant> {
        self.store
            .get(&id.to_string())?
            .ok_or_else(|| Error::GrantNotFound(id.to_string()))
    }

    pub fn create_stewardship_grant(&self, caller: &str, input: NewGrant) -> Result<StewardshipGrant> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let grant = StewardshipGrant::create(caller, input, now)?;

        self.store.atomically(|store| {
            store.insert(&grant)?;
            store.append(&AuditEvent::new(
                grant.id.to_string(),
                caller,
                AuditKind::GrantCreated {
                    subject_id: grant.subject_id.clone(),
                    steward_id: grant.steward_id.clone(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(grant = %grant.id, steward = caller, subject = %grant.subject_id, tier = %grant.tier, "grant created");
        Ok(grant)
    }

    pub fn delegate_grant(&self, caller: &str, input: Delegation) -> Result<StewardshipGrant> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let parent = self.load_grant(&input.parent_grant_id)?;
        let grants = self.grants_over(&parent.subject_id)?;
        let status = Authority::new(&grants, &self.limits, now).effective_status(&parent);
        let child = parent.delegate(caller, &input, status, &self.limits, now)?;

        self.store.atomically(|store| {
            store.insert(&child)?;
            store.append(&AuditEvent::new(
                child.id.to_string(),
                caller,
                AuditKind::GrantDelegated {
                    parent_id: parent.id.to_string(),
                    steward_id: child.steward_id.clone(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(grant = %child.id, parent = %parent.id, depth = child.delegation_depth, "grant delegated");
        Ok(child)
    }

    /// Revoke a grant. Returns `false` if it was already revoked or expired.
    ///
    /// The steward, the subject, and the steward of any ancestor grant may
    /// revoke. Descendants lose effect at read time.
    pub fn revoke_grant(&self, caller: &str, grant_id: &GrantId) -> Result<bool> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut grant = self.load_grant(grant_id)?;
        let grants = self.grants_over(&grant.subject_id)?;
        let authority = Authority::new(&grants, &self.limits, now);
        let permitted = caller == grant.steward_id
            || caller == grant.subject_id
            || authority.stewards_ancestor_of(caller, &grant);
        if !permitted {
            return Err(Error::NotPermitted(format!("{caller} cannot revoke grant {grant_id}")));
        }

        if !grant.revoke(now) {
            return Ok(false);
        }
        self.store.atomically(|store| {
            store.update(&mut grant)?;
            store.append(&AuditEvent::new(grant_id.to_string(), caller, AuditKind::GrantRevoked, now))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(grant = %grant_id, by = caller, "grant revoked");
        Ok(true)
    }

    pub fn review_grant(&self, caller: &str, grant_id: &GrantId) -> Result<StewardshipGrant> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut grant = self.load_grant(grant_id)?;
        let grants = self.grants_over(&grant.subject_id)?;
        let status = Authority::new(&grants, &self.limits, now).effective_status(&grant);
        match status {
            s if s.is_effective() => {}
            GrantStatus::Expired => {
                return Err(Error::Expired(format!("grant {grant_id} has lapsed")));
            }
            s => {
                return Err(Error::InvalidTransition(format!(
                    "grant {grant_id} is effectively {s}"
                )));
            }
        }
        grant.review(caller, &self.limits, now)?;

        self.store.atomically(|store| {
            store.update(&mut grant)?;
            store.append(&AuditEvent::new(grant_id.to_string(), caller, AuditKind::GrantReviewed, now))?;
            Ok::<_, Error>(())
        })?;
        Ok(grant)
    }

    /// Grants the caller holds, with their effective status.
    pub fn get_my_subjects(&self, caller: &str) -> Result<Vec<GrantView>> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let held: Vec<StewardshipGrant> = self.store.list_by_actor(caller)?;

        let mut by_subject: HashMap<String, Vec<StewardshipGrant>> = HashMap::new();
        for grant in &held {
            if !by_subject.contains_key(&grant.subject_id) {
                by_subject.insert(grant.subject_id.clone(), self.grants_over(&grant.subject_id)?);
            }
        }

        Ok(held
            .into_iter()
            .map(|grant| {
                let status = by_subject
                    .get(&grant.subject_id)
                    .map(|all| Authority::new(all, &self.limits, now).effective_status(&grant))
                    .unwrap_or(GrantStatus::Revoked);
                GrantView {
                    grant,
                    effective_status: status,
                }
            })
            .collect())
    }

    /// Grants held over the caller, with their effective status.
    pub fn get_my_stewards(&self, caller: &str) -> Result<Vec<GrantView>> {
        let caller = authenticated(caller)?;
        let grants = self.grants_over(caller)?;
        let authority = Authority::new(&grants, &self.limits, self.now());
        Ok(grants
            .iter()
            .map(|grant| GrantView {
                grant: grant.clone(),
                effective_status: authority.effective_status(grant),
            })
            .collect())
    }
}
