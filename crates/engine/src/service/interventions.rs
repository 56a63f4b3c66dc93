//! Community intervention operations.

use super::{authenticated, Service};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use stewardship::{
    ArbitrationLayer, CommunityIntervention, InterventionId, InterventionStatus, NewIntervention, RelationshipLevel,
    Resolution, SupportOutcome,
};
use storage::{AuditEvent, AuditKind};

/// Statuses the subject can see. Support is gathered without their knowledge
/// until they are notified.
fn disclosed_to_subject(status: InterventionStatus) -> bool {
    !matches!(
        status,
        InterventionStatus::Gathering | InterventionStatus::ThresholdMet | InterventionStatus::Expired
    )
}

impl Service {
    fn load_intervention(&self, id: &InterventionId) -> Result<CommunityIntervention> {
        self.store
            .get(&id.to_string())?
            .ok_or_else(|| Error::InterventionNotFound(id.to_string()))
    }

    /// Load, apply `f`, and store the intervention with an audit event for
    /// any status change.
    fn mutate_intervention(
        &self,
        caller: &str,
        id: &InterventionId,
        f: impl FnOnce(&mut CommunityIntervention, DateTime<Utc>) -> Result<()>,
    ) -> Result<CommunityIntervention> {
        let now = self.now();
        let mut intervention = self.load_intervention(id)?;
        let before = intervention.status;
        f(&mut intervention, now)?;

        self.store.atomically(|store| {
            store.update(&mut intervention)?;
            if intervention.status != before {
                store.append(&AuditEvent::new(
                    id.to_string(),
                    caller,
                    AuditKind::InterventionStatus {
                        status: intervention.status.to_string(),
                    },
                    now,
                ))?;
            }
            Ok::<_, Error>(())
        })?;

        if intervention.status != before {
            tracing::info!(intervention = %id, from = %before, to = %intervention.status, "intervention status changed");
        }
        Ok(intervention)
    }

    fn require_supporter(caller: &str, intervention: &CommunityIntervention) -> Result<()> {
        if intervention.supporters.contains_key(caller) {
            Ok(())
        } else {
            Err(Error::NotPermitted(format!(
                "{caller} is not a supporter of intervention {}",
                intervention.id
            )))
        }
    }

    pub fn initiate_intervention(
        &self,
        caller: &str,
        input: NewIntervention,
    ) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let intervention = CommunityIntervention::initiate(caller, input, &self.limits, now)?;

        self.store.atomically(|store| {
            store.insert(&intervention)?;
            store.append(&AuditEvent::new(
                intervention.id.to_string(),
                caller,
                AuditKind::InterventionInitiated {
                    subject_id: intervention.subject_id.clone(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::info!(intervention = %intervention.id, weight = intervention.total_weight(), "intervention initiated");
        Ok(intervention)
    }

    pub fn support_intervention(
        &self,
        caller: &str,
        id: &InterventionId,
        level: RelationshipLevel,
        reason: Option<String>,
    ) -> Result<(CommunityIntervention, SupportOutcome)> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let mut intervention = self.load_intervention(id)?;
        let outcome = intervention.support(caller, level, reason, &self.limits, now)?;

        self.store.atomically(|store| {
            store.update(&mut intervention)?;
            store.append(&AuditEvent::new(
                id.to_string(),
                caller,
                AuditKind::InterventionSupported {
                    weight_tenths: level.weight_tenths(),
                },
                now,
            ))?;
            if outcome == SupportOutcome::ThresholdCrossed {
                store.append(&AuditEvent::new(
                    id.to_string(),
                    caller,
                    AuditKind::InterventionStatus {
                        status: intervention.status.to_string(),
                    },
                    now,
                ))?;
            }
            Ok::<_, Error>(())
        })?;

        tracing::debug!(intervention = %id, outcome = ?outcome, total = intervention.total_weight(), "intervention supported");
        Ok((intervention, outcome))
    }

    /// Tell the subject. Any supporter may send the notice once the
    /// threshold is met; the sweep sends it when the deadline passes.
    pub fn notify_subject(&self, caller: &str, id: &InterventionId) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        self.mutate_intervention(caller, id, |iv, now| {
            Self::require_supporter(caller, iv)?;
            iv.notify_subject(Some(caller), now)?;
            Ok(())
        })
    }

    pub fn open_response_window(&self, caller: &str, id: &InterventionId) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        let limits = self.limits;
        self.mutate_intervention(caller, id, |iv, now| {
            Self::require_supporter(caller, iv)?;
            iv.open_response_window(Some(caller), &limits, now)?;
            Ok(())
        })
    }

    /// The subject's answer to the concern raised.
    pub fn respond_to_intervention(
        &self,
        caller: &str,
        id: &InterventionId,
        response: &str,
    ) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        self.mutate_intervention(caller, id, |iv, now| {
            iv.record_subject_response(caller, response, now)?;
            Ok(())
        })
    }

    pub fn begin_arbitration(&self, caller: &str, id: &InterventionId) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        self.mutate_intervention(caller, id, |iv, now| {
            if caller != iv.subject_id {
                Self::require_supporter(caller, iv)?;
            }
            iv.begin_arbitration(Some(caller), now)?;
            Ok(())
        })
    }

    pub fn resolve_intervention(
        &self,
        caller: &str,
        id: &InterventionId,
        resolution: Resolution,
        notes: &str,
    ) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        let limits = self.limits;
        self.mutate_intervention(caller, id, |iv, now| {
            self.require_arbitrator(caller, &iv.subject_id, ArbitrationLayer::Community)?;
            iv.resolve(caller, resolution, notes, &limits, now)?;
            Ok(())
        })
    }

    /// Periodic review of a resolved outcome. Reviewers sit at the
    /// community layer and are held to the same independence as
    /// arbitrators.
    pub fn review_intervention(
        &self,
        caller: &str,
        id: &InterventionId,
        restore: bool,
        notes: &str,
    ) -> Result<CommunityIntervention> {
        let caller = authenticated(caller)?;
        let limits = self.limits;
        self.mutate_intervention(caller, id, |iv, now| {
            if caller == iv.subject_id || iv.supporters.contains_key(caller) {
                return Err(Error::NotPermitted(
                    "reviewers must be independent of the case".into(),
                ));
            }
            self.require_arbitrator(caller, &iv.subject_id, ArbitrationLayer::Community)?;
            iv.periodic_review(caller, restore, notes, &limits, now)?;
            Ok(())
        })
    }

    /// Interventions the caller supports, and those about the caller once
    /// they have been notified.
    pub fn get_my_interventions(&self, caller: &str) -> Result<Vec<CommunityIntervention>> {
        let caller = authenticated(caller)?;
        let mut out: Vec<CommunityIntervention> = self
            .store
            .list_by_subject::<CommunityIntervention>(caller)?
            .into_iter()
            .filter(|iv| disclosed_to_subject(iv.status))
            .collect();
        out.extend(
            self.store
                .list_all::<CommunityIntervention>()?
                .into_iter()
                .filter(|iv| iv.subject_id != caller && iv.supporters.contains_key(caller)),
        );
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}
