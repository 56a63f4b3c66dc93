//! Deadline sweep: applies every time-driven transition that is due.

use super::appeals::{apply_outcome, save_grant_outcome};
use super::Service;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use stewardship::{ActivityLog, CommunityIntervention, StewardshipAppeal, StewardshipGrant};
use storage::{AuditEvent, AuditKind};

const SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub appeals_expired: usize,
    pub grants_expired: usize,
    pub interventions_advanced: usize,
    pub logs_purged: usize,
}

/// Swallow a lost race: whoever wrote first already moved the entity on,
/// and the next sweep sees the result.
fn skip_conflict(entity: &str, id: &str, result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e @ Error::ConcurrentModification(_)) => {
            tracing::warn!(entity, id, error = %e, "sweep lost a race; skipping");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl Service {
    pub fn sweep(&self) -> Result<SweepReport> {
        let now = self.now();
        let mut report = SweepReport::default();

        // Appeals first, so a grant whose appeal lapsed is reinstated before
        // its own deadlines are checked.
        for mut appeal in self.store.list_all::<StewardshipAppeal>()? {
            let Some(outcome) = appeal.expire_if_lapsed(now) else {
                continue;
            };
            let id = appeal.id.to_string();
            let result = self.store.atomically(|store| {
                store.update(&mut appeal)?;
                store.append(&AuditEvent::new(&id, SYSTEM, AuditKind::AppealExpired, now))?;
                if let Some(mut grant) = store.get::<StewardshipGrant>(&appeal.grant_id.to_string())? {
                    let kind = apply_outcome(&mut grant, &appeal, outcome, now)?;
                    save_grant_outcome(store, &mut grant, kind, SYSTEM, now)?;
                }
                Ok::<_, Error>(())
            });
            if skip_conflict("appeal", &id, result)? {
                report.appeals_expired += 1;
            }
        }

        for mut grant in self.store.list_all::<StewardshipGrant>()? {
            let reason = grant.lapse_reason(&self.limits, now);
            if !grant.expire_if_lapsed(&self.limits, now) {
                continue;
            }
            let id = grant.id.to_string();
            let result = self.store.atomically(|store| {
                store.update(&mut grant)?;
                store.append(&AuditEvent::new(&id, SYSTEM, AuditKind::GrantExpired, now))?;
                Ok::<_, Error>(())
            });
            if skip_conflict("grant", &id, result)? {
                tracing::info!(grant = %id, reason = reason.unwrap_or_default(), "grant expired");
                report.grants_expired += 1;
            }
        }

        for mut intervention in self.store.list_all::<CommunityIntervention>()? {
            let Some(status) = intervention.tick(&self.limits, now) else {
                continue;
            };
            let id = intervention.id.to_string();
            let result = self.store.atomically(|store| {
                store.update(&mut intervention)?;
                store.append(&AuditEvent::new(
                    &id,
                    SYSTEM,
                    AuditKind::InterventionStatus {
                        status: status.to_string(),
                    },
                    now,
                ))?;
                Ok::<_, Error>(())
            });
            if skip_conflict("intervention", &id, result)? {
                tracing::info!(intervention = %id, status = %status, "intervention advanced by deadline");
                report.interventions_advanced += 1;
            }
        }

        for log in self.store.list_all::<ActivityLog>()? {
            if !log.is_retained_at(now) && self.store.remove::<ActivityLog>(&log.id.to_string())? {
                report.logs_purged += 1;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(?report, "sweep applied due transitions");
        }
        Ok(report)
    }
}
