//! Activity log operations.

use super::{authenticated, Service};
use crate::{Authority, Error, Result};
use policy::CapabilityKind;
use stewardship::{ActivityLog, NewActivity};
use storage::{AuditEvent, AuditKind};

impl Service {
    /// Record a session for the caller under their computed monitoring
    /// rules.
    pub fn log_activity(&self, caller: &str, input: NewActivity) -> Result<ActivityLog> {
        let caller = authenticated(caller)?;
        let now = self.now();
        let policy = self.resolve(caller, input.device_id.as_deref())?;
        let log = ActivityLog::record(caller, input, &policy.monitoring, now)?;

        self.store.atomically(|store| {
            store.insert(&log)?;
            store.append(&AuditEvent::new(
                log.id.to_string(),
                caller,
                AuditKind::ActivityLogged {
                    session_id: log.session_id.clone(),
                },
                now,
            ))?;
            Ok::<_, Error>(())
        })?;

        tracing::debug!(log = %log.id, subject = caller, retention_until = %log.retention_expires_at, "activity logged");
        Ok(log)
    }

    pub fn get_my_activity_logs(&self, caller: &str) -> Result<Vec<ActivityLog>> {
        let caller = authenticated(caller)?;
        let policy = self.resolve(caller, None)?;
        if !policy.monitoring.subject_can_view {
            return Err(Error::NotPermitted(
                "activity logs are not visible to the subject".into(),
            ));
        }
        self.retained_logs(caller)
    }

    /// A subject's logs, for a steward holding an effective
    /// `activity_monitoring` grant.
    pub fn get_subject_activity_logs(&self, caller: &str, subject_id: &str) -> Result<Vec<ActivityLog>> {
        let caller = authenticated(caller)?;
        if caller == subject_id {
            return self.get_my_activity_logs(caller);
        }
        let grants = self.grants_over(subject_id)?;
        let monitors = Authority::new(&grants, &self.limits, self.now())
            .effective_for(caller)
            .iter()
            .any(|g| g.capabilities.has(CapabilityKind::ActivityMonitoring));
        if !monitors {
            return Err(Error::NotPermitted(format!(
                "{caller} holds no activity_monitoring grant over {subject_id}"
            )));
        }
        self.retained_logs(subject_id)
    }

    fn retained_logs(&self, subject_id: &str) -> Result<Vec<ActivityLog>> {
        let now = self.now();
        let mut logs: Vec<ActivityLog> = self
            .store
            .list_by_subject::<ActivityLog>(subject_id)?
            .into_iter()
            .filter(|log| log.is_retained_at(now))
            .collect();
        logs.sort_by(|a, b| b.session_started_at.cmp(&a.session_started_at));
        Ok(logs)
    }
}
