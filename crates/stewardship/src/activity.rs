//! Activity logs kept under a subject's monitoring rules.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use policy::MonitoringRules;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityLogId(pub Uuid);

impl ActivityLogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActivityLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActivityLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session report from a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    #[serde(default)]
    pub device_id: Option<String>,
    pub session_id: String,
    pub session_started_at: DateTime<Utc>,
    pub session_duration_minutes: u32,
    #[serde(default)]
    pub categories_accessed: BTreeSet<String>,
    #[serde(default)]
    pub policy_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: ActivityLogId,
    pub subject_id: String,
    pub device_id: Option<String>,
    pub session_id: String,
    pub session_started_at: DateTime<Utc>,
    pub session_duration_minutes: u32,
    pub categories_accessed: BTreeSet<String>,
    pub policy_events: Vec<String>,
    pub logged_at: DateTime<Utc>,
    pub retention_expires_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Build a log entry, keeping only what `monitoring` allows.
    pub fn record(
        subject_id: &str,
        input: NewActivity,
        monitoring: &MonitoringRules,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !monitoring.any_logging() {
            return Err(Error::NotPermitted(
                "activity logging is not enabled for this subject".into(),
            ));
        }
        if input.session_id.trim().is_empty() {
            return Err(Error::Invalid("session_id is required".into()));
        }

        let categories_accessed = if monitoring.log_categories {
            input.categories_accessed
        } else {
            BTreeSet::new()
        };
        let policy_events = if monitoring.log_policy_events {
            input.policy_events
        } else {
            Vec::new()
        };

        Ok(Self {
            id: ActivityLogId::new(),
            subject_id: subject_id.to_string(),
            device_id: input.device_id,
            session_id: input.session_id,
            session_started_at: input.session_started_at,
            session_duration_minutes: input.session_duration_minutes,
            categories_accessed,
            policy_events,
            logged_at: now,
            retention_expires_at: now + Duration::days(i64::from(monitoring.retention_days)),
        })
    }

    pub fn is_retained_at(&self, now: DateTime<Utc>) -> bool {
        now < self.retention_expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> NewActivity {
        NewActivity {
            device_id: Some("tablet".into()),
            session_id: "s-1".into(),
            session_started_at: Utc::now(),
            session_duration_minutes: 42,
            categories_accessed: BTreeSet::from(["games".to_string()]),
            policy_events: vec!["blocked:/admin".into()],
        }
    }

    #[test]
    fn logging_requires_a_monitoring_flag() {
        let result = ActivityLog::record("kid", session(), &MonitoringRules::default(), Utc::now());
        assert!(matches!(result, Err(Error::NotPermitted(_))));
    }

    #[test]
    fn only_enabled_fields_are_kept() {
        let now = Utc::now();
        let monitoring = MonitoringRules {
            log_sessions: true,
            log_categories: false,
            log_policy_events: true,
            retention_days: 14,
            subject_can_view: true,
        };
        let log = ActivityLog::record("kid", session(), &monitoring, now).unwrap();
        assert!(log.categories_accessed.is_empty());
        assert_eq!(log.policy_events.len(), 1);
        assert_eq!(log.session_duration_minutes, 42);
        assert_eq!(log.retention_expires_at, now + Duration::days(14));
        assert!(log.is_retained_at(now));
        assert!(!log.is_retained_at(now + Duration::days(14)));
    }
}
