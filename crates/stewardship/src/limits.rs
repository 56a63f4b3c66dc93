//! Tunable bounds for the lifecycles in this crate.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Lifecycle bounds. Every field has a default so a partial `[limits]`
/// table in configuration is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Deepest delegation allowed below an original grant.
    pub max_delegation_depth: u32,
    /// Days after `review_at` before an unreviewed grant expires.
    pub review_grace_days: u32,
    /// Days an appeal may wait for a decision.
    pub appeal_window_days: u32,
    /// Days an intervention may gather support.
    pub gathering_window_days: u32,
    /// Hours allowed between crossing the threshold and notifying the subject.
    pub notify_within_hours: u32,
    /// Days the subject has to respond once notified.
    pub response_window_days: u32,
    /// Days between re-examinations of a resolved intervention.
    pub resolution_review_days: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_delegation_depth: 3,
            review_grace_days: 7,
            appeal_window_days: 30,
            gathering_window_days: 30,
            notify_within_hours: 24,
            response_window_days: 7,
            resolution_review_days: 30,
        }
    }
}

impl Limits {
    pub fn review_grace(&self) -> Duration {
        Duration::days(i64::from(self.review_grace_days))
    }

    pub fn appeal_window(&self) -> Duration {
        Duration::days(i64::from(self.appeal_window_days))
    }

    pub fn gathering_window(&self) -> Duration {
        Duration::days(i64::from(self.gathering_window_days))
    }

    pub fn notify_within(&self) -> Duration {
        Duration::hours(i64::from(self.notify_within_hours))
    }

    pub fn response_window(&self) -> Duration {
        Duration::days(i64::from(self.response_window_days))
    }

    pub fn resolution_review(&self) -> Duration {
        Duration::days(i64::from(self.resolution_review_days))
    }
}
