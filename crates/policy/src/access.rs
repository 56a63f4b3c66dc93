//! Access decisions against a computed policy.

use crate::pattern::matches_any;
use crate::{is_inalienable, AgeRating, ComputedPolicy};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A request to view one piece of content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentRequest {
    pub content_hash: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub age_rating: Option<AgeRating>,
    #[serde(default)]
    pub reach_level: Option<u8>,
}

impl ContentRequest {
    pub fn new(content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            ..Default::default()
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn rated(mut self, rating: AgeRating) -> Self {
        self.age_rating = Some(rating);
        self
    }

    pub fn at_reach(mut self, reach: u8) -> Self {
        self.reach_level = Some(reach);
        self
    }
}

/// Why content was blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    BlockedHash,
    BlockedCategory { category: String },
    AgeRatingExceeded { rating: AgeRating, max: AgeRating },
    ReachExceeded { reach: u8, max: u8 },
    PolicyUnavailable,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::BlockedHash => write!(f, "content is blocked"),
            BlockReason::BlockedCategory { category } => {
                write!(f, "category '{category}' is blocked")
            }
            BlockReason::AgeRatingExceeded { rating, max } => {
                write!(f, "content rating '{rating}' exceeds allowed '{max}'")
            }
            BlockReason::ReachExceeded { reach, max } => {
                write!(f, "content reach level {reach} exceeds allowed {max}")
            }
            BlockReason::PolicyUnavailable => write!(f, "policy unavailable"),
        }
    }
}

/// Result of a content check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block { reason: BlockReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn block(reason: BlockReason) -> Self {
        Decision::Block { reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStatus {
    Allowed,
    OutsideWindow,
    SessionLimit,
    DailyLimit,
}

/// Configured time ceilings and the status they imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAccess {
    pub status: TimeStatus,
    pub remaining_session: Option<u32>,
    pub remaining_daily: Option<u32>,
    pub cooldown_minutes: Option<u32>,
}

/// What to do when no computed policy can be obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

impl ComputedPolicy {
    pub fn check_content(&self, request: &ContentRequest) -> Decision {
        let content = &self.content;

        if content.blocked_hashes.contains(&request.content_hash) {
            return Decision::block(BlockReason::BlockedHash);
        }

        if let Some(category) = request
            .categories
            .iter()
            .find(|c| content.blocked_categories.contains(*c))
        {
            return Decision::block(BlockReason::BlockedCategory {
                category: category.clone(),
            });
        }

        if let (Some(max), Some(rating)) = (content.age_rating_max, request.age_rating) {
            if rating > max {
                return Decision::block(BlockReason::AgeRatingExceeded { rating, max });
            }
        }

        if let (Some(max), Some(reach)) = (content.reach_level_max, request.reach_level) {
            if reach > max {
                return Decision::block(BlockReason::ReachExceeded { reach, max });
            }
        }

        Decision::Allow
    }

    pub fn check_feature(&self, feature: &str) -> bool {
        is_inalienable(feature) || !self.features.disabled_features.contains(feature)
    }

    pub fn check_route(&self, route: &str) -> bool {
        !matches_any(&self.features.disabled_routes, route)
    }

    /// Whether `feature` needs a steward's approval before use.
    pub fn requires_approval(&self, feature: &str) -> bool {
        !is_inalienable(feature) && self.features.require_approval.contains(feature)
    }

    /// Status derived from the configured ceilings alone.
    ///
    /// Live usage is tracked outside this crate; a ceiling of zero minutes
    /// means no time is available at all.
    pub fn check_time(&self) -> TimeAccess {
        let limits = &self.time;
        let status = if limits.session_max_minutes == Some(0) {
            TimeStatus::SessionLimit
        } else if limits.daily_max_minutes == Some(0) {
            TimeStatus::DailyLimit
        } else {
            TimeStatus::Allowed
        };
        TimeAccess {
            status,
            remaining_session: limits.session_max_minutes,
            remaining_daily: limits.daily_max_minutes,
            cooldown_minutes: limits.cooldown_minutes,
        }
    }

    /// Like [`check_time`](Self::check_time), also checking `local` against
    /// the windows of every layer that configured any.
    pub fn check_time_at(&self, local: NaiveDateTime) -> TimeAccess {
        let mut access = self.check_time();
        let outside = self
            .time_windows
            .iter()
            .any(|layer| !layer.windows.iter().any(|w| w.contains(local)));
        if access.status == TimeStatus::Allowed && outside {
            access.status = TimeStatus::OutsideWindow;
        }
        access
    }
}

/// Access checks over a policy that may be unavailable.
#[derive(Debug, Clone, Copy)]
pub struct AccessGate<'a> {
    policy: Option<&'a ComputedPolicy>,
    fail_mode: FailMode,
}

impl<'a> AccessGate<'a> {
    pub fn new(policy: Option<&'a ComputedPolicy>, fail_mode: FailMode) -> Self {
        Self { policy, fail_mode }
    }

    pub fn is_degraded(&self) -> bool {
        self.policy.is_none()
    }

    pub fn content(&self, request: &ContentRequest) -> Decision {
        self.content_with(request, self.fail_mode)
    }

    /// Content check with a per-call fail mode, for higher-stakes content.
    pub fn content_with(&self, request: &ContentRequest, fail_mode: FailMode) -> Decision {
        match (self.policy, fail_mode) {
            (Some(policy), _) => policy.check_content(request),
            (None, FailMode::Open) => Decision::Allow,
            (None, FailMode::Closed) => Decision::block(BlockReason::PolicyUnavailable),
        }
    }

    pub fn feature(&self, feature: &str) -> bool {
        match self.policy {
            Some(policy) => policy.check_feature(feature),
            None => is_inalienable(feature) || self.fail_mode == FailMode::Open,
        }
    }

    pub fn route(&self, route: &str) -> bool {
        match self.policy {
            Some(policy) => policy.check_route(route),
            None => self.fail_mode == FailMode::Open,
        }
    }

    pub fn time(&self, local: Option<NaiveDateTime>) -> TimeAccess {
        match (self.policy, local) {
            (Some(policy), Some(local)) => policy.check_time_at(local),
            (Some(policy), None) => policy.check_time(),
            (None, _) => TimeAccess {
                status: TimeStatus::Allowed,
                remaining_session: None,
                remaining_daily: None,
                cooldown_minutes: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DevicePolicy, RuleSet, Tier, TimeWindow};
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn computed(rules: RuleSet) -> ComputedPolicy {
        let layer = DevicePolicy::new("kid", "parent", Tier::Guardian, rules, Utc::now());
        ComputedPolicy::fold("kid", [&layer])
    }

    fn content_rules() -> RuleSet {
        let mut rules = RuleSet::default();
        rules.content.blocked_categories.insert("gambling".into());
        rules.content.blocked_hashes.insert("bad-hash".into());
        rules.content.age_rating_max = Some(AgeRating::Pg13);
        rules.content.reach_level_max = Some(3);
        rules
    }

    #[test]
    fn blocks_hash_and_category() {
        let p = computed(content_rules());
        assert_eq!(
            p.check_content(&ContentRequest::new("bad-hash")),
            Decision::Block { reason: BlockReason::BlockedHash }
        );
        let decision = p.check_content(&ContentRequest::new("h").with_categories(["news", "gambling"]));
        assert_eq!(
            decision,
            Decision::Block {
                reason: BlockReason::BlockedCategory { category: "gambling".into() }
            }
        );
    }

    #[test]
    fn rating_uses_label_order() {
        let p = computed(content_rules());
        assert!(p.check_content(&ContentRequest::new("h").rated(AgeRating::Pg)).is_allowed());
        assert!(p.check_content(&ContentRequest::new("h").rated(AgeRating::Pg13)).is_allowed());
        assert!(!p.check_content(&ContentRequest::new("h").rated(AgeRating::R)).is_allowed());
    }

    #[test]
    fn reach_ceiling() {
        let p = computed(content_rules());
        assert!(p.check_content(&ContentRequest::new("h").at_reach(3)).is_allowed());
        assert!(!p.check_content(&ContentRequest::new("h").at_reach(4)).is_allowed());
    }

    #[test]
    fn inalienable_feature_always_allowed() {
        let mut p = computed(RuleSet::default());
        // Even if a disabled set were tampered with after folding.
        p.features.disabled_features.insert("file_appeal".into());
        p.features.disabled_features.insert("post".into());
        assert!(p.check_feature("file_appeal"));
        assert!(!p.check_feature("post"));
    }

    #[test]
    fn routes_use_globs() {
        let mut rules = RuleSet::default();
        rules.features.disabled_routes.insert("/admin/**".into());
        rules.features.disabled_routes.insert("/settings/*".into());
        let p = computed(rules);
        assert!(!p.check_route("/admin/users/5"));
        assert!(p.check_route("/adminx/5"));
        assert!(!p.check_route("/settings/profile"));
        assert!(p.check_route("/settings/profile/edit"));
    }

    #[test]
    fn time_status_from_ceilings() {
        let mut rules = RuleSet::default();
        rules.time.session_max_minutes = Some(30);
        rules.time.daily_max_minutes = Some(0);
        let access = computed(rules).check_time();
        assert_eq!(access.status, TimeStatus::DailyLimit);
        assert_eq!(access.remaining_session, Some(30));
    }

    #[test]
    fn outside_window() {
        let mut rules = RuleSet::default();
        rules.time.time_windows = vec![TimeWindow::new(
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )];
        let p = computed(rules);
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(
            p.check_time_at(day.and_hms_opt(16, 0, 0).unwrap()).status,
            TimeStatus::Allowed
        );
        assert_eq!(
            p.check_time_at(day.and_hms_opt(21, 0, 0).unwrap()).status,
            TimeStatus::OutsideWindow
        );
    }

    #[test]
    fn gate_fails_open_by_default() {
        let gate = AccessGate::new(None, FailMode::default());
        assert!(gate.is_degraded());
        assert!(gate.content(&ContentRequest::new("h")).is_allowed());
        assert!(gate.route("/anything"));
    }

    #[test]
    fn gate_can_fail_closed() {
        let gate = AccessGate::new(None, FailMode::Open);
        let decision = gate.content_with(&ContentRequest::new("h"), FailMode::Closed);
        assert_eq!(
            decision,
            Decision::Block { reason: BlockReason::PolicyUnavailable }
        );

        let closed = AccessGate::new(None, FailMode::Closed);
        assert!(!closed.feature("post"));
        assert!(closed.feature("file_appeal"));
        assert!(!closed.route("/home"));
    }
}
