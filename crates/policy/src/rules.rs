//! Rule families carried by a policy layer.

use crate::{CapabilityKind, Error, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

/// Highest reach level a policy may cap content at.
pub const MAX_REACH_LEVEL: u8 = 7;

/// Longest activity-log retention a policy may request.
pub const MAX_RETENTION_DAYS: u32 = 365;

/// Features no policy layer may disable.
pub const INALIENABLE_FEATURES: [&str; 6] = [
    "capabilities_dashboard",
    "file_appeal",
    "contact_steward",
    "advocate_chat",
    "emergency_call",
    "time_status",
];

pub fn is_inalienable(feature: &str) -> bool {
    INALIENABLE_FEATURES.contains(&feature)
}

/// Content age rating, ordered from least to most mature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeRating {
    #[serde(rename = "G")]
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "NC-17")]
    Nc17,
}

impl AgeRating {
    pub const ALL: [AgeRating; 5] = [
        AgeRating::G,
        AgeRating::Pg,
        AgeRating::Pg13,
        AgeRating::R,
        AgeRating::Nc17,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgeRating::G => "G",
            AgeRating::Pg => "PG",
            AgeRating::Pg13 => "PG-13",
            AgeRating::R => "R",
            AgeRating::Nc17 => "NC-17",
        }
    }
}

impl std::fmt::Display for AgeRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeRating {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AgeRating::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::Parse(format!("unknown age rating '{s}'")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRules {
    #[serde(default)]
    pub blocked_categories: BTreeSet<String>,
    #[serde(default)]
    pub blocked_hashes: BTreeSet<String>,
    #[serde(default)]
    pub age_rating_max: Option<AgeRating>,
    #[serde(default)]
    pub reach_level_max: Option<u8>,
}

impl ContentRules {
    pub fn is_empty(&self) -> bool {
        self.blocked_categories.is_empty()
            && self.blocked_hashes.is_empty()
            && self.age_rating_max.is_none()
            && self.reach_level_max.is_none()
    }
}

/// A daily window during which access is permitted.
///
/// A window whose `start` is after its `end` wraps past midnight. Empty
/// `days` means every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: Vec::new(),
            start,
            end,
        }
    }

    fn applies_on(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }

    /// Whether `at` (local time) falls inside this window.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = at.date().weekday();
        let t = at.time();
        if self.start <= self.end {
            self.applies_on(day) && t >= self.start && t < self.end
        } else {
            (self.applies_on(day) && t >= self.start) || (self.applies_on(day.pred()) && t < self.end)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRules {
    #[serde(default)]
    pub session_max_minutes: Option<u32>,
    #[serde(default)]
    pub daily_max_minutes: Option<u32>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    #[serde(default)]
    pub cooldown_minutes: Option<u32>,
}

impl TimeRules {
    pub fn is_empty(&self) -> bool {
        self.session_max_minutes.is_none()
            && self.daily_max_minutes.is_none()
            && self.time_windows.is_empty()
            && self.cooldown_minutes.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRules {
    #[serde(default)]
    pub disabled_features: BTreeSet<String>,
    /// Route patterns (`*` one segment, `**` any number of segments).
    #[serde(default)]
    pub disabled_routes: BTreeSet<String>,
    #[serde(default)]
    pub require_approval: BTreeSet<String>,
}

impl FeatureRules {
    pub fn is_empty(&self) -> bool {
        self.disabled_features.is_empty()
            && self.disabled_routes.is_empty()
            && self.require_approval.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRules {
    #[serde(default)]
    pub log_sessions: bool,
    #[serde(default)]
    pub log_categories: bool,
    #[serde(default)]
    pub log_policy_events: bool,
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default = "default_subject_can_view")]
    pub subject_can_view: bool,
}

fn default_subject_can_view() -> bool {
    true
}

impl Default for MonitoringRules {
    fn default() -> Self {
        Self {
            log_sessions: false,
            log_categories: false,
            log_policy_events: false,
            retention_days: 0,
            subject_can_view: true,
        }
    }
}

impl MonitoringRules {
    pub fn any_logging(&self) -> bool {
        self.log_sessions || self.log_categories || self.log_policy_events
    }

    /// Whether any field departs from the unmonitored default.
    pub fn is_set(&self) -> bool {
        *self != Self::default()
    }
}

/// The full set of rules one author imposes, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub content: ContentRules,
    #[serde(default)]
    pub time: TimeRules,
    #[serde(default)]
    pub features: FeatureRules,
    #[serde(default)]
    pub monitoring: Option<MonitoringRules>,
}

impl RuleSet {
    /// Load a rule set from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a rule set from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let rules: RuleSet = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(reach) = self.content.reach_level_max {
            if reach > MAX_REACH_LEVEL {
                return Err(Error::Invalid(format!(
                    "reach_level_max must be 0-{MAX_REACH_LEVEL}, got {reach}"
                )));
            }
        }
        for window in &self.time.time_windows {
            if window.start == window.end {
                return Err(Error::Invalid(format!(
                    "time window {} - {} is empty",
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M")
                )));
            }
        }
        if let Some(monitoring) = &self.monitoring {
            if monitoring.retention_days > MAX_RETENTION_DAYS {
                return Err(Error::Invalid(format!(
                    "retention_days cannot exceed {MAX_RETENTION_DAYS}"
                )));
            }
        }
        Ok(())
    }

    /// Capabilities an author needs to impose these rules on someone else.
    pub fn required_capabilities(&self) -> Vec<CapabilityKind> {
        let mut needed = Vec::new();
        if !self.content.is_empty() {
            needed.push(CapabilityKind::ContentFiltering);
        }
        if !self.time.is_empty() {
            needed.push(CapabilityKind::TimeLimits);
        }
        if !self.features.is_empty() {
            needed.push(CapabilityKind::FeatureRestrictions);
        }
        if self.monitoring.as_ref().is_some_and(MonitoringRules::is_set) {
            needed.push(CapabilityKind::ActivityMonitoring);
        }
        needed
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2024-01-01 is a Monday.
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn age_rating_order_is_not_lexical() {
        assert!(AgeRating::Pg13 > AgeRating::Pg);
        assert!(AgeRating::Nc17 > AgeRating::R);
        assert!(AgeRating::G < AgeRating::Pg);
        assert!("PG-13" < "PG"); // lexical order disagrees
        assert_eq!("PG-13".parse::<AgeRating>().unwrap(), AgeRating::Pg13);
    }

    #[test]
    fn window_contains_same_day() {
        let w = TimeWindow::new(hm(9, 0), hm(17, 0));
        assert!(w.contains(at(1, 9, 0)));
        assert!(!w.contains(at(1, 17, 0)));
        assert!(!w.contains(at(1, 8, 59)));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = TimeWindow {
            days: vec![Weekday::Fri],
            start: hm(22, 0),
            end: hm(2, 0),
        };
        assert!(w.contains(at(5, 23, 0))); // Friday night
        assert!(w.contains(at(6, 1, 30))); // early Saturday
        assert!(!w.contains(at(7, 1, 30))); // early Sunday belongs to Saturday
    }

    #[test]
    fn parse_rule_set() {
        let toml = r#"
[content]
blocked_categories = ["gambling", "violence"]
age_rating_max = "PG-13"

[time]
daily_max_minutes = 120
time_windows = [{ days = ["Mon", "Tue"], start = "15:00", end = "20:30" }]

[features]
disabled_routes = ["/admin/**"]
"#;
        let rules = RuleSet::parse(toml).unwrap();
        assert_eq!(rules.content.age_rating_max, Some(AgeRating::Pg13));
        assert_eq!(rules.time.time_windows[0].end, hm(20, 30));
        assert!(rules.monitoring.is_none());
        assert_eq!(
            rules.required_capabilities(),
            vec![
                CapabilityKind::ContentFiltering,
                CapabilityKind::TimeLimits,
                CapabilityKind::FeatureRestrictions
            ]
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(RuleSet::parse("[content]\nreach_level_max = 8").is_err());
        assert!(RuleSet::parse("[monitoring]\nretention_days = 400").is_err());
    }

    #[test]
    fn hiding_logs_or_retaining_them_needs_monitoring() {
        let hidden = RuleSet::parse("[monitoring]\nsubject_can_view = false").unwrap();
        assert_eq!(
            hidden.required_capabilities(),
            vec![CapabilityKind::ActivityMonitoring]
        );
        let retained = RuleSet::parse("[monitoring]\nretention_days = 30").unwrap();
        assert_eq!(
            retained.required_capabilities(),
            vec![CapabilityKind::ActivityMonitoring]
        );
        let unset = RuleSet::parse("[monitoring]").unwrap();
        assert!(unset.required_capabilities().is_empty());
    }

    #[test]
    fn monitoring_defaults_to_visible() {
        let rules = RuleSet::parse("[monitoring]\nlog_sessions = true").unwrap();
        let monitoring = rules.monitoring.unwrap();
        assert!(monitoring.subject_can_view);
        assert!(monitoring.any_logging());
    }
}
