//! Community interventions: weighted support toward acting on a concern
//! about someone, with notification, a response window and arbitration.

use crate::{
    Error, Limits, RelationshipLevel, Result, INTERVENTION_THRESHOLD, INTERVENTION_THRESHOLD_TENTHS,
    tenths_to_weight,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterventionId(pub Uuid);

impl InterventionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InterventionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InterventionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InterventionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(Self)
            .map_err(|_| Error::Invalid(format!("invalid intervention id '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Gathering,
    ThresholdMet,
    Notified,
    ResponseWindow,
    Arbitration,
    Resolved,
    Restored,
    Expired,
}

impl InterventionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InterventionStatus::Gathering => "gathering",
            InterventionStatus::ThresholdMet => "threshold_met",
            InterventionStatus::Notified => "notified",
            InterventionStatus::ResponseWindow => "response_window",
            InterventionStatus::Arbitration => "arbitration",
            InterventionStatus::Resolved => "resolved",
            InterventionStatus::Restored => "restored",
            InterventionStatus::Expired => "expired",
        }
    }

    pub fn accepts_support(self) -> bool {
        matches!(self, InterventionStatus::Gathering | InterventionStatus::ThresholdMet)
    }
}

impl std::fmt::Display for InterventionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supporter {
    pub supporter_id: String,
    pub relationship_level: RelationshipLevel,
    /// Weight in tenths for `relationship_level`.
    pub weight_tenths: u32,
    pub reason: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl Supporter {
    pub fn weight(&self) -> f64 {
        tenths_to_weight(self.weight_tenths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: InterventionStatus,
    pub at: DateTime<Utc>,
    /// `None` when a deadline caused the change.
    pub actor_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub reviewer_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub restored: bool,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectResponse {
    pub text: String,
    pub responded_at: DateTime<Utc>,
}

/// Outcome of arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Consequences apply; the outcome is reviewed periodically.
    Resolved,
    /// No action; the subject's standing is unaffected.
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportOutcome {
    Added,
    /// An existing supporter changed their relationship level.
    Updated,
    ThresholdCrossed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIntervention {
    pub subject_id: String,
    pub relationship_level: RelationshipLevel,
    pub pattern_description: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub evidence_hashes: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityIntervention {
    pub id: InterventionId,
    pub subject_id: String,
    pub initiated_by: String,

    /// Keyed by supporter id; one entry per supporter.
    pub supporters: BTreeMap<String, Supporter>,

    pub pattern_description: String,
    pub evidence_hashes: Vec<String>,
    pub categories: BTreeSet<String>,

    pub status: InterventionStatus,
    pub status_history: Vec<StatusChange>,
    pub review_history: Vec<ReviewRecord>,

    pub gathering_deadline: DateTime<Utc>,
    pub threshold_met_at: Option<DateTime<Utc>>,
    pub notify_deadline: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub response_window_ends_at: Option<DateTime<Utc>>,
    pub subject_response: Option<SubjectResponse>,
    pub next_review_at: Option<DateTime<Utc>>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommunityIntervention {
    /// Start gathering support. The initiator is the first supporter.
    pub fn initiate(
        initiator: &str,
        input: NewIntervention,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if input.subject_id.is_empty() || initiator.is_empty() {
            return Err(Error::Invalid("subject and initiator are required".into()));
        }
        if input.subject_id == initiator {
            return Err(Error::NotPermitted(
                "cannot initiate an intervention about yourself".into(),
            ));
        }
        let pattern = input.pattern_description.trim();
        if pattern.is_empty() {
            return Err(Error::Invalid("describe the pattern of concern".into()));
        }

        let mut intervention = Self {
            id: InterventionId::new(),
            subject_id: input.subject_id,
            initiated_by: initiator.to_string(),
            supporters: BTreeMap::new(),
            pattern_description: pattern.to_string(),
            evidence_hashes: input.evidence_hashes,
            categories: input.categories,
            status: InterventionStatus::Gathering,
            status_history: vec![StatusChange {
                status: InterventionStatus::Gathering,
                at: now,
                actor_id: Some(initiator.to_string()),
                note: None,
            }],
            review_history: Vec::new(),
            gathering_deadline: now + limits.gathering_window(),
            threshold_met_at: None,
            notify_deadline: None,
            notified_at: None,
            response_window_ends_at: None,
            subject_response: None,
            next_review_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        intervention.add_supporter(initiator, input.relationship_level, input.reason, limits, now);
        Ok(intervention)
    }

    /// Sum of supporter weights in tenths.
    pub fn total_weight_tenths(&self) -> u32 {
        self.supporters.values().map(|s| s.weight_tenths).sum()
    }

    pub fn total_weight(&self) -> f64 {
        tenths_to_weight(self.total_weight_tenths())
    }

    pub fn threshold_met(&self) -> bool {
        self.total_weight_tenths() >= INTERVENTION_THRESHOLD_TENTHS
    }

    pub fn supporter_count(&self) -> usize {
        self.supporters.len()
    }

    /// Add a supporter. Supporting again replaces the earlier entry, so
    /// each supporter counts once.
    pub fn support(
        &mut self,
        supporter_id: &str,
        level: RelationshipLevel,
        reason: Option<String>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<SupportOutcome> {
        if supporter_id == self.subject_id {
            return Err(Error::NotPermitted(
                "cannot support an intervention about yourself".into(),
            ));
        }
        if !self.status.accepts_support() {
            return Err(self.invalid("support"));
        }
        if self.status == InterventionStatus::Gathering && now >= self.gathering_deadline {
            return Err(Error::Expired(format!(
                "intervention {} stopped gathering support",
                self.id
            )));
        }
        Ok(self.add_supporter(supporter_id, level, reason, limits, now))
    }

    fn add_supporter(
        &mut self,
        supporter_id: &str,
        level: RelationshipLevel,
        reason: Option<String>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> SupportOutcome {
        let reason = reason.filter(|r| !r.trim().is_empty());
        let existing = self.supporters.get_mut(supporter_id);
        let updated = existing.is_some();
        match existing {
            Some(entry) => {
                entry.relationship_level = level;
                entry.weight_tenths = level.weight_tenths();
                if reason.is_some() {
                    entry.reason = reason;
                }
            }
            None => {
                self.supporters.insert(
                    supporter_id.to_string(),
                    Supporter {
                        supporter_id: supporter_id.to_string(),
                        relationship_level: level,
                        weight_tenths: level.weight_tenths(),
                        reason,
                        joined_at: now,
                    },
                );
            }
        }
        self.updated_at = now;

        if self.status == InterventionStatus::Gathering && self.threshold_met() {
            self.threshold_met_at = Some(now);
            self.notify_deadline = Some(now + limits.notify_within());
            self.transition(InterventionStatus::ThresholdMet, None, None, now);
            tracing::info!(
                intervention = %self.id,
                total = self.total_weight(),
                "intervention reached its support threshold"
            );
            SupportOutcome::ThresholdCrossed
        } else if updated {
            SupportOutcome::Updated
        } else {
            SupportOutcome::Added
        }
    }

    pub fn notify_subject(&mut self, actor: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        if !self.threshold_met() {
            return Err(Error::ThresholdNotReached {
                total: self.total_weight(),
                threshold: INTERVENTION_THRESHOLD,
            });
        }
        if self.status != InterventionStatus::ThresholdMet {
            return Err(self.invalid("notify subject of"));
        }
        self.notified_at = Some(now);
        self.transition(InterventionStatus::Notified, actor, None, now);
        Ok(())
    }

    pub fn open_response_window(&mut self, actor: Option<&str>, limits: &Limits, now: DateTime<Utc>) -> Result<()> {
        if self.status != InterventionStatus::Notified {
            return Err(self.invalid("open response window for"));
        }
        self.response_window_ends_at = Some(now + limits.response_window());
        self.transition(InterventionStatus::ResponseWindow, actor, None, now);
        Ok(())
    }

    pub fn record_subject_response(
        &mut self,
        actor: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if actor != self.subject_id {
            return Err(Error::NotPermitted("only the subject can respond".into()));
        }
        if !matches!(
            self.status,
            InterventionStatus::Notified | InterventionStatus::ResponseWindow
        ) {
            return Err(self.invalid("respond to"));
        }
        if self.response_window_ends_at.is_some_and(|ends| now >= ends) {
            return Err(Error::Expired("the response window has closed".into()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Invalid("response cannot be empty".into()));
        }
        self.subject_response = Some(SubjectResponse {
            text: text.to_string(),
            responded_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Hand the case to arbitration once the subject has responded or the
    /// response window has run out.
    pub fn begin_arbitration(&mut self, actor: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        if self.status != InterventionStatus::ResponseWindow {
            return Err(self.invalid("arbitrate"));
        }
        let window_over = self.response_window_ends_at.is_none_or(|ends| now >= ends);
        if !window_over && self.subject_response.is_none() {
            return Err(Error::NotPermitted(
                "the subject's response window is still open".into(),
            ));
        }
        self.transition(InterventionStatus::Arbitration, actor, None, now);
        Ok(())
    }

    pub fn resolve(
        &mut self,
        arbitrator: &str,
        resolution: Resolution,
        notes: &str,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if arbitrator == self.subject_id {
            return Err(Error::NotPermitted("the subject cannot arbitrate their own case".into()));
        }
        if self.supporters.contains_key(arbitrator) {
            return Err(Error::NotPermitted("a supporter cannot arbitrate the case".into()));
        }
        if self.status != InterventionStatus::Arbitration {
            return Err(self.invalid("resolve"));
        }
        let to = match resolution {
            Resolution::Resolved => {
                self.next_review_at = Some(now + limits.resolution_review());
                InterventionStatus::Resolved
            }
            Resolution::Restored => {
                self.next_review_at = None;
                InterventionStatus::Restored
            }
        };
        let note = Some(notes.trim()).filter(|n| !n.is_empty()).map(str::to_string);
        self.transition(to, Some(arbitrator), note, now);
        Ok(())
    }

    /// Re-examine a resolved outcome once it is due.
    pub fn periodic_review(
        &mut self,
        reviewer: &str,
        restore: bool,
        notes: &str,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != InterventionStatus::Resolved {
            return Err(self.invalid("review"));
        }
        if let Some(due) = self.next_review_at.filter(|due| now < *due) {
            return Err(Error::Invalid(format!("next review is due at {due}")));
        }
        self.review_history.push(ReviewRecord {
            reviewer_id: reviewer.to_string(),
            reviewed_at: now,
            restored: restore,
            notes: notes.trim().to_string(),
        });
        if restore {
            self.next_review_at = None;
            self.transition(InterventionStatus::Restored, Some(reviewer), None, now);
        } else {
            self.next_review_at = Some(now + limits.resolution_review());
            self.updated_at = now;
        }
        Ok(())
    }

    /// Apply deadline-driven transitions. Returns the new status if one fired.
    pub fn tick(&mut self, limits: &Limits, now: DateTime<Utc>) -> Option<InterventionStatus> {
        let due = match self.status {
            InterventionStatus::Gathering if now >= self.gathering_deadline => {
                Some(InterventionStatus::Expired)
            }
            InterventionStatus::ThresholdMet
                if self.notify_deadline.is_some_and(|d| now >= d) =>
            {
                Some(InterventionStatus::Notified)
            }
            InterventionStatus::ResponseWindow
                if self.response_window_ends_at.is_some_and(|d| now >= d) =>
            {
                Some(InterventionStatus::Arbitration)
            }
            _ => None,
        }?;
        match due {
            InterventionStatus::Notified => {
                self.notified_at = Some(now);
                self.transition(due, None, Some("notify deadline reached".into()), now);
                // The window opens with the notice.
                self.response_window_ends_at = Some(now + limits.response_window());
                self.transition(InterventionStatus::ResponseWindow, None, None, now);
            }
            _ => self.transition(due, None, Some("deadline reached".into()), now),
        }
        Some(self.status)
    }

    fn transition(
        &mut self,
        to: InterventionStatus,
        actor: Option<&str>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        tracing::debug!(intervention = %self.id, from = %self.status, to = %to, "intervention transition");
        self.status = to;
        self.status_history.push(StatusChange {
            status: to,
            at: now,
            actor_id: actor.map(str::to_string),
            note,
        });
        self.updated_at = now;
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            entity: "intervention",
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn initiate(level: RelationshipLevel) -> CommunityIntervention {
        CommunityIntervention::initiate(
            "initiator",
            NewIntervention {
                subject_id: "subject".into(),
                relationship_level: level,
                pattern_description: "repeated harassment in group chat".into(),
                categories: BTreeSet::from(["harassment".to_string()]),
                evidence_hashes: Vec::new(),
                reason: None,
            },
            &Limits::default(),
            Utc::now(),
        )
        .unwrap()
    }

    fn reach_threshold(i: &mut CommunityIntervention, now: DateTime<Utc>) {
        let limits = Limits::default();
        for n in 0..4 {
            i.support(&format!("friend-{n}"), RelationshipLevel::Trusted, None, &limits, now)
                .unwrap();
        }
    }

    #[test]
    fn initiator_is_first_supporter() {
        let i = initiate(RelationshipLevel::Trusted);
        assert_eq!(i.supporter_count(), 1);
        assert_eq!(i.total_weight(), 2.0);
        assert_eq!(i.status, InterventionStatus::Gathering);
        assert_eq!(i.status_history.len(), 1);
    }

    #[test]
    fn subject_cannot_take_part() {
        let result = CommunityIntervention::initiate(
            "subject",
            NewIntervention {
                subject_id: "subject".into(),
                relationship_level: RelationshipLevel::Public,
                pattern_description: "x".into(),
                categories: BTreeSet::new(),
                evidence_hashes: Vec::new(),
                reason: None,
            },
            &Limits::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::NotPermitted(_))));

        let mut i = initiate(RelationshipLevel::Public);
        let result = i.support("subject", RelationshipLevel::Intimate, None, &Limits::default(), Utc::now());
        assert!(matches!(result, Err(Error::NotPermitted(_))));
    }

    #[test]
    fn crossing_the_threshold() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut i = initiate(RelationshipLevel::Trusted);
        i.support("a", RelationshipLevel::Intimate, None, &limits, now).unwrap();
        i.support("b", RelationshipLevel::Intimate, None, &limits, now).unwrap();
        assert_eq!(i.total_weight(), 8.0);
        assert!(!i.threshold_met());

        let outcome = i.support("c", RelationshipLevel::Trusted, None, &limits, now).unwrap();
        assert_eq!(outcome, SupportOutcome::ThresholdCrossed);
        assert_eq!(i.total_weight(), 10.0);
        assert_eq!(i.status, InterventionStatus::ThresholdMet);
        assert_eq!(i.notify_deadline, Some(now + Duration::hours(24)));

        let outcome = i.support("d", RelationshipLevel::Public, None, &limits, now).unwrap();
        assert_eq!(outcome, SupportOutcome::Added);
        assert_eq!(i.status, InterventionStatus::ThresholdMet);
    }

    #[test]
    fn supporting_twice_updates_rather_than_doubles() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut i = initiate(RelationshipLevel::Familiar);
        i.support("a", RelationshipLevel::Trusted, None, &limits, now).unwrap();
        assert_eq!(i.total_weight(), 3.0);

        let outcome = i.support("a", RelationshipLevel::Intimate, None, &limits, now).unwrap();
        assert_eq!(outcome, SupportOutcome::Updated);
        assert_eq!(i.total_weight(), 4.0);
        assert_eq!(i.supporter_count(), 2);
        assert_eq!(i.supporters["a"].relationship_level, RelationshipLevel::Intimate);
    }

    #[test]
    fn five_supporters_at_eight_then_one_more_trusted() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut i = initiate(RelationshipLevel::Trusted);
        i.support("b", RelationshipLevel::Trusted, None, &limits, now).unwrap();
        i.support("c", RelationshipLevel::Trusted, None, &limits, now).unwrap();
        i.support("d", RelationshipLevel::Familiar, None, &limits, now).unwrap();
        i.support("e", RelationshipLevel::Familiar, None, &limits, now).unwrap();
        assert_eq!(i.total_weight(), 8.0);
        assert!(!i.threshold_met());

        i.support("f", RelationshipLevel::Trusted, None, &limits, now).unwrap();
        assert_eq!(i.total_weight(), 10.0);
        assert!(i.threshold_met());
    }

    #[test]
    fn notify_requires_threshold() {
        let mut i = initiate(RelationshipLevel::Public);
        let err = i.notify_subject(None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::ThresholdNotReached { .. }));
    }

    #[test]
    fn full_path_to_resolution_and_review() {
        let now = Utc::now();
        let limits = Limits::default();
        let mut i = initiate(RelationshipLevel::Trusted);
        reach_threshold(&mut i, now);
        i.notify_subject(Some("moderator"), now).unwrap();
        i.open_response_window(Some("moderator"), &limits, now).unwrap();

        assert!(i.begin_arbitration(None, now).is_err());
        i.record_subject_response("subject", "it was a misunderstanding", now).unwrap();
        i.begin_arbitration(None, now).unwrap();
        assert!(i.support("late", RelationshipLevel::Public, None, &limits, now).is_err());

        i.resolve("arbiter", Resolution::Resolved, "muted for a week", &limits, now).unwrap();
        assert_eq!(i.status, InterventionStatus::Resolved);
        let due = now + Duration::days(30);
        assert_eq!(i.next_review_at, Some(due));

        assert!(i.periodic_review("arbiter", true, "", &limits, now).is_err());
        i.periodic_review("arbiter", false, "still needed", &limits, due).unwrap();
        assert_eq!(i.status, InterventionStatus::Resolved);
        i.periodic_review("arbiter", true, "behaviour improved", &limits, due + Duration::days(30))
            .unwrap();
        assert_eq!(i.status, InterventionStatus::Restored);
        assert_eq!(i.review_history.len(), 2);

        let statuses: Vec<_> = i.status_history.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                InterventionStatus::Gathering,
                InterventionStatus::ThresholdMet,
                InterventionStatus::Notified,
                InterventionStatus::ResponseWindow,
                InterventionStatus::Arbitration,
                InterventionStatus::Resolved,
                InterventionStatus::Restored,
            ]
        );
    }

    #[test]
    fn deadlines_drive_the_sweep() {
        let now = Utc::now();
        let limits = Limits::default();

        let mut stale = initiate(RelationshipLevel::Public);
        assert_eq!(stale.tick(&limits, now), None);
        let late = stale.gathering_deadline;
        assert!(stale.support("a", RelationshipLevel::Public, None, &limits, late).is_err());
        assert_eq!(stale.tick(&limits, late), Some(InterventionStatus::Expired));

        let mut i = initiate(RelationshipLevel::Trusted);
        reach_threshold(&mut i, now);
        let notify_by = now + Duration::hours(24);
        assert_eq!(i.tick(&limits, notify_by), Some(InterventionStatus::ResponseWindow));
        assert!(i.notified_at.is_some());
        let window_end = notify_by + Duration::days(7);
        assert_eq!(i.tick(&limits, window_end), Some(InterventionStatus::Arbitration));
    }
}
