//! Entities the store persists, and the columns it indexes them by.

use policy::DevicePolicy;
use serde::{de::DeserializeOwned, Serialize};
use stewardship::{ActivityLog, CommunityIntervention, StewardshipAppeal, StewardshipGrant};

/// A versioned entity stored as a JSON document.
///
/// `subject_id` and `actor_id` are indexed columns; the document itself is
/// the source of truth.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: &'static str;

    fn id(&self) -> String;

    /// The agent the entity is about.
    fn subject_id(&self) -> &str;

    /// The agent acting on the subject: author, steward, advocate or initiator.
    fn actor_id(&self) -> &str;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

impl Record for DevicePolicy {
    const TABLE: &'static str = "policies";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }

    fn actor_id(&self) -> &str {
        &self.author_id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for StewardshipGrant {
    const TABLE: &'static str = "grants";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }

    fn actor_id(&self) -> &str {
        &self.steward_id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for StewardshipAppeal {
    const TABLE: &'static str = "appeals";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn subject_id(&self) -> &str {
        &self.appellant_id
    }

    fn actor_id(&self) -> &str {
        self.advocate_id.as_deref().unwrap_or(&self.appellant_id)
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for CommunityIntervention {
    const TABLE: &'static str = "interventions";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }

    fn actor_id(&self) -> &str {
        &self.initiated_by
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// Activity logs are written once and never updated.
impl Record for ActivityLog {
    const TABLE: &'static str = "activity_logs";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }

    fn actor_id(&self) -> &str {
        &self.subject_id
    }

    fn version(&self) -> u64 {
        1
    }

    fn set_version(&mut self, _version: u64) {}
}
