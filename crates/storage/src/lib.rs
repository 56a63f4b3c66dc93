//! SQLite-backed storage for stewardship records.
//!
//! Every entity (policy layer, grant, appeal, intervention, activity log)
//! is one JSON document in its own table, indexed by subject and actor and
//! carrying a `version`. Writes to an existing record are compare-and-swap:
//! [`Store::update`] succeeds only if nobody else wrote since the version
//! the caller read, and fails with [`Error::Conflict`] otherwise.
//!
//! Alongside the records the store keeps:
//!
//! - `chain_links`: the derived, ordered policy chain per subject;
//! - `events`: an append-only [`AuditEvent`] trail, one per mutation.
//!
//! # Example
//!
//! ```no_run
//! use storage::{AuditEvent, AuditKind, Store};
//!
//! let store = Store::open("steward.db")?;
//! store.append(&AuditEvent::new("grant-1", "parent", AuditKind::GrantReviewed, chrono::Utc::now()))?;
//! for event in store.events_for("grant-1")? {
//!     println!("{}: {}", event.timestamp, event.kind.name());
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod record;
mod store;

pub use error::{Error, Result};
pub use event::{AuditEvent, AuditKind};
pub use record::Record;
pub use store::Store;
