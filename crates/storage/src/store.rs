//! SQLite store implementation.

use crate::{AuditEvent, Error, Record, Result};
use chrono::Utc;
use policy::{PolicyChainLink, PolicyId, Tier};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;

/// Tables holding [`Record`] documents.
const RECORD_TABLES: [&str; 5] = ["policies", "grants", "appeals", "interventions", "activity_logs"];

/// SQLite-backed store for stewardship records and their audit trail.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        for table in RECORD_TABLES {
            self.conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    subject_id TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    data TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_subject ON {table}(subject_id);
                CREATE INDEX IF NOT EXISTS idx_{table}_actor ON {table}(actor_id);
                "#
            ))?;
        }
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chain_links (
                subject_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                policy_id TEXT NOT NULL,
                author_tier TEXT NOT NULL,
                PRIMARY KEY (subject_id, ordinal)
            );
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_entity
                ON events(entity_id, timestamp);
            "#,
        )?;
        Ok(())
    }

    /// Run `f` in a transaction; any error rolls every write back.
    pub fn atomically<T, E>(&self, f: impl FnOnce(&Self) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        let tx = self.conn.unchecked_transaction().map_err(Error::from)?;
        let out = f(self)?;
        tx.commit().map_err(Error::from)?;
        Ok(out)
    }

    /// Store a new record. Fails with [`Error::Conflict`] if the id exists.
    pub fn insert<R: Record>(&self, record: &R) -> Result<()> {
        let result = self.conn.execute(
            &format!(
                "INSERT INTO {} (id, subject_id, actor_id, version, updated_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                R::TABLE
            ),
            params![
                record.id(),
                record.subject_id(),
                record.actor_id(),
                record.version() as i64,
                Utc::now().to_rfc3339(),
                serde_json::to_string(record)?,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::Conflict {
                    table: R::TABLE,
                    id: record.id(),
                    expected: 0,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compare-and-swap update. Succeeds only if the stored version still
    /// equals `record.version()`, then bumps the version on both sides.
    pub fn update<R: Record>(&self, record: &mut R) -> Result<()> {
        let expected = record.version();
        record.set_version(expected + 1);
        let data = match serde_json::to_string(record) {
            Ok(data) => data,
            Err(e) => {
                record.set_version(expected);
                return Err(e.into());
            }
        };
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET subject_id = ?1, actor_id = ?2, version = ?3, updated_at = ?4, data = ?5
                 WHERE id = ?6 AND version = ?7",
                R::TABLE
            ),
            params![
                record.subject_id(),
                record.actor_id(),
                (expected + 1) as i64,
                Utc::now().to_rfc3339(),
                data,
                record.id(),
                expected as i64,
            ],
        );
        match changed {
            Ok(1) => Ok(()),
            Ok(_) => {
                record.set_version(expected);
                if self.exists::<R>(&record.id())? {
                    Err(Error::Conflict {
                        table: R::TABLE,
                        id: record.id(),
                        expected,
                    })
                } else {
                    Err(Error::NotFound(format!("{} {}", R::TABLE, record.id())))
                }
            }
            Err(e) => {
                record.set_version(expected);
                Err(e.into())
            }
        }
    }

    fn exists<R: Record>(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", R::TABLE),
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT data FROM {} WHERE id = ?1", R::TABLE))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Records about `subject_id`, oldest first.
    pub fn list_by_subject<R: Record>(&self, subject_id: &str) -> Result<Vec<R>> {
        self.load(&format!("SELECT id, data FROM {} WHERE subject_id = ?1 ORDER BY rowid", R::TABLE), Some(subject_id))
    }

    /// Records acted on by `actor_id`, oldest first.
    pub fn list_by_actor<R: Record>(&self, actor_id: &str) -> Result<Vec<R>> {
        self.load(&format!("SELECT id, data FROM {} WHERE actor_id = ?1 ORDER BY rowid", R::TABLE), Some(actor_id))
    }

    pub fn list_all<R: Record>(&self) -> Result<Vec<R>> {
        self.load(&format!("SELECT id, data FROM {} ORDER BY rowid", R::TABLE), None)
    }

    /// Rows that fail to decode are skipped with a warning.
    fn load<R: Record>(&self, sql: &str, key: Option<&str>) -> Result<Vec<R>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String)> {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        };
        let rows: Vec<(String, String)> = match key {
            Some(key) => stmt.query_map([key], map)?.collect::<rusqlite::Result<_>>()?,
            None => stmt.query_map([], map)?.collect::<rusqlite::Result<_>>()?,
        };

        Ok(rows
            .into_iter()
            .filter_map(|(id, data)| match serde_json::from_str(&data) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(table = R::TABLE, %id, error = %e, "skipping malformed row");
                    None
                }
            })
            .collect())
    }

    /// Delete a record outright. Only used for data past its retention.
    pub fn remove<R: Record>(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", R::TABLE), [id])?;
        Ok(n > 0)
    }

    /// Replace the derived chain for a subject.
    pub fn replace_chain_links(&self, subject_id: &str, links: &[PolicyChainLink]) -> Result<()> {
        self.conn
            .execute("DELETE FROM chain_links WHERE subject_id = ?1", [subject_id])?;
        for link in links {
            self.conn.execute(
                "INSERT INTO chain_links (subject_id, ordinal, policy_id, author_tier)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    link.subject_id,
                    link.ordinal as i64,
                    link.policy_id.to_string(),
                    link.author_tier.as_str(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn chain_links(&self, subject_id: &str) -> Result<Vec<PolicyChainLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, ordinal, policy_id, author_tier FROM chain_links
             WHERE subject_id = ?1 ORDER BY ordinal",
        )?;

        let links = stmt
            .query_map([subject_id], |row| {
                let subject_id: String = row.get(0)?;
                let ordinal: i64 = row.get(1)?;
                let policy_id: String = row.get(2)?;
                let author_tier: String = row.get(3)?;
                Ok((subject_id, ordinal, policy_id, author_tier))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(subject_id, ordinal, policy_id, author_tier)| {
                Some(PolicyChainLink {
                    subject_id,
                    policy_id: policy_id.parse::<PolicyId>().ok()?,
                    author_tier: author_tier.parse::<Tier>().ok()?,
                    ordinal: u32::try_from(ordinal).ok()?,
                })
            })
            .collect();

        Ok(links)
    }

    /// Append an audit event.
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, entity_id, actor_id, timestamp, kind, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id.to_string(),
                event.entity_id,
                event.actor_id,
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Audit history of one entity, oldest first.
    pub fn events_for(&self, entity_id: &str) -> Result<Vec<AuditEvent>> {
        self.load_events(
            "SELECT id, entity_id, actor_id, timestamp, data FROM events
             WHERE entity_id = ?1 ORDER BY timestamp, rowid",
            params![entity_id],
        )
    }

    /// The most recent events across all entities, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        self.load_events(
            "SELECT id, entity_id, actor_id, timestamp, data FROM events
             ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    fn load_events(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<AuditEvent>> {
        let mut stmt = self.conn.prepare(sql)?;

        let events = stmt
            .query_map(params, |row| {
                let id: String = row.get(0)?;
                let entity_id: String = row.get(1)?;
                let actor_id: String = row.get(2)?;
                let timestamp: String = row.get(3)?;
                let data: String = row.get(4)?;
                Ok((id, entity_id, actor_id, timestamp, data))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, entity_id, actor_id, timestamp, data)| {
                Some(AuditEvent {
                    id: id.parse().ok()?,
                    entity_id,
                    actor_id,
                    timestamp: timestamp.parse().ok()?,
                    kind: serde_json::from_str(&data).ok()?,
                })
            })
            .collect();

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditKind;
    use policy::{chain_links, DevicePolicy, RuleSet};
    use stewardship::{AuthorityBasis, NewGrant, StewardshipGrant};

    fn grant() -> StewardshipGrant {
        StewardshipGrant::create(
            "parent",
            NewGrant {
                subject_id: "kid".into(),
                tier: None,
                authority_basis: AuthorityBasis::MinorGuardianship,
                evidence_hash: Some("sha256:cert".into()),
                verified_by: "registry".into(),
                capabilities: Default::default(),
                delegatable: false,
                expires_in_days: 30,
                review_in_days: 30,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn insert_get_and_list() {
        let store = Store::in_memory().unwrap();
        let g = grant();
        store.insert(&g).unwrap();

        let loaded: StewardshipGrant = store.get(&g.id.to_string()).unwrap().unwrap();
        assert_eq!(loaded, g);
        assert_eq!(store.list_by_subject::<StewardshipGrant>("kid").unwrap().len(), 1);
        assert_eq!(store.list_by_actor::<StewardshipGrant>("parent").unwrap().len(), 1);
        assert!(store.list_by_subject::<StewardshipGrant>("parent").unwrap().is_empty());

        let dup = store.insert(&g);
        assert!(matches!(dup, Err(Error::Conflict { .. })));
    }

    #[test]
    fn update_is_compare_and_swap() {
        let store = Store::in_memory().unwrap();
        let g = grant();
        store.insert(&g).unwrap();

        let mut first = g.clone();
        let mut second = g.clone();
        first.review_interval_days = 60;
        store.update(&mut first).unwrap();
        assert_eq!(first.version, 2);

        second.review_interval_days = 90;
        let err = store.update(&mut second).unwrap_err();
        assert!(matches!(err, Error::Conflict { expected: 1, .. }));
        assert_eq!(second.version, 1);

        let stored: StewardshipGrant = store.get(&g.id.to_string()).unwrap().unwrap();
        assert_eq!(stored.review_interval_days, 60);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn update_of_missing_record_is_not_found() {
        let store = Store::in_memory().unwrap();
        let mut g = grant();
        assert!(matches!(store.update(&mut g), Err(Error::NotFound(_))));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let store = Store::in_memory().unwrap();
        store.insert(&grant()).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO grants (id, subject_id, actor_id, version, updated_at, data)
                 VALUES ('bad', 'kid', 'parent', 1, '', '{not json')",
                [],
            )
            .unwrap();
        assert_eq!(store.list_by_subject::<StewardshipGrant>("kid").unwrap().len(), 1);
    }

    #[test]
    fn atomically_rolls_back_on_error() {
        let store = Store::in_memory().unwrap();
        let g = grant();
        let result: Result<()> = store.atomically(|s| {
            s.insert(&g)?;
            Err(Error::NotFound("forced".into()))
        });
        assert!(result.is_err());
        assert!(store.get::<StewardshipGrant>(&g.id.to_string()).unwrap().is_none());

        store.atomically(|s| s.insert(&g)).unwrap();
        assert!(store.get::<StewardshipGrant>(&g.id.to_string()).unwrap().is_some());
    }

    #[test]
    fn chain_links_are_replaced() {
        let store = Store::in_memory().unwrap();
        let now = Utc::now();
        let layers = vec![
            DevicePolicy::new("kid", "org", Tier::Coordinator, RuleSet::default(), now),
            DevicePolicy::new("kid", "kid", Tier::Personal, RuleSet::default(), now),
        ];
        store.replace_chain_links("kid", &chain_links(&layers)).unwrap();
        store.replace_chain_links("kid", &chain_links(&layers)).unwrap();

        let links = store.chain_links("kid").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].author_tier, Tier::Coordinator);
        assert_eq!(links[1].policy_id, layers[1].id);
    }

    #[test]
    fn audit_events_in_order() {
        let store = Store::in_memory().unwrap();
        let now = Utc::now();
        store
            .append(&AuditEvent::new("g1", "parent", AuditKind::GrantReviewed, now))
            .unwrap();
        store
            .append(&AuditEvent::new(
                "g1",
                "kid",
                AuditKind::AppealFiled { grant_id: "g1".into() },
                now + chrono::Duration::seconds(1),
            ))
            .unwrap();

        let events = store.events_for("g1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AuditKind::GrantReviewed);
        assert_eq!(store.recent_events(1).unwrap()[0].actor_id, "kid");
    }
}
