//! Memoized policy resolution.
//!
//! A subject's [`ComputedPolicy`] is cached together with the
//! [`ChainVersion`] it was folded from. Every resolve re-fetches the chain;
//! the fold runs again only when the version differs. A failed fetch never
//! touches the memo: the last good policy is served instead, if there is one.

use crate::{ChainSource, Result};
use chrono::{DateTime, Utc};
use policy::{ChainVersion, ComputedPolicy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use stewardship::Limits;

type Key = (String, Option<String>);

struct Memo {
    version: ChainVersion,
    policy: Arc<ComputedPolicy>,
}

#[derive(Default)]
pub struct Resolver {
    memo: Mutex<HashMap<Key, Memo>>,
}

fn key(subject_id: &str, device_id: Option<&str>) -> Key {
    (subject_id.to_string(), device_id.map(str::to_string))
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<Key, Memo>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resolve(
        &self,
        source: &impl ChainSource,
        subject_id: &str,
        device_id: Option<&str>,
        limits: &Limits,
        now: DateTime<Utc>,
    ) -> Result<Arc<ComputedPolicy>> {
        let chain = match source.fetch_chain(subject_id, device_id, limits, now) {
            Ok(chain) => chain,
            Err(e) => {
                if let Some(stale) = self.cached(subject_id, device_id) {
                    tracing::warn!(subject = subject_id, error = %e, "chain fetch failed; serving cached policy");
                    return Ok(stale);
                }
                return Err(e);
            }
        };

        let version = chain.version();
        let key = key(subject_id, device_id);
        if let Some(hit) = self.memo().get(&key).filter(|m| m.version == version) {
            return Ok(Arc::clone(&hit.policy));
        }

        let mut computed = ComputedPolicy::fold(subject_id, &chain.layers);
        computed.chain_version = version.clone();
        let policy = Arc::new(computed);
        tracing::debug!(subject = subject_id, layers = chain.layers.len(), "folded policy chain");
        self.memo().insert(
            key,
            Memo {
                version,
                policy: Arc::clone(&policy),
            },
        );
        Ok(policy)
    }

    pub fn cached(&self, subject_id: &str, device_id: Option<&str>) -> Option<Arc<ComputedPolicy>> {
        self.memo()
            .get(&key(subject_id, device_id))
            .map(|m| Arc::clone(&m.policy))
    }

    /// Forget every cached policy for `subject_id`.
    pub fn invalidate(&self, subject_id: &str) {
        self.memo().retain(|(subject, _), _| subject != subject_id);
    }
}
