//! TTL cache for merged agents.
//!
//! Keyed by the requested leaf id. Entries are immutable once built, so
//! concurrent writers for one key race to publish equivalent values and the
//! last one wins. Staleness is judged by age at read time; stale entries are
//! dropped on the read that finds them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use toolrelay_core::agent::MergedAgent;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CacheEntry {
    agent: Arc<MergedAgent>,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct AgentCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub ttl_secs: u64,
    pub entries: Vec<CacheEntryStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryStats {
    pub agent_id: String,
    pub agent_name: String,
    pub age_secs: u64,
}

impl Default for AgentCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl AgentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<MergedAgent>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(agent_id) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.agent.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check: another request may have refreshed it meanwhile.
        if let Some(entry) = entries.get(agent_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.agent.clone());
            }
            entries.remove(agent_id);
            debug!(agent_id, "Evicted stale agent cache entry");
        }
        None
    }

    pub fn insert(&self, agent_id: impl Into<String>, agent: Arc<MergedAgent>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            agent_id.into(),
            CacheEntry {
                agent,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, agent_id: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id)
            .is_some();
        debug!(agent_id, removed, "Invalidated agent cache entry");
        removed
    }

    /// Drop everything. Returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<CacheEntryStats> = entries
            .iter()
            .map(|(id, entry)| CacheEntryStats {
                agent_id: id.clone(),
                agent_name: entry.agent.name().to_string(),
                age_secs: entry.inserted_at.elapsed().as_secs(),
            })
            .collect();
        list.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        CacheStats {
            size: list.len(),
            ttl_secs: self.ttl.as_secs(),
            entries: list,
        }
    }
}
