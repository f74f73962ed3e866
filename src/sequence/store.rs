//! The sequence store: the only mutable shared state in the engine.
//!
//! A coarse `RwLock` over the source map is enough at honeypot traffic
//! volumes (tens of events per second). Readers for reporting clone a
//! point-in-time snapshot and never hold the lock across analysis; the
//! sweep takes the write lock once per removed source so it cannot starve
//! ingestion.
//!
//! Every mutation persists the full map as one versioned snapshot blob
//! (optionally batched). Persistence failures degrade to in-memory
//! operation: logged, never fatal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sequence::{AttackRecord, AttackSequence, SequenceError};
use crate::storage::{self, Pool};

/// Version tag written into every persisted snapshot.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateSnapshot {
    schema_version: u32,
    #[serde(default)]
    sequences: HashMap<String, AttackSequence>,
}

pub struct SequenceStore {
    inner: RwLock<HashMap<String, AttackSequence>>,
    max_len: usize,
    time_window_secs: u64,
    max_sources: usize,
    persist_every: u64,
    mutations: AtomicU64,
    pool: Option<Pool>,
}

impl SequenceStore {
    /// Create a store, restoring any persisted snapshot and immediately
    /// sweeping stale sequences out of it.
    pub fn new(
        max_len: usize,
        time_window_secs: u64,
        max_sources: usize,
        persist_every: u64,
        pool: Option<Pool>,
    ) -> Result<Self, SequenceError> {
        if time_window_secs == 0 {
            return Err(SequenceError::InvalidTimeWindow);
        }
        if max_len == 0 || max_sources == 0 {
            return Err(SequenceError::InvalidCapacity);
        }

        let store = Self {
            inner: RwLock::new(HashMap::new()),
            max_len,
            time_window_secs,
            max_sources,
            persist_every: persist_every.max(1),
            mutations: AtomicU64::new(0),
            pool,
        };
        store.restore();
        Ok(store)
    }

    fn restore(&self) {
        let Some(pool) = &self.pool else {
            return;
        };

        let loaded = match storage::load_sequence_snapshot(pool) {
            Ok(Some((version, json))) => {
                if version != SNAPSHOT_SCHEMA_VERSION {
                    warn!(
                        found = version,
                        expected = SNAPSHOT_SCHEMA_VERSION,
                        "sequence snapshot has a different schema version, loading anyway"
                    );
                }
                match serde_json::from_str::<StateSnapshot>(&json) {
                    Ok(snapshot) => snapshot.sequences,
                    Err(e) => {
                        warn!(error = %e, "sequence snapshot unparseable, starting empty");
                        return;
                    }
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read sequence snapshot, starting empty");
                return;
            }
        };

        let count = loaded.len();
        *self.write() = loaded;

        // Pre-crash sequences past the retention horizon must not revive
        // as active attackers.
        let removed = self.sweep(Utc::now());
        info!(
            restored = count - removed,
            swept = removed,
            "restored sequence store from snapshot"
        );
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AttackSequence>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AttackSequence>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one attack and return a snapshot of the updated sequence.
    pub fn record(
        &self,
        source_id: &str,
        attack_type: &str,
        timestamp: DateTime<Utc>,
        service: Option<String>,
        port: Option<u16>,
    ) -> AttackSequence {
        let snapshot = {
            let mut map = self.write();

            if !map.contains_key(source_id) && map.len() >= self.max_sources {
                self.evict_stalest(&mut map);
            }

            let sequence = map.entry(source_id.to_string()).or_insert_with(|| {
                debug!(source = source_id, "tracking new source");
                AttackSequence::new(source_id, self.max_len, self.time_window_secs)
            });

            sequence.push(AttackRecord {
                attack_type: attack_type.to_string(),
                timestamp,
                service,
                port,
            });
            sequence.clone()
        };

        self.persist_maybe();
        snapshot
    }

    /// Source-cap pressure valve: drop the sequence that has been quiet
    /// the longest.
    fn evict_stalest(&self, map: &mut HashMap<String, AttackSequence>) {
        let stalest = map
            .iter()
            .min_by_key(|(_, seq)| seq.last_seen())
            .map(|(k, _)| k.clone());
        if let Some(key) = stalest {
            warn!(
                source = %key,
                max_sources = self.max_sources,
                "source cap reached, evicting stalest sequence"
            );
            map.remove(&key);
        }
    }

    pub fn get(&self, source_id: &str) -> Option<AttackSequence> {
        self.read().get(source_id).cloned()
    }

    /// Remove sequences quiet for more than twice the time window.
    /// Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(2 * self.time_window_secs as i64);

        let stale: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, seq)| seq.last_seen().map_or(true, |ls| ls < cutoff))
            .map(|(k, _)| k.clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            // Lock per source: re-check under the write lock, since an
            // attack may have arrived since the scan.
            let mut map = self.write();
            if map
                .get(&key)
                .is_some_and(|seq| seq.last_seen().map_or(true, |ls| ls < cutoff))
            {
                map.remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "swept stale sequences");
            self.persist();
        }
        removed
    }

    /// Point-in-time copy of every active sequence.
    pub fn snapshot_all(&self) -> HashMap<String, AttackSequence> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop all history and persist the empty state.
    pub fn clear(&self) {
        self.write().clear();
        self.persist();
    }

    fn persist_maybe(&self) {
        let n = self.mutations.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.persist_every == 0 {
            self.persist();
        }
    }

    fn persist(&self) {
        let Some(pool) = &self.pool else {
            return;
        };

        let snapshot = StateSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            sequences: self.read().clone(),
        };

        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize sequence snapshot");
                return;
            }
        };

        if let Err(e) = storage::save_sequence_snapshot(pool, SNAPSHOT_SCHEMA_VERSION, &json) {
            warn!(error = %e, "failed to persist sequence snapshot, continuing in-memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn memory_store() -> SequenceStore {
        SequenceStore::new(10, 3600, 10_000, 1, None).unwrap()
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(matches!(
            SequenceStore::new(10, 0, 100, 1, None),
            Err(SequenceError::InvalidTimeWindow)
        ));
        assert!(matches!(
            SequenceStore::new(0, 3600, 100, 1, None),
            Err(SequenceError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_record_and_get() {
        let store = memory_store();

        let snap = store.record("10.0.0.5", "PORT_SCAN", ts(0), Some("ssh".into()), Some(22));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.total_attacks(), 1);

        let snap = store.record("10.0.0.5", "BRUTE_FORCE", ts(1), None, None);
        assert_eq!(snap.len(), 2);
        assert_eq!(
            snap.attack_types(),
            vec!["PORT_SCAN".to_string(), "BRUTE_FORCE".to_string()]
        );

        let fetched = store.get("10.0.0.5").unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(store.get("192.168.0.1").is_none());
    }

    #[test]
    fn test_eviction_invariant_after_record() {
        let store = SequenceStore::new(10, 60, 100, 1, None).unwrap();

        store.record("a", "PORT_SCAN", ts(0), None, None);
        store.record("a", "BRUTE_FORCE", ts(120), None, None);

        let seq = store.get("a").unwrap();
        let cutoff = seq.last_seen().unwrap() - Duration::seconds(60);
        assert!(seq.records().all(|r| r.timestamp >= cutoff));
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.total_attacks(), 2);
    }

    #[test]
    fn test_sweep_removes_only_stale() {
        let store = SequenceStore::new(10, 3600, 100, 1, None).unwrap();

        store.record("old", "PORT_SCAN", ts(0), None, None);
        store.record("fresh", "PORT_SCAN", ts(7000), None, None);

        // "old" is 7200s+ behind `now`; "fresh" is inside 2x window.
        let removed = store.sweep(ts(7300));
        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
        assert!(!store.snapshot_all().contains_key("old"));
    }

    #[test]
    fn test_source_cap_evicts_stalest() {
        let store = SequenceStore::new(10, 3600, 3, 1, None).unwrap();

        store.record("a", "PORT_SCAN", ts(0), None, None);
        store.record("b", "PORT_SCAN", ts(10), None, None);
        store.record("c", "PORT_SCAN", ts(20), None, None);
        store.record("d", "PORT_SCAN", ts(30), None, None);

        assert_eq!(store.len(), 3);
        assert!(store.get("a").is_none());
        assert!(store.get("d").is_some());
    }

    #[test]
    fn test_snapshot_roundtrip_through_pool() {
        let pool = crate::storage::open_memory_pool().unwrap();

        {
            let store =
                SequenceStore::new(10, 3600, 100, 1, Some(pool.clone())).unwrap();
            let now = Utc::now();
            store.record("10.0.0.5", "PORT_SCAN", now, Some("ssh".into()), Some(22));
            store.record("10.0.0.5", "BRUTE_FORCE", now, None, None);
            store.record("10.0.0.9", "DOS", now, None, None);
        }

        let restored = SequenceStore::new(10, 3600, 100, 1, Some(pool)).unwrap();
        assert_eq!(restored.len(), 2);

        let seq = restored.get("10.0.0.5").unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.total_attacks(), 2);
        assert_eq!(
            seq.attack_types(),
            vec!["PORT_SCAN".to_string(), "BRUTE_FORCE".to_string()]
        );
    }

    #[test]
    fn test_stale_sequences_swept_at_load() {
        let pool = crate::storage::open_memory_pool().unwrap();

        {
            let store =
                SequenceStore::new(10, 3600, 100, 1, Some(pool.clone())).unwrap();
            // ts() is far in the past relative to the wall clock.
            store.record("ancient", "PORT_SCAN", ts(0), None, None);
        }

        let restored = SequenceStore::new(10, 3600, 100, 1, Some(pool)).unwrap();
        assert!(restored.is_empty());
        assert!(restored.get("ancient").is_none());
    }

    #[test]
    fn test_persist_batching() {
        let pool = crate::storage::open_memory_pool().unwrap();
        let store = SequenceStore::new(10, 3600, 100, 3, Some(pool.clone())).unwrap();
        let now = Utc::now();

        store.record("a", "PORT_SCAN", now, None, None);
        store.record("a", "PORT_SCAN", now, None, None);
        assert!(storage::load_sequence_snapshot(&pool).unwrap().is_none());

        // Third mutation crosses the batch boundary.
        store.record("a", "PORT_SCAN", now, None, None);
        let (_, json) = storage::load_sequence_snapshot(&pool).unwrap().unwrap();
        assert!(json.contains("\"a\""));
    }

    #[test]
    fn test_clear_persists_empty_state() {
        let pool = crate::storage::open_memory_pool().unwrap();
        let store = SequenceStore::new(10, 3600, 100, 1, Some(pool.clone())).unwrap();

        store.record("a", "PORT_SCAN", Utc::now(), None, None);
        store.clear();
        assert!(store.is_empty());

        let restored = SequenceStore::new(10, 3600, 100, 1, Some(pool)).unwrap();
        assert!(restored.is_empty());
    }
}
