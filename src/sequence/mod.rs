//! Per-attacker attack history: bounded, time-windowed sequences.

pub mod store;

pub use store::SequenceStore;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patterns::PatternMatch;
use crate::scoring::ThreatLevel;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("time window must be positive")]
    InvalidTimeWindow,
    #[error("sequence capacity must be positive")]
    InvalidCapacity,
}

/// One historical attack from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackRecord {
    pub attack_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_max_len() -> usize {
    10
}

fn default_time_window() -> u64 {
    3600
}

/// The sliding-window history for one source identity.
///
/// The record deque is doubly bounded: at most `max_len` entries, and only
/// entries newer than `last_seen - time_window`. The totals and the
/// per-type histogram are cumulative and never decremented by eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackSequence {
    source_id: String,
    #[serde(default = "default_max_len")]
    max_len: usize,
    #[serde(default = "default_time_window")]
    time_window_secs: u64,
    #[serde(default)]
    records: VecDeque<AttackRecord>,
    #[serde(default)]
    first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    total_attacks: u64,
    #[serde(default)]
    type_counts: HashMap<String, u64>,
}

impl AttackSequence {
    pub fn new(source_id: impl Into<String>, max_len: usize, time_window_secs: u64) -> Self {
        Self {
            source_id: source_id.into(),
            max_len,
            time_window_secs,
            records: VecDeque::with_capacity(max_len),
            first_seen: None,
            last_seen: None,
            total_attacks: 0,
            type_counts: HashMap::new(),
        }
    }

    /// Append a record, then evict everything that fell out of the window
    /// or past the capacity bound.
    pub fn push(&mut self, record: AttackRecord) {
        if self.first_seen.is_none() {
            self.first_seen = Some(record.timestamp);
        }
        // Out-of-order timestamps never move the window backwards.
        self.last_seen = Some(match self.last_seen {
            Some(prev) => prev.max(record.timestamp),
            None => record.timestamp,
        });

        self.total_attacks += 1;
        *self.type_counts.entry(record.attack_type.clone()).or_insert(0) += 1;

        self.records.push_back(record);
        while self.records.len() > self.max_len {
            self.records.pop_front();
        }
        self.evict_expired();
    }

    fn evict_expired(&mut self) {
        let Some(last_seen) = self.last_seen else {
            return;
        };
        let cutoff = last_seen - Duration::seconds(self.time_window_secs as i64);
        while self
            .records
            .front()
            .is_some_and(|r| r.timestamp < cutoff)
        {
            self.records.pop_front();
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &AttackRecord> {
        self.records.iter()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn total_attacks(&self) -> u64 {
        self.total_attacks
    }

    /// Retained attack types, oldest to newest.
    pub fn attack_types(&self) -> Vec<String> {
        self.records.iter().map(|r| r.attack_type.clone()).collect()
    }

    /// Distinct attack types seen from this source, all-time.
    pub fn unique_attack_types(&self) -> usize {
        self.type_counts.len()
    }

    /// Seconds between consecutive retained records.
    pub fn time_deltas(&self) -> Vec<f64> {
        self.records
            .iter()
            .zip(self.records.iter().skip(1))
            .map(|(a, b)| (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }

    /// Snapshot statistics with safe defaults for an empty sequence.
    pub fn stats(&self) -> SequenceStats {
        let mut stats = SequenceStats {
            source_id: self.source_id.clone(),
            sequence_length: self.records.len(),
            total_attacks: self.total_attacks,
            duration_seconds: 0.0,
            attack_rate: 0.0,
            unique_attack_types: self.type_counts.len(),
            attack_distribution: self.type_counts.clone(),
            recent_sequence: self
                .records
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|r| r.attack_type.clone())
                .collect(),
            first_seen: None,
            last_seen: None,
        };

        if self.records.is_empty() {
            return stats;
        }
        let (Some(first), Some(last)) = (self.first_seen, self.last_seen) else {
            return stats;
        };

        let duration = (last - first).num_milliseconds() as f64 / 1000.0;
        stats.duration_seconds = duration;
        stats.attack_rate = self.records.len() as f64 / duration.max(1.0);
        stats.first_seen = Some(first);
        stats.last_seen = Some(last);
        stats
    }
}

/// Point-in-time statistics for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStats {
    pub source_id: String,
    pub sequence_length: usize,
    pub total_attacks: u64,
    pub duration_seconds: f64,
    pub attack_rate: f64,
    pub unique_attack_types: usize,
    pub attack_distribution: HashMap<String, u64>,
    pub recent_sequence: Vec<String>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// The full per-event analysis of a source's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceAnalysis {
    pub source_id: String,
    pub sequence_length: usize,
    pub statistics: SequenceStats,
    pub patterns_detected: Vec<PatternMatch>,
    pub threat_level: ThreatLevel,
    pub behavioral_score: f64,
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(attack_type: &str, at: i64) -> AttackRecord {
        AttackRecord {
            attack_type: attack_type.to_string(),
            timestamp: ts(at),
            service: Some("ssh".to_string()),
            port: Some(2222),
        }
    }

    #[test]
    fn test_capacity_bound() {
        let mut seq = AttackSequence::new("10.0.0.1", 3, 3600);
        for i in 0..5 {
            seq.push(record("BRUTE_FORCE", i));
        }
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.total_attacks(), 5);
    }

    #[test]
    fn test_window_eviction_invariant() {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 60);
        seq.push(record("PORT_SCAN", 0));
        seq.push(record("BRUTE_FORCE", 30));
        seq.push(record("BRUTE_FORCE", 100));

        // The first record is older than last_seen - 60s.
        assert_eq!(seq.len(), 2);
        let cutoff = seq.last_seen().unwrap() - Duration::seconds(60);
        assert!(seq.records().all(|r| r.timestamp >= cutoff));

        // Counters are monotonic despite eviction.
        assert_eq!(seq.total_attacks(), 3);
        assert!(seq.total_attacks() >= seq.len() as u64);
    }

    #[test]
    fn test_out_of_order_timestamp_keeps_window() {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 60);
        seq.push(record("PORT_SCAN", 100));
        seq.push(record("BRUTE_FORCE", 50)); // clock skew

        assert_eq!(seq.last_seen(), Some(ts(100)));
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_stats_empty_sequence_defaults() {
        let seq = AttackSequence::new("10.0.0.1", 10, 3600);
        let stats = seq.stats();
        assert_eq!(stats.sequence_length, 0);
        assert_eq!(stats.duration_seconds, 0.0);
        assert_eq!(stats.attack_rate, 0.0);
        assert!(stats.first_seen.is_none());
    }

    #[test]
    fn test_stats_rate_and_recent() {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 3600);
        for (i, t) in ["PORT_SCAN", "BRUTE_FORCE", "BRUTE_FORCE", "DOS", "DOS", "WEB_ATTACK"]
            .iter()
            .enumerate()
        {
            seq.push(record(t, i as i64 * 10));
        }

        let stats = seq.stats();
        assert_eq!(stats.sequence_length, 6);
        assert_eq!(stats.duration_seconds, 50.0);
        assert!((stats.attack_rate - 6.0 / 50.0).abs() < 1e-9);
        assert_eq!(stats.unique_attack_types, 4);
        assert_eq!(stats.recent_sequence.len(), 5);
        assert_eq!(stats.recent_sequence[0], "BRUTE_FORCE");
        assert_eq!(stats.recent_sequence[4], "WEB_ATTACK");
    }

    #[test]
    fn test_time_deltas() {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 3600);
        seq.push(record("PORT_SCAN", 0));
        assert!(seq.time_deltas().is_empty());

        seq.push(record("BRUTE_FORCE", 15));
        seq.push(record("BRUTE_FORCE", 45));
        assert_eq!(seq.time_deltas(), vec![15.0, 30.0]);
    }

    #[test]
    fn test_snapshot_roundtrip_with_schema_drift() {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 3600);
        seq.push(record("PORT_SCAN", 0));
        seq.push(record("BRUTE_FORCE", 5));

        // Unknown fields are ignored, missing optional fields defaulted.
        let mut value = serde_json::to_value(&seq).unwrap();
        value["future_field"] = serde_json::json!({"nested": true});
        value.as_object_mut().unwrap().remove("type_counts");

        let restored: AttackSequence = serde_json::from_value(value).unwrap();
        assert_eq!(restored.source_id(), "10.0.0.1");
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.unique_attack_types(), 0); // defaulted away
    }
}
