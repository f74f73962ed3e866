//! Behavioral threat scoring for attack sequences.
//!
//! The score is a weighted sum of four signals, each bounded to [0,1]
//! before weighting: sequence length (0.3), attack-type diversity (0.2),
//! attack rate (0.3), and presence of critical attack classes (0.2).

use serde::{Deserialize, Serialize};

use crate::knowledge::Severity;
use crate::patterns::PatternMatch;
use crate::sequence::AttackSequence;

/// Attack classes that weight the criticality signal.
pub const CRITICAL_ATTACK_TYPES: [&str; 4] = ["INFILTRATION", "BOTNET", "DDOS", "HEARTBLEED"];

/// Overall threat level for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Behavioral threat score in [0,1].
pub fn behavioral_score(sequence: &AttackSequence) -> f64 {
    let len = sequence.len();
    let mut score = 0.0;

    // Longer sequences are more suspicious.
    score += (len as f64 / 10.0).min(1.0) * 0.3;

    // More attack types means a more sophisticated attacker.
    score += (sequence.unique_attack_types() as f64 / 5.0).min(1.0) * 0.2;

    // Fast attacks (under a minute apart) are machine-driven.
    let deltas = sequence.time_deltas();
    if !deltas.is_empty() {
        let mean_gap = deltas.iter().sum::<f64>() / deltas.len() as f64;
        score += (1.0 - mean_gap / 60.0).max(0.0) * 0.3;
    }

    // Fraction of retained records with a critical attack class.
    if len > 0 {
        let critical = sequence
            .records()
            .filter(|r| CRITICAL_ATTACK_TYPES.contains(&r.attack_type.as_str()))
            .count();
        score += critical as f64 / len as f64 * 0.2;
    }

    score.min(1.0)
}

/// Derive the threat level from the score, matched patterns, and the
/// sequence itself. A matched pattern's severity is a floor on the level;
/// a CRITICAL pattern always forces CRITICAL regardless of score.
pub fn threat_level(
    sequence: &AttackSequence,
    patterns: &[PatternMatch],
    score: f64,
) -> ThreatLevel {
    let pattern_floor = patterns
        .iter()
        .map(|p| match p.severity {
            Severity::Critical => ThreatLevel::Critical,
            Severity::High => ThreatLevel::High,
            Severity::Medium => ThreatLevel::Medium,
            Severity::Low | Severity::Info => ThreatLevel::Low,
        })
        .max()
        .unwrap_or(ThreatLevel::Low);

    let scored = if score > 0.8 {
        ThreatLevel::Critical
    } else if score > 0.6 {
        ThreatLevel::High
    } else if score > 0.4 {
        ThreatLevel::Medium
    } else if sequence.len() >= 5 {
        // Length-based floor for slow-and-steady attackers.
        ThreatLevel::High
    } else if sequence.len() >= 3 {
        ThreatLevel::Medium
    } else {
        ThreatLevel::Low
    };

    scored.max(pattern_floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::AttackRecord;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sequence_of(entries: &[(&str, i64)]) -> AttackSequence {
        let mut seq = AttackSequence::new("10.0.0.1", 10, 3600);
        for (attack_type, at) in entries {
            seq.push(AttackRecord {
                attack_type: attack_type.to_string(),
                timestamp: ts(*at),
                service: None,
                port: None,
            });
        }
        seq
    }

    #[test]
    fn test_single_record_score_bounded() {
        // One non-critical attack: only length and diversity signals apply,
        // the rate signal needs two records.
        let seq = sequence_of(&[("BRUTE_FORCE", 0)]);
        let score = behavioral_score(&seq);

        let expected = 0.1 * 0.3 + 0.2 * 0.2;
        assert!((score - expected).abs() < 1e-9);
        assert!(score <= 0.5);
    }

    #[test]
    fn test_rapid_attacks_raise_rate_signal() {
        let slow = sequence_of(&[("BRUTE_FORCE", 0), ("BRUTE_FORCE", 300)]);
        let fast = sequence_of(&[("BRUTE_FORCE", 0), ("BRUTE_FORCE", 1)]);

        assert!(behavioral_score(&fast) > behavioral_score(&slow));
    }

    #[test]
    fn test_critical_types_raise_score() {
        let plain = sequence_of(&[("BRUTE_FORCE", 0), ("BRUTE_FORCE", 10)]);
        let critical = sequence_of(&[("INFILTRATION", 0), ("BOTNET", 10)]);

        assert!(behavioral_score(&critical) > behavioral_score(&plain));
    }

    #[test]
    fn test_score_clamped_to_one() {
        // Max out every signal: long, diverse, fast, all critical.
        let seq = sequence_of(&[
            ("INFILTRATION", 0),
            ("BOTNET", 1),
            ("DDOS", 2),
            ("HEARTBLEED", 3),
            ("INFILTRATION", 4),
            ("BOTNET", 5),
            ("DDOS", 6),
            ("HEARTBLEED", 7),
            ("INFILTRATION", 8),
            ("BOTNET", 9),
        ]);
        let score = behavioral_score(&seq);
        assert!(score <= 1.0);
        assert!(score > 0.9);
    }

    #[test]
    fn test_critical_pattern_forces_critical_level() {
        let seq = sequence_of(&[("DOS", 0), ("DDOS", 1)]);
        let matched = vec![PatternMatch {
            name: "distributed_attack".to_string(),
            description: String::new(),
            severity: Severity::Critical,
            kill_chain: vec![],
        }];

        assert_eq!(threat_level(&seq, &matched, 0.1), ThreatLevel::Critical);
    }

    #[test]
    fn test_high_pattern_floors_level() {
        let seq = sequence_of(&[("PORT_SCAN", 0), ("BRUTE_FORCE", 1)]);
        let matched = vec![PatternMatch {
            name: "reconnaissance_to_attack".to_string(),
            description: String::new(),
            severity: Severity::High,
            kill_chain: vec![],
        }];

        // The score alone would only reach MEDIUM.
        assert_eq!(threat_level(&seq, &matched, 0.45), ThreatLevel::High);
        // A strong score is not pulled down by the floor.
        assert_eq!(threat_level(&seq, &matched, 0.9), ThreatLevel::Critical);
    }

    #[test]
    fn test_score_thresholds() {
        let seq = sequence_of(&[("BRUTE_FORCE", 0)]);
        assert_eq!(threat_level(&seq, &[], 0.9), ThreatLevel::Critical);
        assert_eq!(threat_level(&seq, &[], 0.7), ThreatLevel::High);
        assert_eq!(threat_level(&seq, &[], 0.5), ThreatLevel::Medium);
        assert_eq!(threat_level(&seq, &[], 0.1), ThreatLevel::Low);
    }

    #[test]
    fn test_length_floor_overrides_low_score() {
        let five = sequence_of(&[
            ("PORT_SCAN", 0),
            ("PORT_SCAN", 600),
            ("PORT_SCAN", 1200),
            ("PORT_SCAN", 1800),
            ("PORT_SCAN", 2400),
        ]);
        assert_eq!(threat_level(&five, &[], 0.2), ThreatLevel::High);

        let three = sequence_of(&[
            ("PORT_SCAN", 0),
            ("PORT_SCAN", 600),
            ("PORT_SCAN", 1200),
        ]);
        assert_eq!(threat_level(&three, &[], 0.2), ThreatLevel::Medium);
    }
}
