//! Campaign-level reporting: the cross-source view of everything the
//! sequence store is currently tracking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patterns::{self, PatternDefinition};
use crate::scoring;
use crate::sequence::{AttackSequence, SequenceStats};

/// One ranked attacker in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackerSummary {
    pub threat_score: f64,
    #[serde(flatten)]
    pub statistics: SequenceStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternOccurrence {
    pub pattern: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub generated_at: DateTime<Utc>,
    pub active_attacker_count: usize,
    pub top_attackers: Vec<AttackerSummary>,
    pub patterns_detected: Vec<PatternOccurrence>,
    pub recommendations: Vec<String>,
}

/// Build a report from a point-in-time snapshot of the store.
pub fn generate(
    snapshot: &HashMap<String, AttackSequence>,
    library: &[PatternDefinition],
    top_n: usize,
) -> CampaignReport {
    let mut attackers: Vec<AttackerSummary> = Vec::with_capacity(snapshot.len());
    let mut pattern_counts: HashMap<String, usize> = HashMap::new();

    for sequence in snapshot.values() {
        attackers.push(AttackerSummary {
            threat_score: scoring::behavioral_score(sequence),
            statistics: sequence.stats(),
        });

        for matched in patterns::find_matches(&sequence.attack_types(), library) {
            *pattern_counts.entry(matched.name).or_insert(0) += 1;
        }
    }

    // Highest score first; source id as the deterministic tie-break.
    attackers.sort_by(|a, b| {
        b.threat_score
            .partial_cmp(&a.threat_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.statistics.source_id.cmp(&b.statistics.source_id))
    });
    attackers.truncate(top_n);

    let mut patterns_detected: Vec<PatternOccurrence> = pattern_counts
        .into_iter()
        .map(|(pattern, occurrences)| PatternOccurrence {
            pattern,
            occurrences,
        })
        .collect();
    patterns_detected.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });

    let mut recommendations = Vec::new();
    if snapshot.len() > 10 {
        recommendations
            .push("ALERT: High number of active attackers - possible coordinated attack".to_string());
    }
    if !patterns_detected.is_empty() {
        recommendations
            .push("Multiple attack patterns detected - review security posture".to_string());
    }

    CampaignReport {
        generated_at: Utc::now(),
        active_attacker_count: snapshot.len(),
        top_attackers: attackers,
        patterns_detected,
        recommendations,
    }
}

/// Render a report as console text for the `report` subcommand.
pub fn render_text(report: &CampaignReport) -> String {
    let mut lines = Vec::new();

    lines.push("=== TrapTriage Campaign Report ===".to_string());
    lines.push(format!("Generated:        {}", report.generated_at.to_rfc3339()));
    lines.push(format!("Active attackers: {}", report.active_attacker_count));

    if !report.top_attackers.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{:<20} | {:<7} | {:<8} | Recent sequence",
            "Source", "Score", "Attacks"
        ));
        lines.push(format!("{:-<20}-|-{:-<7}-|-{:-<8}-|-{:-<30}", "", "", "", ""));
        for attacker in &report.top_attackers {
            lines.push(format!(
                "{:<20} | {:<7.2} | {:<8} | {}",
                attacker.statistics.source_id,
                attacker.threat_score,
                attacker.statistics.total_attacks,
                attacker.statistics.recent_sequence.join(" -> ")
            ));
        }
    }

    if !report.patterns_detected.is_empty() {
        lines.push(String::new());
        lines.push("Attack patterns:".to_string());
        for occ in &report.patterns_detected {
            lines.push(format!("  {:<30} x{}", occ.pattern, occ.occurrences));
        }
    }

    if !report.recommendations.is_empty() {
        lines.push(String::new());
        lines.push("Recommendations:".to_string());
        for rec in &report.recommendations {
            lines.push(format!("  - {rec}"));
        }
    }

    lines.join("\n")
}
