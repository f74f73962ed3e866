//! Attack-framework mapping: attack type + detector confidence in, a
//! risk-scored ATT&CK mapping out. Pure derivation over the knowledge
//! base; recomputed for every event, never stored.

use serde::{Deserialize, Serialize};

use crate::knowledge::{KnowledgeBase, Severity, Technique};

/// A classified attack mapped onto the framework taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitreMapping {
    pub attack_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub tactics: Vec<String>,
    pub techniques: Vec<Technique>,
    pub severity: Severity,
    pub priority: String,
    pub response_time: String,
    /// Severity base score scaled by detector confidence, in [0,5].
    pub risk_score: f64,
    pub description: String,
    pub mitigation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_chain_phase: Option<String>,
}

/// Map an attack type (any case) to its framework entry. Unknown types
/// resolve through the reserved `UNKNOWN_THREAT` entry; this never fails.
pub fn map_attack(kb: &KnowledgeBase, attack_type: &str, confidence: Option<f64>) -> MitreMapping {
    let normalized = attack_type.to_uppercase();
    let (canonical, mapping) = kb.mapping_for(&normalized);
    let severity_info = kb.severity_info(mapping.severity);

    let base = severity_info.score;
    let raw = match confidence {
        Some(c) => base * c,
        None => base,
    };
    let risk_score = ((raw * 100.0).round() / 100.0).clamp(0.0, 5.0);

    MitreMapping {
        attack_type: canonical.to_string(),
        confidence,
        tactics: mapping.tactics.clone(),
        techniques: mapping.techniques.clone(),
        severity: mapping.severity,
        priority: severity_info.priority,
        response_time: severity_info.response_time,
        risk_score,
        description: mapping.description.clone(),
        mitigation: mapping.mitigation.clone(),
        kill_chain_phase: kb.kill_chain_phase(&mapping.tactics).map(str::to_string),
    }
}

/// Render a mapping as console text for the `map` subcommand.
pub fn render_text(mapping: &MitreMapping) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Attack Type:   {}", mapping.attack_type));
    lines.push(format!(
        "Severity:      {} (Risk: {}/5.0)",
        mapping.severity, mapping.risk_score
    ));
    if let Some(confidence) = mapping.confidence {
        lines.push(format!("Confidence:    {:.1}%", confidence * 100.0));
    }
    lines.push(format!("Priority:      {}", mapping.priority));
    lines.push(format!("Response Time: {}", mapping.response_time));

    if !mapping.tactics.is_empty() {
        lines.push(format!("Tactics:       {}", mapping.tactics.join(", ")));
    }
    for technique in &mapping.techniques {
        lines.push(format!("Technique:     {}: {}", technique.id, technique.name));
        for sub in &technique.sub_techniques {
            lines.push(format!("                 -> {}: {}", sub.id, sub.name));
        }
    }
    if let Some(phase) = &mapping.kill_chain_phase {
        lines.push(format!("Kill Chain:    {}", phase));
    }
    if !mapping.description.is_empty() {
        lines.push(format!("Description:   {}", mapping.description));
    }
    if !mapping.mitigation.is_empty() {
        lines.push(format!("Mitigation:    {}", mapping.mitigation));
    }

    lines.join("\n")
}
