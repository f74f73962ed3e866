//! Static attack-knowledge base: taxonomy, severity table, kill-chain
//! phases, and the multi-stage pattern library.
//!
//! Loaded once at startup. A missing or malformed knowledge file is never
//! fatal: the loader logs a warning and falls back to the embedded matrix,
//! which covers every attack class the detectors can emit.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::patterns::PatternDefinition;

// Embedded default matrix for fallback.
const DEFAULT_MATRIX_JSON: &str = include_str!("matrix.json");

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("attack matrix is missing the required '{0}' entry")]
    MissingEntry(&'static str),
    #[error("attack type '{attack_type}' references undefined severity {severity:?}")]
    UndefinedSeverity {
        attack_type: String,
        severity: Severity,
    },
}

/// Severity levels, ordered least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// One attack class and its framework mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackMapping {
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub techniques: Vec<Technique>,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technique {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_techniques: Vec<SubTechnique>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTechnique {
    pub id: String,
    pub name: String,
}

/// Operational handling attached to a severity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityInfo {
    pub score: f64,
    pub priority: String,
    pub response_time: String,
}

/// One kill-chain phase and the tactics that place an attack in it.
/// Phase order in the table is the tie-break when several phases match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillChainPhase {
    pub phase: String,
    pub related_tactics: Vec<String>,
}

/// The full knowledge base, read-only after load.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBase {
    attack_mappings: HashMap<String, AttackMapping>,
    severity_levels: HashMap<Severity, SeverityInfo>,
    #[serde(default)]
    kill_chain: Vec<KillChainPhase>,
    #[serde(default)]
    attack_patterns: Vec<PatternDefinition>,
}

impl KnowledgeBase {
    /// Load the knowledge base from `path`, or the embedded matrix when no
    /// path is given or the file cannot be used. Never fails.
    pub fn load(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match Self::from_file(path) {
                Ok(kb) => {
                    info!(
                        path = %path.display(),
                        attack_types = kb.attack_mappings.len(),
                        patterns = kb.attack_patterns.len(),
                        "loaded attack matrix"
                    );
                    return kb;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "attack matrix unusable, falling back to embedded matrix"
                    );
                }
            }
        }
        Self::embedded()
    }

    /// The compiled-in matrix.
    pub fn embedded() -> Self {
        let kb: Self =
            serde_json::from_str(DEFAULT_MATRIX_JSON).expect("embedded attack matrix is invalid JSON");
        kb.validate().expect("embedded attack matrix is incomplete");
        kb
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let kb: Self = serde_json::from_str(&content)?;
        kb.validate()?;
        Ok(kb)
    }

    /// Structural checks beyond what serde enforces: the two reserved
    /// entries must exist, and every referenced severity must be defined.
    fn validate(&self) -> Result<(), KnowledgeError> {
        for required in [crate::fusion::NORMAL, crate::fusion::UNKNOWN_THREAT] {
            if !self.attack_mappings.contains_key(required) {
                return Err(KnowledgeError::MissingEntry(required));
            }
        }
        for (attack_type, mapping) in &self.attack_mappings {
            if !self.severity_levels.contains_key(&mapping.severity) {
                return Err(KnowledgeError::UndefinedSeverity {
                    attack_type: attack_type.clone(),
                    severity: mapping.severity,
                });
            }
        }
        Ok(())
    }

    /// Resolve an attack type (already case-normalized) to its mapping.
    /// Unknown types resolve to the reserved `UNKNOWN_THREAT` entry; the
    /// returned string is the canonical type actually used.
    pub fn mapping_for<'a>(&'a self, attack_type: &'a str) -> (&'a str, &'a AttackMapping) {
        if let Some(mapping) = self.attack_mappings.get(attack_type) {
            return (attack_type, mapping);
        }
        warn!(attack_type, "unknown attack type, mapping as UNKNOWN_THREAT");
        let fallback = &self.attack_mappings[crate::fusion::UNKNOWN_THREAT];
        (crate::fusion::UNKNOWN_THREAT, fallback)
    }

    /// Operational info for a severity level. Validation guarantees the
    /// entry exists for any severity reachable through `mapping_for`.
    pub fn severity_info(&self, severity: Severity) -> SeverityInfo {
        self.severity_levels.get(&severity).cloned().unwrap_or(SeverityInfo {
            score: 3.0,
            priority: "P2".to_string(),
            response_time: "4 hours".to_string(),
        })
    }

    /// First kill-chain phase (table order) whose tactics intersect `tactics`.
    pub fn kill_chain_phase(&self, tactics: &[String]) -> Option<&str> {
        self.kill_chain
            .iter()
            .find(|p| p.related_tactics.iter().any(|t| tactics.contains(t)))
            .map(|p| p.phase.as_str())
    }

    /// The multi-stage attack-pattern library.
    pub fn patterns(&self) -> &[PatternDefinition] {
        &self.attack_patterns
    }

    pub fn attack_type_count(&self) -> usize {
        self.attack_mappings.len()
    }
}
