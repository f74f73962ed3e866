//! Multi-stage attack-chain matching.
//!
//! A pattern is an ordered chain of attack types. A source's history
//! matches a pattern either exactly at its tail (the last N attacks are
//! the chain verbatim) or loosely anywhere in the sequence (the chain
//! appears mid-history with unrelated events after it). Patterns are
//! independent: all matches are reported, none suppresses another.

use serde::{Deserialize, Serialize};

use crate::knowledge::Severity;

/// A named multi-stage attack chain from the pattern library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub name: String,
    pub pattern: Vec<String>,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub kill_chain: Vec<String>,
}

/// A pattern that matched a source's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub kill_chain: Vec<String>,
}

impl From<&PatternDefinition> for PatternMatch {
    fn from(def: &PatternDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            severity: def.severity,
            kill_chain: def.kill_chain.clone(),
        }
    }
}

/// Match `history` (oldest to newest attack types) against the library.
/// Sequences shorter than 2 entries are never matched.
pub fn find_matches(history: &[String], library: &[PatternDefinition]) -> Vec<PatternMatch> {
    if history.len() < 2 {
        return Vec::new();
    }

    library
        .iter()
        .filter(|def| matches_pattern(history, &def.pattern))
        .map(PatternMatch::from)
        .collect()
}

fn matches_pattern(history: &[String], pattern: &[String]) -> bool {
    if pattern.is_empty() || history.len() < pattern.len() {
        return false;
    }

    // Exact tail match.
    if history[history.len() - pattern.len()..] == pattern[..] {
        return true;
    }

    // Loose match: the chain occurs anywhere in the joined history.
    let haystack = history.join("-");
    let needle = pattern.join("-");
    haystack.contains(&needle)
}
