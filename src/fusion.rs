//! Decision fusion: combine the detector verdicts for one event into a
//! single classification.
//!
//! Two detectors feed the engine: an unsupervised anomaly detector (flag +
//! raw score) and a supervised classifier (label + confidence). Either may
//! be unavailable for a given event.

use serde::{Deserialize, Serialize};

/// The label both detectors use for benign traffic.
pub const NORMAL: &str = "NORMAL";

/// Classification assigned when only the anomaly detector fired.
pub const UNKNOWN_THREAT: &str = "UNKNOWN_THREAT";

/// Verdict from the unsupervised anomaly detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Raw decision-function output; sign and magnitude are model-specific.
    #[serde(default)]
    pub score: f64,
}

/// Verdict from the supervised attack classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub label: String,
    pub confidence: f64,
}

/// How the final classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FusionMethod {
    /// Supervised label corroborated by the anomaly detector.
    Ensemble,
    /// Anomaly flag with no supervised classification.
    Unsupervised,
    /// High-confidence supervised label alone.
    Supervised,
    /// Benign traffic, or no detector available.
    Baseline,
}

/// The fused classification for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionDecision {
    pub attack_type: String,
    pub confidence: f64,
    pub method: FusionMethod,
}

impl FusionDecision {
    pub fn is_benign(&self) -> bool {
        self.attack_type == NORMAL
    }
}

/// Fuses verdicts under a fixed supervised-confidence threshold.
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    supervised_threshold: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            supervised_threshold: 0.7,
        }
    }
}

impl FusionEngine {
    pub fn new(supervised_threshold: f64) -> Self {
        Self {
            supervised_threshold,
        }
    }

    /// Combine the available verdicts. Rules are evaluated in order; the
    /// first that applies wins.
    pub fn fuse(
        &self,
        unsupervised: Option<&AnomalyVerdict>,
        supervised: Option<&ClassifierVerdict>,
    ) -> FusionDecision {
        let anomalous = unsupervised.map(|v| v.is_anomaly).unwrap_or(false);
        let attack_label = supervised.filter(|v| v.label != NORMAL);

        // 1. Both detectors agree something is wrong.
        if let Some(sup) = attack_label {
            if anomalous {
                return FusionDecision {
                    attack_type: sup.label.clone(),
                    confidence: sup.confidence.clamp(0.0, 1.0),
                    method: FusionMethod::Ensemble,
                };
            }
        }

        // 2. Anomaly with no (or benign) supervised classification.
        if anomalous {
            let score = unsupervised.map(|v| v.score.abs()).unwrap_or(0.0);
            return FusionDecision {
                attack_type: UNKNOWN_THREAT.to_string(),
                confidence: score.clamp(0.0, 1.0),
                method: FusionMethod::Unsupervised,
            };
        }

        // 3. Supervised alone, if confident enough.
        if let Some(sup) = attack_label {
            if sup.confidence > self.supervised_threshold {
                return FusionDecision {
                    attack_type: sup.label.clone(),
                    confidence: sup.confidence.clamp(0.0, 1.0),
                    method: FusionMethod::Supervised,
                };
            }
        }

        // 4. Baseline. Confidence is the supervised detector's support for
        // NORMAL floored at 0.9, or 0.0 when no detector reported at all.
        let confidence = match supervised {
            Some(sup) if sup.label == NORMAL => sup.confidence.clamp(0.0, 1.0).max(0.9),
            Some(sup) => (1.0 - sup.confidence.clamp(0.0, 1.0)).max(0.9),
            None if unsupervised.is_some() => 0.9,
            None => 0.0,
        };

        FusionDecision {
            attack_type: NORMAL.to_string(),
            confidence,
            method: FusionMethod::Baseline,
        }
    }
}
