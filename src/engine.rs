//! The correlation engine: one service object owning the whole per-event
//! pipeline (fuse, map, record, analyze) and the campaign view over it.
//!
//! Constructed once at process start and shared by reference; there is no
//! global state. `process` is synchronous and infallible by design: every
//! event yields a fully populated enrichment or an explicit NORMAL
//! classification, never a partial or throwing result.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::campaign::{self, CampaignReport};
use crate::config::EngineConfig;
use crate::event::{parse_timestamp, EnrichedEvent, HoneypotEvent};
use crate::fusion::FusionEngine;
use crate::knowledge::KnowledgeBase;
use crate::mitre;
use crate::patterns;
use crate::scoring;
use crate::sequence::{AttackSequence, SequenceAnalysis, SequenceStore};
use crate::storage::{self, Pool};

/// Substitute identity for events that arrive without one.
const UNKNOWN_SOURCE: &str = "unknown";

/// Default number of attackers in a campaign report.
pub const DEFAULT_TOP_ATTACKERS: usize = 5;

pub struct CorrelationEngine {
    fusion: FusionEngine,
    knowledge: Arc<KnowledgeBase>,
    store: SequenceStore,
    pool: Option<Pool>,
}

impl CorrelationEngine {
    /// Build the engine: load the knowledge base (falling back to the
    /// embedded matrix) and restore the sequence store from the pool.
    pub fn new(config: &EngineConfig, pool: Option<Pool>) -> anyhow::Result<Self> {
        let knowledge = Arc::new(KnowledgeBase::load(config.knowledge_path.as_deref()));
        let store = SequenceStore::new(
            config.sequence_length,
            config.time_window_secs,
            config.max_sources,
            config.persist_every,
            pool.clone(),
        )?;

        Ok(Self {
            fusion: FusionEngine::new(config.supervised_threshold),
            knowledge,
            store,
            pool,
        })
    }

    /// Run one event through the pipeline.
    pub fn process(&self, event: HoneypotEvent) -> EnrichedEvent {
        let decision = self
            .fusion
            .fuse(event.unsupervised.as_ref(), event.supervised.as_ref());

        if decision.is_benign() {
            return EnrichedEvent {
                event,
                classification: decision,
                mitre: None,
                sequence_analysis: None,
            };
        }

        let attack_type = decision.attack_type.to_uppercase();

        let source_id = match event.source_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("event has no source identity, tracking under '{UNKNOWN_SOURCE}'");
                UNKNOWN_SOURCE.to_string()
            }
        };

        let timestamp = match event.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                warn!(raw, source = %source_id, "unparseable event timestamp, using now");
                Utc::now()
            }),
            None => Utc::now(),
        };

        let mapping = mitre::map_attack(&self.knowledge, &attack_type, Some(decision.confidence));

        let sequence = self.store.record(
            &source_id,
            &attack_type,
            timestamp,
            event.service.clone(),
            event.destination_port,
        );

        // The analysis block only appears once there is a sequence to
        // speak of; a source's first attack stands alone.
        let analysis = (sequence.len() >= 2).then(|| self.analyze_sequence(&sequence));

        debug!(
            source = %source_id,
            attack_type = %attack_type,
            method = ?decision.method,
            sequence_length = sequence.len(),
            "correlated event"
        );

        self.log_incident(&source_id, &attack_type, &mapping, analysis.as_ref());

        EnrichedEvent {
            event,
            classification: decision,
            mitre: Some(mapping),
            sequence_analysis: analysis,
        }
    }

    /// Pattern, score, and recommendation analysis of one sequence snapshot.
    fn analyze_sequence(&self, sequence: &AttackSequence) -> SequenceAnalysis {
        let history = sequence.attack_types();
        let matched = patterns::find_matches(&history, self.knowledge.patterns());
        let behavioral_score = scoring::behavioral_score(sequence);
        let threat_level = scoring::threat_level(sequence, &matched, behavioral_score);
        let recommendations = Self::recommendations(sequence, &matched);

        SequenceAnalysis {
            source_id: sequence.source_id().to_string(),
            sequence_length: sequence.len(),
            statistics: sequence.stats(),
            patterns_detected: matched,
            threat_level,
            behavioral_score,
            recommendations,
        }
    }

    fn recommendations(
        sequence: &AttackSequence,
        matched: &[crate::patterns::PatternMatch],
    ) -> Vec<String> {
        let mut recs: Vec<String> = Vec::new();
        let mut push = |rec: &str| {
            if !recs.iter().any(|r| r == rec) {
                recs.push(rec.to_string());
            }
        };

        for pattern in matched {
            if pattern.name.contains("reconnaissance") {
                push("Block source IP - active reconnaissance detected");
            }
            if pattern.name.contains("infiltration") {
                push("URGENT: Isolate affected systems - infiltration in progress");
            }
            if pattern.name.contains("botnet") {
                push("Deploy botnet mitigation - coordinated attack detected");
            }
        }

        if sequence.len() >= 5 {
            push("Implement rate limiting for this IP");
        }
        if sequence.stats().attack_rate > 0.1 {
            push("Consider temporary IP ban - high attack rate");
        }
        if sequence.unique_attack_types() >= 3 {
            push("Alert SOC team - sophisticated multi-vector attack");
        }

        recs
    }

    fn log_incident(
        &self,
        source_id: &str,
        attack_type: &str,
        mapping: &mitre::MitreMapping,
        analysis: Option<&SequenceAnalysis>,
    ) {
        let Some(pool) = &self.pool else {
            return;
        };

        let analysis_json = match analysis {
            Some(a) => serde_json::to_value(a).unwrap_or_default(),
            None => serde_json::Value::Null,
        };

        if let Err(e) = storage::record_incident(
            pool,
            source_id,
            attack_type,
            &mapping.severity.to_string(),
            mapping.risk_score,
            &analysis_json,
        ) {
            warn!(error = %e, source = %source_id, "failed to persist incident");
        }
    }

    /// On-demand analysis of one tracked source, for the API surface.
    /// Unlike the event path, this analyzes single-record sequences too.
    pub fn inspect(&self, source_id: &str) -> Option<SequenceAnalysis> {
        let sequence = self.store.get(source_id)?;
        Some(self.analyze_sequence(&sequence))
    }

    /// Fresh campaign report over a point-in-time store snapshot.
    pub fn campaign_report(&self, top_n: usize) -> CampaignReport {
        campaign::generate(&self.store.snapshot_all(), self.knowledge.patterns(), top_n)
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }
}
