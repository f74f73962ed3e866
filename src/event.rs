//! Input and output event models for the correlation pipeline.
//!
//! Honeypots are not consistent about field names (`src_ip` vs `source_ip`,
//! `dst_port` vs `destination_port`), so the input model accepts the common
//! aliases. Fields the engine does not understand are carried through
//! untouched via the flattened `extra` map.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fusion::{AnomalyVerdict, ClassifierVerdict, FusionDecision};
use crate::mitre::MitreMapping;
use crate::sequence::SequenceAnalysis;

/// One observation from a honeypot, after detection and before correlation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoneypotEvent {
    /// Attacker identity, typically an IP address.
    #[serde(
        default,
        alias = "src_ip",
        alias = "source_ip",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_id: Option<String>,

    /// ISO-8601 timestamp. Timezone-aware preferred; naive values are
    /// treated as UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, alias = "dst_port", skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,

    /// Unsupervised detector verdict, if that detector ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupervised: Option<AnomalyVerdict>,

    /// Supervised detector verdict, if that detector ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervised: Option<ClassifierVerdict>,

    /// Everything else the honeypot sent; preserved verbatim on output.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The event after correlation: original fields plus the namespaced
/// analysis blocks. `mitre` and `sequence_analysis` are absent for NORMAL
/// traffic; `sequence_analysis` is also absent on a source's first
/// recorded attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: HoneypotEvent,

    pub classification: FusionDecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitre: Option<MitreMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_analysis: Option<SequenceAnalysis>,
}

/// Parse an event timestamp. Accepts RFC 3339 (including a trailing `Z`)
/// and zone-less `YYYY-MM-DDTHH:MM:SS[.frac]` (with `T` or a space), which
/// is assumed UTC. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    None
}
