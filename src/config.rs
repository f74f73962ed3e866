//! TOML configuration for the TrapTriage daemon.
//!
//! Layered model: explicit path, then the `TRAPTRIAGE_CONFIG` environment
//! variable, then the standard system location, then compiled-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Root configuration for the TrapTriage process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub network: NetworkConfig,
    pub maintenance: MaintenanceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The explicit `--config` path (an error here is fatal: the operator asked for it).
    /// 2. The path in the `TRAPTRIAGE_CONFIG` environment variable.
    /// 3. `/etc/traptriage/traptriage.toml`.
    /// 4. Compiled-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var("TRAPTRIAGE_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TRAPTRIAGE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/traptriage/traptriage.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

/// Correlation engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum attacks retained per source sequence.
    pub sequence_length: usize,
    /// Sliding time window for a source's history (seconds).
    pub time_window_secs: u64,
    /// Supervised-verdict confidence needed to classify without anomaly
    /// corroboration.
    pub supervised_threshold: f64,
    /// Hard cap on tracked source identities. Admitting a new source past
    /// the cap evicts the stalest one.
    pub max_sources: usize,
    /// Persist the sequence snapshot every N mutations (1 = every mutation).
    pub persist_every: u64,
    /// Optional path to an attack-knowledge JSON file overriding the
    /// embedded matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            time_window_secs: 3600,
            supervised_threshold: 0.7,
            max_sources: 10_000,
            persist_every: 1,
            knowledge_path: None,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address and port for the HTTP API.
    pub api_bind: String,
    /// Address and port for the newline-delimited-JSON event intake.
    pub intake_bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_bind: "0.0.0.0:9380".to_string(),
            intake_bind: "0.0.0.0:9300".to_string(),
        }
    }
}

/// Background maintenance schedules (6-field cron expressions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// When to sweep stale source sequences. Default: every 5 minutes.
    pub sweep_cron: String,
    /// When to generate and persist a campaign report. Default: hourly.
    pub report_cron: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_cron: "0 */5 * * * *".to_string(),
            report_cron: "0 0 * * * *".to_string(),
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/traptriage.db".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();

        assert_eq!(cfg.engine.sequence_length, 10);
        assert_eq!(cfg.engine.time_window_secs, 3600);
        assert_eq!(cfg.engine.supervised_threshold, 0.7);
        assert_eq!(cfg.engine.max_sources, 10_000);
        assert_eq!(cfg.engine.persist_every, 1);
        assert!(cfg.engine.knowledge_path.is_none());

        assert_eq!(cfg.network.api_bind, "0.0.0.0:9380");
        assert_eq!(cfg.network.intake_bind, "0.0.0.0:9300");

        assert_eq!(cfg.maintenance.sweep_cron, "0 */5 * * * *");
        assert_eq!(cfg.maintenance.report_cron, "0 0 * * * *");

        assert_eq!(cfg.storage.db_path, "data/traptriage.db");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[engine]
time_window_secs = 600
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.engine.time_window_secs, 600);
        // Everything else should be defaults.
        assert_eq!(cfg.engine.sequence_length, 10);
        assert_eq!(cfg.network.api_bind, "0.0.0.0:9380");
        assert_eq!(cfg.storage.db_path, "data/traptriage.db");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[engine]
sequence_length = 20
time_window_secs = 1800
supervised_threshold = 0.8
max_sources = 500
persist_every = 10
knowledge_path = "/etc/traptriage/matrix.json"

[network]
api_bind = "127.0.0.1:8000"
intake_bind = "127.0.0.1:8001"

[maintenance]
sweep_cron = "0 */10 * * * *"
report_cron = "0 30 * * * *"

[storage]
db_path = "/var/lib/traptriage/state.db"

[logging]
level = "debug"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.engine.sequence_length, 20);
        assert_eq!(cfg.engine.time_window_secs, 1800);
        assert_eq!(cfg.engine.supervised_threshold, 0.8);
        assert_eq!(cfg.engine.max_sources, 500);
        assert_eq!(cfg.engine.persist_every, 10);
        assert_eq!(
            cfg.engine.knowledge_path,
            Some(PathBuf::from("/etc/traptriage/matrix.json"))
        );
        assert_eq!(cfg.network.api_bind, "127.0.0.1:8000");
        assert_eq!(cfg.maintenance.sweep_cron, "0 */10 * * * *");
        assert_eq!(cfg.storage.db_path, "/var/lib/traptriage/state.db");
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("traptriage.toml");
        std::fs::write(
            &path,
            r#"
[network]
api_bind = "0.0.0.0:9999"
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.network.api_bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/traptriage.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.engine.sequence_length, roundtripped.engine.sequence_length);
        assert_eq!(cfg.network.intake_bind, roundtripped.network.intake_bind);
        assert_eq!(cfg.maintenance.sweep_cron, roundtripped.maintenance.sweep_cron);
    }
}
