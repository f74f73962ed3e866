use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use traptriage::config::Config;
use traptriage::engine::CorrelationEngine;
use traptriage::knowledge::KnowledgeBase;
use traptriage::{campaign, mitre, storage};

#[derive(Parser)]
#[command(
    name = "traptriage",
    about = "Honeypot attack correlation and threat-escalation engine",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + event intake + maintenance)
    Serve {
        /// Override the API bind address
        #[arg(long)]
        bind: Option<String>,

        /// Override the database path
        #[arg(long)]
        db: Option<String>,
    },

    /// Generate a campaign report over the current sequence state
    Report {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Number of top attackers to include
        #[arg(long, default_value = "5")]
        top: usize,
    },

    /// Show the attack-framework mapping for an attack type
    Map {
        /// Attack type, e.g. BRUTE_FORCE
        attack_type: String,

        /// Detector confidence in [0,1] to scale the risk score
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Remove sequences inactive for longer than twice the time window
    Sweep,

    /// Reset all per-source sequence history
    ClearHistory {
        /// Skip the confirmation requirement
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    // Initialize tracing; RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    match cli.command {
        Commands::Serve { bind, db } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.network.api_bind = bind;
            }
            if let Some(db) = db {
                config.storage.db_path = db;
            }

            tracing::info!(
                api = %config.network.api_bind,
                intake = %config.network.intake_bind,
                "starting TrapTriage daemon"
            );
            traptriage::serve(config).await?;
        }

        Commands::Report { json, top } => {
            let pool = storage::open_pool(&config.storage.db_path)?;
            let engine = CorrelationEngine::new(&config.engine, Some(pool))?;
            let report = engine.campaign_report(top);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", campaign::render_text(&report));
            }
        }

        Commands::Map {
            attack_type,
            confidence,
        } => {
            let kb = KnowledgeBase::load(config.engine.knowledge_path.as_deref());
            let mapping = mitre::map_attack(&kb, &attack_type, confidence);
            println!("{}", mitre::render_text(&mapping));
        }

        Commands::Sweep => {
            let pool = storage::open_pool(&config.storage.db_path)?;
            let engine = CorrelationEngine::new(&config.engine, Some(pool))?;
            let removed = engine.store().sweep(chrono::Utc::now());
            println!(
                "Swept {} stale sequence(s); {} still active.",
                removed,
                engine.store().len()
            );
        }

        Commands::ClearHistory { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear sequence history without --yes");
            }
            let pool = storage::open_pool(&config.storage.db_path)?;
            let engine = CorrelationEngine::new(&config.engine, Some(pool))?;
            let cleared = engine.store().len();
            engine.store().clear();
            println!("Cleared {} sequence(s).", cleared);
        }
    }

    Ok(())
}
