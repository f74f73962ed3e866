//! Background maintenance: the periodic sweep and the periodic campaign
//! report, both driven by cron schedules from config.
//!
//! The loop polls every 10 seconds and fires whatever is due. Neither job
//! runs on the event path.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use tracing::{error, info};

use crate::config::MaintenanceConfig;
use crate::engine::{CorrelationEngine, DEFAULT_TOP_ATTACKERS};
use crate::storage::{self, Pool};

#[derive(Debug)]
pub struct MaintenanceSchedules {
    sweep: CronSchedule,
    report: CronSchedule,
}

impl MaintenanceSchedules {
    /// Parse and validate the configured cron expressions. An invalid
    /// expression is a startup error, not something to limp past.
    pub fn parse(config: &MaintenanceConfig) -> Result<Self> {
        let sweep = CronSchedule::from_str(&config.sweep_cron)
            .with_context(|| format!("invalid sweep cron expression '{}'", config.sweep_cron))?;
        let report = CronSchedule::from_str(&config.report_cron)
            .with_context(|| format!("invalid report cron expression '{}'", config.report_cron))?;
        Ok(Self { sweep, report })
    }
}

/// Returns whether the deadline has passed, advancing it if so.
fn fire_if_due(
    next: &mut Option<DateTime<Utc>>,
    schedule: &CronSchedule,
    now: DateTime<Utc>,
) -> bool {
    match next {
        Some(deadline) if *deadline <= now => {
            *next = schedule.after(&now).next();
            true
        }
        None => {
            *next = schedule.after(&now).next();
            false
        }
        _ => false,
    }
}

/// Main maintenance loop. Never returns.
pub async fn run_maintenance_loop(
    engine: Arc<CorrelationEngine>,
    pool: Option<Pool>,
    schedules: MaintenanceSchedules,
) {
    info!("maintenance loop started");

    let mut interval = tokio::time::interval(Duration::from_secs(10));
    let mut next_sweep = schedules.sweep.upcoming(Utc).next();
    let mut next_report = schedules.report.upcoming(Utc).next();

    loop {
        interval.tick().await;
        let now = Utc::now();

        if fire_if_due(&mut next_sweep, &schedules.sweep, now) {
            let sweep_engine = engine.clone();
            let removed =
                tokio::task::spawn_blocking(move || sweep_engine.store().sweep(Utc::now())).await;
            match removed {
                Ok(removed) => {
                    info!(removed, active = engine.store().len(), "maintenance sweep complete")
                }
                Err(e) => error!(error = %e, "sweep task panicked"),
            }
        }

        if fire_if_due(&mut next_report, &schedules.report, now) {
            let report = {
                let engine = engine.clone();
                tokio::task::spawn_blocking(move || {
                    engine.campaign_report(DEFAULT_TOP_ATTACKERS)
                })
                .await
            };
            let report = match report {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "report task panicked");
                    continue;
                }
            };

            info!(
                active_attackers = report.active_attacker_count,
                patterns = report.patterns_detected.len(),
                "periodic campaign report"
            );

            if let Some(pool) = &pool {
                match serde_json::to_string(&report) {
                    Ok(json) => {
                        if let Err(e) = storage::save_campaign_report(pool, &json) {
                            error!(error = %e, "failed to persist campaign report");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to serialize campaign report"),
                }
            }
        }
    }
}
