//! SQLite storage layer -- schema, snapshot persistence, incident log.

pub mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// An in-memory pool for tests and the `--ephemeral` mode.
pub fn open_memory_pool() -> Result<Pool> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}

/// Replace the single sequence-store snapshot row.
pub fn save_sequence_snapshot(pool: &Pool, schema_version: u32, snapshot_json: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO sequence_state (id, schema_version, snapshot_json, updated_at)
         VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             schema_version = excluded.schema_version,
             snapshot_json = excluded.snapshot_json,
             updated_at = excluded.updated_at",
        params![schema_version, snapshot_json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Load the persisted snapshot, if any. Returns (schema_version, json).
pub fn load_sequence_snapshot(pool: &Pool) -> Result<Option<(u32, String)>> {
    let conn = pool.get()?;
    let row = conn
        .query_row(
            "SELECT schema_version, snapshot_json FROM sequence_state WHERE id = 1",
            [],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    Ok(row)
}

/// A persisted non-benign event for the API and report surfaces.
#[derive(Debug, serde::Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub source_id: String,
    pub attack_type: String,
    pub severity: String,
    pub risk_score: f64,
    pub analysis: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append one incident row.
pub fn record_incident(
    pool: &Pool,
    source_id: &str,
    attack_type: &str,
    severity: &str,
    risk_score: f64,
    analysis: &serde_json::Value,
) -> Result<Uuid> {
    let conn = pool.get()?;
    let id = Uuid::new_v4();
    let analysis_json = serde_json::to_string(analysis)?;

    conn.execute(
        "INSERT INTO incidents (id, source_id, attack_type, severity, risk_score, analysis_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            source_id,
            attack_type,
            severity,
            risk_score,
            analysis_json,
            Utc::now().to_rfc3339()
        ],
    )?;

    Ok(id)
}

/// Most recent incidents, newest first.
pub fn list_incidents(pool: &Pool, limit: usize) -> Result<Vec<Incident>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, source_id, attack_type, severity, risk_score, analysis_json, created_at
         FROM incidents ORDER BY created_at DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit], |row| {
        let id_str: String = row.get(0)?;
        let analysis_str: String = row.get(5)?;
        let created_str: String = row.get(6)?;

        Ok(Incident {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            source_id: row.get(1)?,
            attack_type: row.get(2)?,
            severity: row.get(3)?,
            risk_score: row.get(4)?,
            analysis: serde_json::from_str(&analysis_str).unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&created_str)
                .unwrap_or_default()
                .with_timezone(&Utc),
        })
    })?;

    let mut incidents = Vec::new();
    for r in rows {
        incidents.push(r?);
    }
    Ok(incidents)
}

/// Append one campaign report row (maintenance loop output).
pub fn save_campaign_report(pool: &Pool, report_json: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO campaign_reports (report_json, created_at) VALUES (?1, ?2)",
        params![report_json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_save_and_load() {
        let pool = open_memory_pool().unwrap();

        assert!(load_sequence_snapshot(&pool).unwrap().is_none());

        save_sequence_snapshot(&pool, 1, r#"{"sequences":{}}"#).unwrap();
        let (version, json) = load_sequence_snapshot(&pool).unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(json, r#"{"sequences":{}}"#);

        // Second save replaces, never duplicates.
        save_sequence_snapshot(&pool, 1, r#"{"sequences":{"a":{}}}"#).unwrap();
        let (_, json) = load_sequence_snapshot(&pool).unwrap().unwrap();
        assert!(json.contains("\"a\""));
    }

    #[test]
    fn test_incident_roundtrip() {
        let pool = open_memory_pool().unwrap();

        let analysis = serde_json::json!({"threat_level": "HIGH"});
        record_incident(&pool, "10.0.0.5", "BRUTE_FORCE", "HIGH", 3.8, &analysis).unwrap();
        record_incident(&pool, "10.0.0.6", "PORT_SCAN", "MEDIUM", 2.3, &analysis).unwrap();

        let incidents = list_incidents(&pool, 10).unwrap();
        assert_eq!(incidents.len(), 2);
        assert!(incidents.iter().any(|i| i.source_id == "10.0.0.5"));
        assert!(incidents.iter().any(|i| i.attack_type == "PORT_SCAN"));

        let limited = list_incidents(&pool, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }
}
