use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tabprof_core::{AnalysisResult, RuleResults, TaskStatus};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, StoreError},
};

/// Durable home for finished analysis tasks.
///
/// Whatever is passed to [`save_result`](ResultStore::save_result) comes back
/// unchanged from [`list_results`](ResultStore::list_results). Saving the same
/// id twice replaces the earlier record.
pub trait ResultStore: Send + Sync {
    fn save_result(&self, result: &AnalysisResult) -> Result<()>;

    /// Returns `NotFound` if no record has this id.
    fn delete_result(&self, id: &str) -> Result<()>;

    /// Every result for `connection_id`, newest first.
    fn list_results(&self, connection_id: &str) -> Result<Vec<AnalysisResult>>;
}

/// [`ResultStore`] backed by the local SQLite database.
///
/// Thread-safe: wraps a single connection in a `Mutex`; writes are small and
/// infrequent (one per finished task).
pub struct SqliteResultStore {
    db: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!(%path, "result store opened");
        Self::new(conn)
    }
}

type RawRow = (
    String,         // id
    String,         // connection_id
    String,         // table_name
    String,         // status
    String,         // rules JSON
    String,         // results JSON
    Option<String>, // error
    Option<String>, // started_at
    Option<String>, // completed_at
    Option<i64>,    // duration_ms
    String,         // created_at
);

impl ResultStore for SqliteResultStore {
    fn save_result(&self, result: &AnalysisResult) -> Result<()> {
        let rules = serde_json::to_string(&result.rules)?;
        let results = serde_json::to_string(&result.results)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO analysis_results
             (id, connection_id, table_name, status, rules, results, error,
              started_at, completed_at, duration_ms, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                result.id,
                result.connection_id,
                result.table_name,
                result.status.to_string(),
                rules,
                results,
                result.error,
                result.started_at.map(|t| t.to_rfc3339()),
                result.completed_at.map(|t| t.to_rfc3339()),
                result.duration_ms,
                result.created_at.to_rfc3339(),
            ],
        )?;
        info!(result_id = %result.id, status = %result.status, "analysis result saved");
        Ok(())
    }

    fn delete_result(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM analysis_results WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        info!(result_id = %id, "analysis result deleted");
        Ok(())
    }

    fn list_results(&self, connection_id: &str) -> Result<Vec<AnalysisResult>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, connection_id, table_name, status, rules, results, error,
                    started_at, completed_at, duration_ms, created_at
             FROM analysis_results
             WHERE connection_id = ?1
             ORDER BY created_at DESC, id",
        )?;
        let rows = stmt
            .query_map([connection_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<RawRow>>>()?;

        let results = rows
            .into_iter()
            .filter_map(|raw| match decode(raw) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable analysis result");
                    None
                }
            })
            .collect();
        Ok(results)
    }
}

fn decode(raw: RawRow) -> Result<AnalysisResult> {
    let (
        id,
        connection_id,
        table_name,
        status,
        rules,
        results,
        error,
        started_at,
        completed_at,
        duration_ms,
        created_at,
    ) = raw;

    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };
    let status: TaskStatus = status.parse().map_err(corrupt)?;
    let rules: Vec<String> = serde_json::from_str(&rules)?;
    let results: RuleResults = serde_json::from_str(&results)?;
    let started_at = started_at.as_deref().map(parse_ts).transpose().map_err(corrupt)?;
    let completed_at = completed_at
        .as_deref()
        .map(parse_ts)
        .transpose()
        .map_err(corrupt)?;
    let created_at = parse_ts(&created_at).map_err(corrupt)?;

    Ok(AnalysisResult {
        id,
        connection_id,
        table_name,
        status,
        rules,
        results,
        error,
        started_at,
        completed_at,
        duration_ms,
        created_at,
    })
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}
