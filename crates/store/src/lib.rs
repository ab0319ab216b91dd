use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, Row, params};
use telemetry_core::{NewTelemetryRecord, TelemetryRecord};

pub const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_init", MIGRATION_0001)];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Append-only source of telemetry rows. Rows are inserted once and only
/// ever read back; there is no update or delete surface.
pub trait RowSource {
    fn insert(&mut self, record: &NewTelemetryRecord) -> Result<i64>;
    /// Rows for a task, newest first, at most `limit`.
    fn query_by_task(&self, task_id: &str, limit: u32) -> Result<Vec<TelemetryRecord>>;
    /// Rows for a run, newest first, at most `limit`.
    fn query_by_run(&self, run_id: &str, limit: u32) -> Result<Vec<TelemetryRecord>>;
    /// All rows with `start_ms <= ts <= end_ms`, oldest first, unbounded.
    fn query_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<TelemetryRecord>>;
}

/// Maps task ids to project labels. Tasks without a known project are
/// absent from the returned map.
pub trait ProjectResolver {
    fn resolve_projects(&self, task_ids: &[String]) -> Result<HashMap<String, String>>;
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (_name, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Registers or replaces the project label for a task, feeding the
    /// resolver table.
    pub fn upsert_task_project(&self, task_id: &str, project: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO task_project (task_id, project)
            VALUES (?1, ?2)
            ON CONFLICT(task_id) DO UPDATE SET project = excluded.project
            "#,
            params![task_id, project],
        )?;
        Ok(())
    }
}

impl RowSource for Store {
    fn insert(&mut self, record: &NewTelemetryRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO telemetry_record (
              task_id, agent, model, input_tokens, output_tokens,
              estimated_cost_usd, ts, run_id, session_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.task_id,
                record.agent,
                record.model,
                record.input_tokens as i64,
                record.output_tokens as i64,
                record.estimated_cost_usd,
                record.timestamp,
                record.run_id,
                record.session_key,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn query_by_task(&self, task_id: &str, limit: u32) -> Result<Vec<TelemetryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, task_id, agent, model, input_tokens, output_tokens,
                   estimated_cost_usd, ts, run_id, session_key
            FROM telemetry_record
            WHERE task_id = ?1
            ORDER BY ts DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![task_id, limit], row_to_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn query_by_run(&self, run_id: &str, limit: u32) -> Result<Vec<TelemetryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, task_id, agent, model, input_tokens, output_tokens,
                   estimated_cost_usd, ts, run_id, session_key
            FROM telemetry_record
            WHERE run_id = ?1
            ORDER BY ts DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![run_id, limit], row_to_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn query_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<TelemetryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, task_id, agent, model, input_tokens, output_tokens,
                   estimated_cost_usd, ts, run_id, session_key
            FROM telemetry_record
            WHERE ts >= ?1 AND ts <= ?2
            ORDER BY ts ASC
            "#,
        )?;
        let rows = stmt.query_map(params![start_ms, end_ms], row_to_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

impl ProjectResolver for Store {
    fn resolve_projects(&self, task_ids: &[String]) -> Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT project FROM task_project WHERE task_id = ?1")?;
        let mut projects = HashMap::new();
        for task_id in task_ids {
            let mut rows = stmt.query(params![task_id])?;
            if let Some(row) = rows.next()? {
                projects.insert(task_id.clone(), row.get::<_, String>(0)?);
            }
        }
        Ok(projects)
    }
}

fn row_to_record(row: &Row<'_>) -> std::result::Result<TelemetryRecord, rusqlite::Error> {
    Ok(TelemetryRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        agent: row.get(2)?,
        model: row.get(3)?,
        input_tokens: row.get::<_, i64>(4)? as u64,
        output_tokens: row.get::<_, i64>(5)? as u64,
        estimated_cost_usd: row.get(6)?,
        timestamp: row.get(7)?,
        run_id: row.get(8)?,
        session_key: row.get(9)?,
    })
}
