//! Execution-log repository — one row per deployment run.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::row_types::{ExecutionLogRow, ExecutionStatus, TriggerKind};

/// Execution-log repository.
pub struct ExecutionLogRepo;

impl ExecutionLogRepo {
    /// Open a `running` log row at execution start.
    pub fn start(
        conn: &Connection,
        deployment_id: &str,
        execution_id: &str,
        trigger: TriggerKind,
        input_json: Option<&str>,
    ) -> Result<ExecutionLogRow> {
        let id = format!("xlog_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let _ = conn.execute(
            "INSERT INTO execution_logs
                 (id, deployment_id, execution_id, trigger_kind, status, input_json, started_at)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5, ?6)",
            params![id, deployment_id, execution_id, trigger.as_str(), input_json, now],
        )?;

        Ok(ExecutionLogRow {
            id,
            deployment_id: deployment_id.to_owned(),
            execution_id: execution_id.to_owned(),
            trigger,
            status: ExecutionStatus::Running,
            input_json: input_json.map(String::from),
            result_json: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
            error: None,
        })
    }

    /// Close a log row with its terminal status.
    pub fn finish(
        conn: &Connection,
        log_id: &str,
        status: ExecutionStatus,
        result_json: Option<&str>,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE execution_logs
             SET status = ?1, result_json = ?2, error = ?3, completed_at = ?4, duration_ms = ?5
             WHERE id = ?6",
            params![status.as_str(), result_json, error, now, duration_ms, log_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "execution_log",
                id: log_id.to_owned(),
            });
        }
        Ok(())
    }

    /// Get a log row by id.
    pub fn get(conn: &Connection, log_id: &str) -> Result<Option<ExecutionLogRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLS} WHERE id = ?1"),
                params![log_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List a deployment's runs, newest first.
    pub fn list_for_deployment(
        conn: &Connection,
        deployment_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRow>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} WHERE deployment_id = ?1 ORDER BY started_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![deployment_id, limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionLogRow> {
        let trigger: String = row.get(3)?;
        let status: String = row.get(4)?;
        Ok(ExecutionLogRow {
            id: row.get(0)?,
            deployment_id: row.get(1)?,
            execution_id: row.get(2)?,
            trigger: TriggerKind::parse(&trigger),
            status: ExecutionStatus::parse(&status),
            input_json: row.get(5)?,
            result_json: row.get(6)?,
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
            duration_ms: row.get(9)?,
            error: row.get(10)?,
        })
    }
}

const SELECT_COLS: &str = "SELECT id, deployment_id, execution_id, trigger_kind, status,
    input_json, result_json, started_at, completed_at, duration_ms, error FROM execution_logs";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
