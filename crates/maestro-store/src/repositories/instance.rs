//! Instance repository — lifecycle rows and aggregated metrics.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::row_types::{InstanceRow, InstanceStatus};

/// Metric deltas applied atomically to an instance row.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricDeltas {
    /// Tokens to add.
    pub tokens: i64,
    /// Cost to add.
    pub cost_usd: f64,
    /// Tool calls to add.
    pub tool_calls: i64,
    /// Running wall time to add.
    pub running_ms: i64,
}

/// Instance repository.
pub struct InstanceRepo;

impl InstanceRepo {
    /// Create an instance row in `starting` state.
    pub fn create(
        conn: &Connection,
        workflow_id: &str,
        user_id: &str,
        workspace_path: Option<&str>,
    ) -> Result<InstanceRow> {
        let id = format!("inst_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let _ = conn.execute(
            "INSERT INTO instances (id, workflow_id, user_id, status, workspace_path,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, 'starting', ?4, ?5, ?5)",
            params![id, workflow_id, user_id, workspace_path, now],
        )?;

        Ok(InstanceRow {
            id,
            workflow_id: workflow_id.to_owned(),
            user_id: user_id.to_owned(),
            status: InstanceStatus::Starting,
            workspace_path: workspace_path.map(String::from),
            total_tokens: 0,
            total_cost_usd: 0.0,
            tool_call_count: 0,
            running_ms: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get an instance by id.
    pub fn get(conn: &Connection, instance_id: &str) -> Result<Option<InstanceRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLS} WHERE id = ?1"),
                params![instance_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List a workflow's instances (uses the `(workflow_id, status)` index).
    pub fn list_for_workflow(
        conn: &Connection,
        workflow_id: &str,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<InstanceRow>> {
        let rows = if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLS} WHERE workflow_id = ?1 AND status = ?2 ORDER BY created_at DESC"
            ))?;
            stmt.query_map(params![workflow_id, status.as_str()], Self::map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLS} WHERE workflow_id = ?1 ORDER BY created_at DESC"
            ))?;
            stmt.query_map(params![workflow_id], Self::map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Set the lifecycle status.
    pub fn set_status(
        conn: &Connection,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE instances SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, instance_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "instance",
                id: instance_id.to_owned(),
            });
        }
        Ok(())
    }

    /// Apply metric deltas atomically.
    pub fn apply_metrics(
        conn: &Connection,
        instance_id: &str,
        deltas: &MetricDeltas,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE instances SET
                 total_tokens = total_tokens + ?1,
                 total_cost_usd = total_cost_usd + ?2,
                 tool_call_count = tool_call_count + ?3,
                 running_ms = running_ms + ?4,
                 updated_at = ?5
             WHERE id = ?6",
            params![
                deltas.tokens,
                deltas.cost_usd,
                deltas.tool_calls,
                deltas.running_ms,
                now,
                instance_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "instance",
                id: instance_id.to_owned(),
            });
        }
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstanceRow> {
        let status: String = row.get(3)?;
        Ok(InstanceRow {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            user_id: row.get(2)?,
            status: InstanceStatus::parse(&status),
            workspace_path: row.get(4)?,
            total_tokens: row.get(5)?,
            total_cost_usd: row.get(6)?,
            tool_call_count: row.get(7)?,
            running_ms: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

const SELECT_COLS: &str = "SELECT id, workflow_id, user_id, status, workspace_path,
    total_tokens, total_cost_usd, tool_call_count, running_ms, created_at, updated_at
    FROM instances";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn create_starts_in_starting() {
        let conn = conn();
        let row = InstanceRepo::create(&conn, "wf_1", "u_1", Some("/tmp/ws")).unwrap();
        assert_eq!(row.status, InstanceStatus::Starting);
        assert_eq!(row.total_tokens, 0);
    }

    #[test]
    fn set_status_transitions() {
        let conn = conn();
        let row = InstanceRepo::create(&conn, "wf_1", "u_1", None).unwrap();
        InstanceRepo::set_status(&conn, &row.id, InstanceStatus::Ready).unwrap();
        let loaded = InstanceRepo::get(&conn, &row.id).unwrap().unwrap();
        assert_eq!(loaded.status, InstanceStatus::Ready);
    }

    #[test]
    fn set_status_unknown_errors() {
        let conn = conn();
        assert!(InstanceRepo::set_status(&conn, "ghost", InstanceStatus::Ready).is_err());
    }

    #[test]
    fn apply_metrics_accumulates() {
        let conn = conn();
        let row = InstanceRepo::create(&conn, "wf_1", "u_1", None).unwrap();
        InstanceRepo::apply_metrics(
            &conn,
            &row.id,
            &MetricDeltas {
                tokens: 120,
                cost_usd: 0.004,
                tool_calls: 1,
                running_ms: 300,
            },
        )
        .unwrap();
        InstanceRepo::apply_metrics(
            &conn,
            &row.id,
            &MetricDeltas {
                tokens: 80,
                cost_usd: 0.002,
                tool_calls: 0,
                running_ms: 150,
            },
        )
        .unwrap();

        let loaded = InstanceRepo::get(&conn, &row.id).unwrap().unwrap();
        assert_eq!(loaded.total_tokens, 200);
        assert!((loaded.total_cost_usd - 0.006).abs() < 1e-9);
        assert_eq!(loaded.tool_call_count, 1);
        assert_eq!(loaded.running_ms, 450);
    }

    #[test]
    fn list_for_workflow_filters_by_status() {
        let conn = conn();
        let a = InstanceRepo::create(&conn, "wf_1", "u_1", None).unwrap();
        let b = InstanceRepo::create(&conn, "wf_1", "u_1", None).unwrap();
        let _ = InstanceRepo::create(&conn, "wf_2", "u_1", None).unwrap();
        InstanceRepo::set_status(&conn, &a.id, InstanceStatus::Ready).unwrap();
        InstanceRepo::set_status(&conn, &b.id, InstanceStatus::Stopped).unwrap();

        let all = InstanceRepo::list_for_workflow(&conn, "wf_1", None).unwrap();
        assert_eq!(all.len(), 2);

        let ready =
            InstanceRepo::list_for_workflow(&conn, "wf_1", Some(InstanceStatus::Ready)).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, a.id);
    }
}
