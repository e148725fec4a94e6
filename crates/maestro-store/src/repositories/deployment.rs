//! Deployment repository.
//!
//! `endpoint_path` is unique at the schema level; a violated insert surfaces
//! as [`StoreError::Constraint`] so the service layer can map it to the
//! `EndpointConflict` boundary kind.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::row_types::{DeploymentRow, DeploymentStatus};

/// Fields accepted on deployment creation.
pub struct CreateDeploymentOptions<'a> {
    /// Design to bind.
    pub design_id: &'a str,
    /// Unique dispatch path.
    pub endpoint_path: &'a str,
    /// Initial activation state.
    pub status: DeploymentStatus,
    /// JSON-serialized schedule, if any.
    pub schedule: Option<&'a str>,
}

/// Fields accepted on deployment update. `None` leaves a column unchanged;
/// `schedule` uses a double Option so `Some(None)` clears it.
#[derive(Default)]
pub struct UpdateDeploymentOptions<'a> {
    /// New endpoint path.
    pub endpoint_path: Option<&'a str>,
    /// New activation state.
    pub status: Option<DeploymentStatus>,
    /// New schedule (`Some(None)` clears).
    pub schedule: Option<Option<&'a str>>,
}

/// Deployment repository.
pub struct DeploymentRepo;

impl DeploymentRepo {
    /// Persist a new deployment.
    pub fn create(conn: &Connection, opts: &CreateDeploymentOptions<'_>) -> Result<DeploymentRow> {
        let id = format!("dep_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO deployments
                 (id, design_id, endpoint_path, status, schedule, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                opts.design_id,
                opts.endpoint_path,
                opts.status.as_str(),
                opts.schedule,
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if StoreError::is_unique_violation(&e) => {
                return Err(StoreError::Constraint(format!(
                    "endpoint path {} already in use",
                    opts.endpoint_path
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(DeploymentRow {
            id,
            design_id: opts.design_id.to_owned(),
            endpoint_path: opts.endpoint_path.to_owned(),
            status: opts.status,
            schedule: opts.schedule.map(String::from),
            execution_count: 0,
            last_execution_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a deployment by id.
    pub fn get(conn: &Connection, deployment_id: &str) -> Result<Option<DeploymentRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLS} WHERE id = ?1"),
                params![deployment_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Resolve a deployment by exact endpoint path.
    pub fn get_by_path(conn: &Connection, endpoint_path: &str) -> Result<Option<DeploymentRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLS} WHERE endpoint_path = ?1"),
                params![endpoint_path],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List all deployments, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<DeploymentRow>> {
        let mut stmt = conn.prepare(&format!("{SELECT_COLS} ORDER BY created_at DESC"))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// List active deployments carrying a schedule (scheduler startup scan).
    pub fn list_scheduled(conn: &Connection) -> Result<Vec<DeploymentRow>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} WHERE status = 'active' AND schedule IS NOT NULL"
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a partial update. Returns the updated row.
    pub fn update(
        conn: &Connection,
        deployment_id: &str,
        opts: &UpdateDeploymentOptions<'_>,
    ) -> Result<DeploymentRow> {
        let now = chrono::Utc::now().to_rfc3339();

        if let Some(path) = opts.endpoint_path {
            let changed = conn.execute(
                "UPDATE deployments SET endpoint_path = ?1, updated_at = ?2 WHERE id = ?3",
                params![path, now, deployment_id],
            );
            match changed {
                Ok(0) => {
                    return Err(StoreError::NotFound {
                        entity: "deployment",
                        id: deployment_id.to_owned(),
                    });
                }
                Ok(_) => {}
                Err(e) if StoreError::is_unique_violation(&e) => {
                    return Err(StoreError::Constraint(format!(
                        "endpoint path {path} already in use"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(status) = opts.status {
            let _ = conn.execute(
                "UPDATE deployments SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, deployment_id],
            )?;
        }
        if let Some(schedule) = &opts.schedule {
            let _ = conn.execute(
                "UPDATE deployments SET schedule = ?1, updated_at = ?2 WHERE id = ?3",
                params![schedule, now, deployment_id],
            )?;
        }

        Self::get(conn, deployment_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "deployment",
            id: deployment_id.to_owned(),
        })
    }

    /// Record one execution: bump the counter and stamp `last_execution_at`.
    pub fn record_execution(conn: &Connection, deployment_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE deployments
             SET execution_count = execution_count + 1, last_execution_at = ?1, updated_at = ?1
             WHERE id = ?2",
            params![now, deployment_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "deployment",
                id: deployment_id.to_owned(),
            });
        }
        Ok(())
    }

    /// Delete a deployment. Returns whether a row was removed.
    pub fn delete(conn: &Connection, deployment_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM deployments WHERE id = ?1",
            params![deployment_id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeploymentRow> {
        let status: String = row.get(3)?;
        Ok(DeploymentRow {
            id: row.get(0)?,
            design_id: row.get(1)?,
            endpoint_path: row.get(2)?,
            status: DeploymentStatus::parse(&status),
            schedule: row.get(4)?,
            execution_count: row.get(5)?,
            last_execution_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

const SELECT_COLS: &str = "SELECT id, design_id, endpoint_path, status, schedule,
    execution_count, last_execution_at, created_at, updated_at FROM deployments";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::repositories::design::DesignRepo;
    use assert_matches::assert_matches;
    use maestro_core::{Agent, Block, BlockKind, Design};

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let design = Design::single(
            Block::new("b1", BlockKind::Sequential, "t").with_agent(Agent::new("A", "p")),
        );
        let row = DesignRepo::create(&conn, None, &design).unwrap();
        (conn, row.id)
    }

    fn create(conn: &Connection, design_id: &str, path: &str) -> DeploymentRow {
        DeploymentRepo::create(
            conn,
            &CreateDeploymentOptions {
                design_id,
                endpoint_path: path,
                status: DeploymentStatus::Active,
                schedule: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_and_resolve_by_path() {
        let (conn, design_id) = setup();
        let row = create(&conn, &design_id, "/hello");
        assert!(row.id.starts_with("dep_"));

        let found = DeploymentRepo::get_by_path(&conn, "/hello").unwrap().unwrap();
        assert_eq!(found.id, row.id);
        // Exact match only.
        assert!(DeploymentRepo::get_by_path(&conn, "/hello/x").unwrap().is_none());
    }

    #[test]
    fn duplicate_path_is_constraint_error() {
        let (conn, design_id) = setup();
        let _ = create(&conn, &design_id, "/hello");
        let dup = DeploymentRepo::create(
            &conn,
            &CreateDeploymentOptions {
                design_id: &design_id,
                endpoint_path: "/hello",
                status: DeploymentStatus::Active,
                schedule: None,
            },
        );
        assert_matches!(dup, Err(StoreError::Constraint(_)));
    }

    #[test]
    fn unknown_design_rejected_by_foreign_key() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        // Foreign keys are off on a raw connection unless enabled.
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        let res = DeploymentRepo::create(
            &conn,
            &CreateDeploymentOptions {
                design_id: "ghost",
                endpoint_path: "/x",
                status: DeploymentStatus::Active,
                schedule: None,
            },
        );
        assert!(res.is_err());
    }

    #[test]
    fn record_execution_increments() {
        let (conn, design_id) = setup();
        let row = create(&conn, &design_id, "/count");
        DeploymentRepo::record_execution(&conn, &row.id).unwrap();
        DeploymentRepo::record_execution(&conn, &row.id).unwrap();
        let loaded = DeploymentRepo::get(&conn, &row.id).unwrap().unwrap();
        assert_eq!(loaded.execution_count, 2);
        assert!(loaded.last_execution_at.is_some());
    }

    #[test]
    fn update_status_and_schedule() {
        let (conn, design_id) = setup();
        let row = create(&conn, &design_id, "/sched");
        let updated = DeploymentRepo::update(
            &conn,
            &row.id,
            &UpdateDeploymentOptions {
                status: Some(DeploymentStatus::Inactive),
                schedule: Some(Some("{\"kind\":\"interval\"}")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.status, DeploymentStatus::Inactive);
        assert!(updated.schedule.is_some());

        // Clearing the schedule.
        let cleared = DeploymentRepo::update(
            &conn,
            &row.id,
            &UpdateDeploymentOptions {
                schedule: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cleared.schedule.is_none());
    }

    #[test]
    fn update_path_conflict() {
        let (conn, design_id) = setup();
        let _ = create(&conn, &design_id, "/a");
        let b = create(&conn, &design_id, "/b");
        let res = DeploymentRepo::update(
            &conn,
            &b.id,
            &UpdateDeploymentOptions {
                endpoint_path: Some("/a"),
                ..Default::default()
            },
        );
        assert_matches!(res, Err(StoreError::Constraint(_)));
    }

    #[test]
    fn list_scheduled_filters() {
        let (conn, design_id) = setup();
        let _ = create(&conn, &design_id, "/plain");
        let scheduled = DeploymentRepo::create(
            &conn,
            &CreateDeploymentOptions {
                design_id: &design_id,
                endpoint_path: "/cron",
                status: DeploymentStatus::Active,
                schedule: Some("{\"kind\":\"cron\"}"),
            },
        )
        .unwrap();
        let inactive = DeploymentRepo::create(
            &conn,
            &CreateDeploymentOptions {
                design_id: &design_id,
                endpoint_path: "/off",
                status: DeploymentStatus::Inactive,
                schedule: Some("{\"kind\":\"cron\"}"),
            },
        )
        .unwrap();

        let rows = DeploymentRepo::list_scheduled(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, scheduled.id);
        assert_ne!(rows[0].id, inactive.id);
    }

    #[test]
    fn delete_returns_whether_found() {
        let (conn, design_id) = setup();
        let row = create(&conn, &design_id, "/gone");
        assert!(DeploymentRepo::delete(&conn, &row.id).unwrap());
        assert!(!DeploymentRepo::delete(&conn, &row.id).unwrap());
    }
}
