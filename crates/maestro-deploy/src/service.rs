//! Deployment CRUD with scheduler consistency.
//!
//! Every mutation keeps the invariant: an active deployment with an enabled
//! schedule holds exactly one scheduler registration, everything else holds
//! zero. Scheduler mutations follow remove-then-add; a failed registration
//! rolls the datastore change back.

use std::sync::Arc;
use std::sync::LazyLock;

use maestro_core::MaestroError;
use maestro_store::ConnectionPool;
use maestro_store::errors::StoreError;
use maestro_store::repositories::deployment::{CreateDeploymentOptions, UpdateDeploymentOptions};
use maestro_store::repositories::{DeploymentRepo, DesignRepo, ExecutionLogRepo};
use maestro_store::row_types::{DeploymentRow, DeploymentStatus, ExecutionLogRow};
use regex::Regex;
use tracing::{instrument, warn};

use crate::schedule::Schedule;
use crate::scheduler::Scheduler;

static ENDPOINT_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9/_-]+$").unwrap());

/// Whether `path` is a valid dynamic endpoint path.
#[must_use]
pub fn validate_endpoint_path(path: &str) -> bool {
    ENDPOINT_PATH_RE.is_match(path)
}

/// Fields accepted when creating a deployment.
pub struct NewDeployment {
    /// Design to bind.
    pub design_id: String,
    /// Unique dispatch path.
    pub endpoint_path: String,
    /// Initial state.
    pub status: DeploymentStatus,
    /// Optional schedule.
    pub schedule: Option<Schedule>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Default)]
pub struct DeploymentPatch {
    /// New endpoint path.
    pub endpoint_path: Option<String>,
    /// New state.
    pub status: Option<DeploymentStatus>,
    /// New schedule (`Some(None)` clears it).
    pub schedule: Option<Option<Schedule>>,
}

/// Deployment CRUD bound to the scheduler.
pub struct DeploymentService {
    pool: ConnectionPool,
    scheduler: Arc<Scheduler>,
}

impl DeploymentService {
    /// Build a service.
    #[must_use]
    pub fn new(pool: ConnectionPool, scheduler: Arc<Scheduler>) -> Self {
        Self { pool, scheduler }
    }

    fn conn(&self) -> Result<maestro_store::PooledConnection, MaestroError> {
        self.pool
            .get()
            .map_err(|e| MaestroError::Storage(e.to_string()))
    }

    /// Create a deployment; registers its schedule when applicable.
    #[instrument(skip_all, fields(endpoint_path = %new.endpoint_path))]
    pub fn create(&self, new: &NewDeployment) -> Result<DeploymentRow, MaestroError> {
        if !validate_endpoint_path(&new.endpoint_path) {
            return Err(MaestroError::Validation(format!(
                "endpoint path {} must match ^/[A-Za-z0-9/_-]+$",
                new.endpoint_path
            )));
        }
        if let Some(schedule) = &new.schedule {
            schedule.validate()?;
        }
        let schedule_json = new
            .schedule
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| MaestroError::Internal(e.to_string()))?;

        let row = {
            let conn = self.conn()?;
            // Reject unknown designs up front with a caller error.
            let _ = DesignRepo::get(&conn, &new.design_id)
                .map_err(MaestroError::from)?
                .ok_or_else(|| {
                    MaestroError::Validation(format!("unknown design {}", new.design_id))
                })?;
            DeploymentRepo::create(
                &conn,
                &CreateDeploymentOptions {
                    design_id: &new.design_id,
                    endpoint_path: &new.endpoint_path,
                    status: new.status,
                    schedule: schedule_json.as_deref(),
                },
            )
            .map_err(map_conflict(&new.endpoint_path))?
        };

        if let Err(e) = self.scheduler.register(&row) {
            // Compensation: the deployment must not exist half-registered.
            warn!(deployment_id = %row.id, error = %e, "registration failed; rolling back create");
            if let Ok(conn) = self.conn() {
                let _ = DeploymentRepo::delete(&conn, &row.id);
            }
            return Err(e);
        }
        Ok(row)
    }

    /// Update a deployment. The scheduler registration is removed first and
    /// re-added for the new state; on registration failure the previous row
    /// is restored (and re-registered).
    #[instrument(skip_all, fields(deployment_id))]
    pub fn update(
        &self,
        deployment_id: &str,
        patch: &DeploymentPatch,
    ) -> Result<DeploymentRow, MaestroError> {
        if let Some(path) = &patch.endpoint_path {
            if !validate_endpoint_path(path) {
                return Err(MaestroError::Validation(format!(
                    "endpoint path {path} must match ^/[A-Za-z0-9/_-]+$"
                )));
            }
        }
        if let Some(Some(schedule)) = &patch.schedule {
            schedule.validate()?;
        }

        let previous = {
            let conn = self.conn()?;
            DeploymentRepo::get(&conn, deployment_id)
                .map_err(MaestroError::from)?
                .ok_or_else(|| MaestroError::EndpointNotFound {
                    path: deployment_id.to_owned(),
                })?
        };

        let _ = self.scheduler.deregister(deployment_id);

        let schedule_json = match &patch.schedule {
            Some(Some(schedule)) => Some(Some(
                serde_json::to_string(schedule)
                    .map_err(|e| MaestroError::Internal(e.to_string()))?,
            )),
            Some(None) => Some(None),
            None => None,
        };
        let updated = {
            let conn = self.conn()?;
            DeploymentRepo::update(
                &conn,
                deployment_id,
                &UpdateDeploymentOptions {
                    endpoint_path: patch.endpoint_path.as_deref(),
                    status: patch.status,
                    schedule: schedule_json
                        .as_ref()
                        .map(|inner| inner.as_deref()),
                },
            )
            .map_err(map_conflict(
                patch.endpoint_path.as_deref().unwrap_or_default(),
            ))
        };

        let updated = match updated {
            Ok(row) => row,
            Err(e) => {
                // Datastore refused; restore the previous registration.
                let _ = self.scheduler.register(&previous);
                return Err(e);
            }
        };

        if let Err(e) = self.scheduler.register(&updated) {
            warn!(deployment_id, error = %e, "registration failed; restoring previous deployment");
            if let Ok(conn) = self.conn() {
                let _ = DeploymentRepo::update(
                    &conn,
                    deployment_id,
                    &UpdateDeploymentOptions {
                        endpoint_path: Some(&previous.endpoint_path),
                        status: Some(previous.status),
                        schedule: Some(previous.schedule.as_deref()),
                    },
                );
            }
            let _ = self.scheduler.register(&previous);
            return Err(e);
        }
        Ok(updated)
    }

    /// Delete a deployment; its registration goes first.
    pub fn delete(&self, deployment_id: &str) -> Result<bool, MaestroError> {
        let _ = self.scheduler.deregister(deployment_id);
        let conn = self.conn()?;
        DeploymentRepo::delete(&conn, deployment_id).map_err(MaestroError::from)
    }

    /// Get one deployment.
    pub fn get(&self, deployment_id: &str) -> Result<Option<DeploymentRow>, MaestroError> {
        let conn = self.conn()?;
        DeploymentRepo::get(&conn, deployment_id).map_err(MaestroError::from)
    }

    /// List all deployments.
    pub fn list(&self) -> Result<Vec<DeploymentRow>, MaestroError> {
        let conn = self.conn()?;
        DeploymentRepo::list(&conn).map_err(MaestroError::from)
    }

    /// A deployment's execution logs, newest first.
    pub fn logs(
        &self,
        deployment_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRow>, MaestroError> {
        let conn = self.conn()?;
        ExecutionLogRepo::list_for_deployment(&conn, deployment_id, limit)
            .map_err(MaestroError::from)
    }
}

fn map_conflict(path: &str) -> impl Fn(StoreError) -> MaestroError + '_ {
    move |err| match err {
        StoreError::Constraint(reason) => MaestroError::EndpointConflict {
            path: path.to_owned(),
            reason,
        },
        other => other.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
