//! Deployment CRUD, manual execution, and execution logs.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use maestro_core::MaestroError;
use maestro_deploy::schedule::Schedule;
use maestro_deploy::service::{DeploymentPatch, NewDeployment};
use maestro_store::row_types::{DeploymentRow, DeploymentStatus, ExecutionLogRow, TriggerKind};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ApiError, DispatchApiError};
use crate::server::AppState;

/// Request body for deployment creation.
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    /// Design to bind.
    pub design_id: String,
    /// Unique dispatch path.
    pub endpoint_path: String,
    /// Initial state (default active).
    #[serde(default)]
    pub status: DeploymentStatus,
    /// Optional schedule.
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

/// Request body for deployment updates.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeploymentRequest {
    /// New endpoint path.
    #[serde(default)]
    pub endpoint_path: Option<String>,
    /// New state.
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
    /// New schedule; `null` inside the field clears it.
    #[serde(default, with = "double_option")]
    pub schedule: Option<Option<Schedule>>,
}

/// Distinguishes an absent `schedule` field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Serialized deployment row.
#[derive(Debug, Serialize)]
pub struct DeploymentResponse {
    /// Deployment id.
    pub id: String,
    /// Bound design.
    pub design_id: String,
    /// Dispatch path.
    pub endpoint_path: String,
    /// Activation state.
    pub status: DeploymentStatus,
    /// Schedule JSON, if any.
    pub schedule: Option<Schedule>,
    /// Recorded executions.
    pub execution_count: i64,
    /// Last execution time.
    pub last_execution_at: Option<String>,
}

impl TryFrom<DeploymentRow> for DeploymentResponse {
    type Error = MaestroError;

    fn try_from(row: DeploymentRow) -> Result<Self, MaestroError> {
        let schedule = row
            .schedule
            .as_deref()
            .map(Schedule::parse)
            .transpose()?;
        Ok(Self {
            id: row.id,
            design_id: row.design_id,
            endpoint_path: row.endpoint_path,
            status: row.status,
            schedule,
            execution_count: row.execution_count,
            last_execution_at: row.last_execution_at,
        })
    }
}

/// Query parameters for log listing.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Maximum rows (default 50).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Serialized execution-log row.
#[derive(Debug, Serialize)]
pub struct ExecutionLogResponse {
    /// Log id.
    pub id: String,
    /// Engine execution id.
    pub execution_id: String,
    /// Trigger kind.
    pub trigger: TriggerKind,
    /// Terminal state.
    pub status: String,
    /// Start time.
    pub started_at: String,
    /// Completion time.
    pub completed_at: Option<String>,
    /// Duration.
    pub duration_ms: Option<i64>,
    /// Failure message.
    pub error: Option<String>,
}

impl From<ExecutionLogRow> for ExecutionLogResponse {
    fn from(row: ExecutionLogRow) -> Self {
        Self {
            id: row.id,
            execution_id: row.execution_id,
            trigger: row.trigger,
            status: row.status.as_str().to_owned(),
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            error: row.error,
        }
    }
}

/// POST /api/deployments
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<DeploymentResponse>), ApiError> {
    let row = state.deployments.create(&NewDeployment {
        design_id: req.design_id,
        endpoint_path: req.endpoint_path,
        status: req.status,
        schedule: req.schedule,
    })?;
    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /api/deployments
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeploymentResponse>>, ApiError> {
    let rows = state.deployments.list()?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(row.try_into()?);
    }
    Ok(Json(out))
}

/// GET /api/deployments/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let row = state
        .deployments
        .get(&id)?
        .ok_or_else(|| MaestroError::EndpointNotFound { path: id.clone() })?;
    Ok(Json(row.try_into()?))
}

/// PUT /api/deployments/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDeploymentRequest>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let row = state.deployments.update(
        &id,
        &DeploymentPatch {
            endpoint_path: req.endpoint_path,
            status: req.status,
            schedule: req.schedule,
        },
    )?;
    Ok(Json(row.try_into()?))
}

/// DELETE /api/deployments/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.deployments.delete(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(MaestroError::EndpointNotFound { path: id }.into())
    }
}

/// POST /api/deployments/{id}/execute — manual trigger. A failed run still
/// returns the events captured up to the failure point.
#[instrument(skip_all, fields(deployment_id = %id))]
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, DispatchApiError> {
    let outcome = state
        .dispatcher
        .execute_deployment(&id, TriggerKind::Manual, input, None)
        .await?;
    Ok(Json(serde_json::to_value(outcome).map_err(|e| {
        DispatchApiError::from(MaestroError::Internal(e.to_string()))
    })?))
}

/// GET /api/deployments/{id}/logs
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ExecutionLogResponse>>, ApiError> {
    let rows = state.deployments.logs(&id, query.limit)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
