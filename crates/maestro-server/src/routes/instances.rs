//! Instance lifecycle endpoints (thin wrapper over the manager; the richer
//! interactive surface lives in the outer WS layer).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use maestro_core::MaestroError;
use maestro_store::row_types::{InstanceRow, InstanceStatus};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::server::AppState;
use crate::stream::instance_stream;

/// Request body for instance spawning.
#[derive(Debug, Deserialize)]
pub struct SpawnRequest {
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning user (credential resolution).
    pub user_id: String,
    /// Repository to clone into the shared workspace.
    #[serde(default)]
    pub git_repo: Option<String>,
}

/// Request body for writes to the PTY.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Text to deliver.
    pub text: String,
}

/// Serialized instance row plus the authoritative in-memory status.
#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    /// Instance id.
    pub id: String,
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning user.
    pub user_id: String,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// Shared workspace path.
    pub workspace_path: Option<String>,
    /// Aggregated tokens.
    pub total_tokens: i64,
    /// Aggregated cost.
    pub total_cost_usd: f64,
    /// Aggregated tool calls.
    pub tool_call_count: i64,
    /// Accumulated running wall time.
    pub running_ms: i64,
}

impl InstanceResponse {
    fn from_row(row: InstanceRow, live_status: Option<InstanceStatus>) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            user_id: row.user_id,
            status: live_status.unwrap_or(row.status),
            workspace_path: row.workspace_path,
            total_tokens: row.total_tokens,
            total_cost_usd: row.total_cost_usd,
            tool_call_count: row.tool_call_count,
            running_ms: row.running_ms,
        }
    }
}

/// Query parameters for instance listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Workflow scope.
    pub workflow_id: String,
    /// Optional status filter.
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

/// POST /api/instances
#[instrument(skip_all, fields(workflow_id = %req.workflow_id))]
pub async fn spawn(
    State(state): State<AppState>,
    Json(req): Json<SpawnRequest>,
) -> Result<(StatusCode, Json<InstanceResponse>), ApiError> {
    let row = state
        .instances
        .spawn(&req.workflow_id, &req.user_id, req.git_repo.as_deref())
        .await?;
    let status = state.instances.status(&row.id).ok();
    Ok((
        StatusCode::CREATED,
        Json(InstanceResponse::from_row(row, status)),
    ))
}

/// POST /api/instances/{id}/send
pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<StatusCode, ApiError> {
    state.instances.send(&id, &req.text)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/instances/{id}/interrupt
pub async fn interrupt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.instances.interrupt(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/instances/{id}/stop
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.instances.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/instances/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InstanceResponse>, ApiError> {
    let row = state
        .instances
        .get(&id)?
        .ok_or_else(|| MaestroError::Instance {
            instance_id: id.clone(),
            operation: "lookup".into(),
            message: "unknown instance".into(),
        })?;
    let status = state.instances.status(&id).ok();
    Ok(Json(InstanceResponse::from_row(row, status)))
}

/// GET /api/instances?workflow_id=...
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InstanceResponse>>, ApiError> {
    let rows = state
        .instances
        .list_for_workflow(&query.workflow_id, query.status)?;
    Ok(Json(
        rows.into_iter()
            .map(|row| {
                let status = state.instances.status(&row.id).ok();
                InstanceResponse::from_row(row, status)
            })
            .collect(),
    ))
}

/// GET /api/instances/{id}/events — NDJSON stream of observed events.
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let rx = state.instances.subscribe(&id)?;
    Ok(instance_stream(rx))
}
