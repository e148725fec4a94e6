//! Design CRUD, validation, and execution.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use maestro_core::MaestroError;
use maestro_core::design::Design;
use maestro_engine::EventEmitter;
use maestro_store::repositories::DesignRepo;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::routes::resolve_options;
use crate::server::AppState;
use crate::stream::execution_stream;

/// Request body for design creation.
#[derive(Debug, Deserialize)]
pub struct CreateDesignRequest {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// The design.
    pub design: Design,
}

/// Response body for persisted designs.
#[derive(Debug, Serialize)]
pub struct DesignResponse {
    /// Design id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Version counter.
    pub version: i64,
    /// The design definition.
    pub design: Design,
}

/// Request body for design execution.
#[derive(Debug, Deserialize)]
pub struct ExecuteDesignRequest {
    /// The design to run (inline, not persisted).
    pub design: Design,
    /// Initial task fed to source blocks.
    #[serde(default)]
    pub initial_task: String,
    /// Invoking user.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/designs — persist a validated design.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateDesignRequest>,
) -> Result<(StatusCode, Json<DesignResponse>), ApiError> {
    req.design.validate()?;
    let conn = state
        .pool
        .get()
        .map_err(|e| MaestroError::Storage(e.to_string()))?;
    let row = DesignRepo::create(&conn, req.name.as_deref(), &req.design)
        .map_err(MaestroError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(DesignResponse {
            id: row.id,
            name: row.name,
            version: row.version,
            design: req.design,
        }),
    ))
}

/// GET /api/designs — list persisted designs.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<DesignResponse>>, ApiError> {
    let conn = state
        .pool
        .get()
        .map_err(|e| MaestroError::Storage(e.to_string()))?;
    let rows = DesignRepo::list(&conn).map_err(MaestroError::from)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let design: Design =
            serde_json::from_str(&row.definition).map_err(|e| MaestroError::Internal(e.to_string()))?;
        out.push(DesignResponse {
            id: row.id,
            name: row.name,
            version: row.version,
            design,
        });
    }
    Ok(Json(out))
}

/// GET /api/designs/{id} — fetch one design.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DesignResponse>, ApiError> {
    let conn = state
        .pool
        .get()
        .map_err(|e| MaestroError::Storage(e.to_string()))?;
    let row = DesignRepo::get(&conn, &id)
        .map_err(MaestroError::from)?
        .ok_or_else(|| MaestroError::EndpointNotFound { path: id.clone() })?;
    let design: Design =
        serde_json::from_str(&row.definition).map_err(|e| MaestroError::Internal(e.to_string()))?;
    Ok(Json(DesignResponse {
        id: row.id,
        name: row.name,
        version: row.version,
        design,
    }))
}

/// POST /api/designs/validate — acceptance-time validation only.
pub async fn validate(Json(design): Json<Design>) -> Result<StatusCode, ApiError> {
    design.validate()?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/designs/execute — run an inline design, stream its events.
#[instrument(skip_all)]
pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteDesignRequest>,
) -> Result<Response, ApiError> {
    req.design.validate()?;

    let opts = resolve_options(&state, req.user_id.as_deref()).await?;
    let emitter = EventEmitter::new();
    let rx = emitter.subscribe();
    let cancel = state.shutdown.token();
    let engine = state.engine.clone();

    let handle = tokio::spawn(async move {
        let _ = engine
            .execute(&req.design, &req.initial_task, &opts, &emitter, &cancel)
            .await;
    });
    state.shutdown.register_task(handle);

    Ok(execution_stream(rx))
}
