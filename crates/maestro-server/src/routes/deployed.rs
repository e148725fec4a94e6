//! Dynamic endpoint dispatch: `POST /api/deployed/{*path}`.

use axum::Json;
use axum::extract::{Path, State};
use maestro_deploy::ExecutionOutcome;
use tracing::instrument;

use crate::error::DispatchApiError;
use crate::server::AppState;

/// POST /api/deployed/{*path} — resolve the path to an active deployment
/// and execute it with the request body as input. Matching is exact, and a
/// failed run still returns the events captured up to the failure point.
#[instrument(skip_all, fields(path))]
pub async fn dispatch(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(input): Json<serde_json::Value>,
) -> Result<Json<ExecutionOutcome>, DispatchApiError> {
    // The wildcard capture drops the leading slash; endpoint paths keep it.
    let endpoint_path = format!("/{path}");
    let outcome = state
        .dispatcher
        .dispatch_path(&endpoint_path, input, None)
        .await?;
    Ok(Json(outcome))
}
