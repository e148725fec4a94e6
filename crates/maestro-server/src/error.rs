//! HTTP mapping for core errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use maestro_core::{ExecutionEvent, MaestroError};
use maestro_deploy::DispatchError;
use serde::Serialize;

/// JSON error body carrying the textual boundary kind.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Boundary error kind (`DesignCyclic`, `EndpointNotFound`, ...).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Events captured before the failure (deployment dispatch only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<ExecutionEvent>,
}

/// Wrapper making [`MaestroError`] an axum response.
#[derive(Debug)]
pub struct ApiError(pub MaestroError);

impl From<MaestroError> for ApiError {
    fn from(err: MaestroError) -> Self {
        Self(err)
    }
}

/// Wrapper delivering a failed dispatch together with its partial trace —
/// dispatch has no streaming surface, so this is the caller's only view of
/// the events up to the failure point.
#[derive(Debug)]
pub struct DispatchApiError(pub DispatchError);

impl From<DispatchError> for DispatchApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl From<MaestroError> for DispatchApiError {
    fn from(err: MaestroError) -> Self {
        Self(DispatchError::from(err))
    }
}

impl IntoResponse for DispatchApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0.error);
        let body = ErrorBody {
            kind: self.0.error.kind().to_owned(),
            message: self.0.error.to_string(),
            trace: self.0.trace,
        };
        (status, Json(body)).into_response()
    }
}

fn status_for(err: &MaestroError) -> StatusCode {
    match err {
        MaestroError::Validation(_)
        | MaestroError::DesignCyclic { .. }
        | MaestroError::ScheduleInvalid(_) => StatusCode::BAD_REQUEST,
        MaestroError::EndpointNotFound { .. } => StatusCode::NOT_FOUND,
        MaestroError::EndpointConflict { .. } => StatusCode::CONFLICT,
        MaestroError::CredentialUnavailable { .. } => StatusCode::PRECONDITION_FAILED,
        MaestroError::SubprocessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MaestroError::Instance { .. } => StatusCode::NOT_FOUND,
        MaestroError::AgentFailed { .. }
        | MaestroError::RoutingUndecided { .. }
        | MaestroError::WorkspaceProvisionFailed(_)
        | MaestroError::Cancelled
        | MaestroError::Storage(_)
        | MaestroError::Io(_)
        | MaestroError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            kind: self.0.kind().to_owned(),
            message: self.0.to_string(),
            trace: Vec::new(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_omits_empty_trace() {
        let body = ErrorBody {
            kind: "AgentFailed".into(),
            message: "boom".into(),
            trace: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn error_body_carries_partial_trace() {
        let body = ErrorBody {
            kind: "AgentFailed".into(),
            message: "boom".into(),
            trace: vec![ExecutionEvent::BlockStarted {
                execution_id: "e1".into(),
                block_id: "b1".into(),
                kind: "sequential".into(),
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["trace"][0]["type"], "block_started");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&MaestroError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&MaestroError::EndpointNotFound { path: "/x".into() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MaestroError::EndpointConflict {
                path: "/x".into(),
                reason: "taken".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&MaestroError::SubprocessTimeout { timeout_secs: 1 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&MaestroError::Cancelled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
