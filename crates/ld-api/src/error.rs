use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ld_infra::{Error as InfraError, ProvisionError, ReconcileError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

fn infra_status(err: &InfraError) -> StatusCode {
    match err {
        InfraError::NotFound { .. } => StatusCode::NOT_FOUND,
        InfraError::Constraint(_) => StatusCode::CONFLICT,
        InfraError::UnsupportedOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InfraError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        InfraError::InvalidId(_) => StatusCode::BAD_REQUEST,
        InfraError::Remote(_) | InfraError::InvariantViolation(_) => StatusCode::BAD_GATEWAY,
        InfraError::MissingEnv(_) | InfraError::InvalidEnv { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message }),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": message }),
            ),
            ApiError::Infra(e) => (infra_status(&e), serde_json::json!({ "error": message })),
            // Interrupted runs report what they already changed remotely.
            ApiError::Provision(e) => (
                infra_status(&e.source),
                serde_json::json!({
                    "error": message,
                    "step": e.step,
                    "committed": e.committed,
                }),
            ),
            ApiError::Reconcile(e) => (
                infra_status(&e.source),
                serde_json::json!({
                    "error": message,
                    "step": e.step,
                    "committed": e.committed,
                }),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }
        (status, axum::Json(body)).into_response()
    }
}
