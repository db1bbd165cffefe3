use ante_agent::AgentError;
use ante_core::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP status through the `anyhow::Error` chain.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Error type for HTTP handlers. Renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    fn status(&self) -> StatusCode {
        if let Some(s) = self.0.downcast_ref::<StatusError>() {
            return s.status;
        }
        if let Some(e) = self.0.downcast_ref::<CoreError>() {
            return match e {
                CoreError::RunNotFound(_) | CoreError::SnapshotNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                CoreError::DuplicateEntry { .. } => StatusCode::CONFLICT,
                CoreError::SeedMismatch { .. }
                | CoreError::InvalidState(_)
                | CoreError::UnknownObjectKind(_)
                | CoreError::UnknownProvider(_)
                | CoreError::InvalidRunId(_) => StatusCode::BAD_REQUEST,
                CoreError::MissingPreviousTurn { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::Store(_) | CoreError::Io(_) | CoreError::Yaml(_) | CoreError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        if let Some(e) = self.0.downcast_ref::<AgentError>() {
            return match e {
                AgentError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
                AgentError::NotConfigured(_) | AgentError::MissingCredentials { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::BAD_GATEWAY,
            };
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
