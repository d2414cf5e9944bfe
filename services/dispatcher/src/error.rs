use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Dispatcher error variants.
///
/// Queue-driven commands have no synchronous error channel: the listener logs
/// these and keeps consuming. Only the HTTP enqueue API turns them into
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("invalid or missing attribute: {0}")]
    Validation(&'static str),
    #[error("push provider error: {0}")]
    Provider(anyhow::Error),
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl DispatcherError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Provider(_) => "PROVIDER",
            Self::Transport(_) => "TRANSPORT",
            Self::Config(_) => "CONFIG",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn provider(err: impl Into<anyhow::Error>) -> Self {
        Self::Provider(err.into())
    }

    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }
}

impl IntoResponse for DispatcherError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
