#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

/// Body text returned for every non-validation failure. Callers never see
/// gateway or storage details.
#[cfg(feature = "server")]
const GENERIC_ERROR_MESSAGE: &str =
    "An unexpected error occurred while processing your request.";

#[derive(Error, Debug)]
pub enum LookupError {
    /// Input rejected before any collaborator was touched. The message is
    /// user-facing and returned verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl LookupError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Validation(_) => "validation",
            LookupError::Gateway(_) => "gateway",
            LookupError::Store(_) => "store",
            LookupError::Config(_) => "config",
        }
    }
}

impl From<sqlx::Error> for LookupError {
    fn from(err: sqlx::Error) -> Self {
        LookupError::Store(err.to_string())
    }
}

#[cfg(feature = "server")]
impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            LookupError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
