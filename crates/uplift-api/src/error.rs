//! Error-to-response mapping. Every failure leaves as `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uplift_types::error::UpliftError;

/// Wrapper so domain errors can be returned straight from handlers.
pub struct ApiError(pub UpliftError);

impl From<UpliftError> for ApiError {
    fn from(err: UpliftError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            UpliftError::ScopeDenied(_) | UpliftError::AuthDenied(_) => StatusCode::FORBIDDEN,
            UpliftError::AgentNotFound(_)
            | UpliftError::TaskNotFound(_)
            | UpliftError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
            UpliftError::InvalidInput(_)
            | UpliftError::InvalidState { .. }
            | UpliftError::InvalidScope(_)
            | UpliftError::ManifestParse(_) => StatusCode::BAD_REQUEST,
            UpliftError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            UpliftError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build a bare error response outside a handler, e.g. from middleware.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                UpliftError::ScopeDenied("x".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                UpliftError::AgentNotFound("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                UpliftError::InvalidInput("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                UpliftError::QuotaExceeded("x".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (UpliftError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
            (
                UpliftError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).into_response().status(), expected);
        }
    }
}
