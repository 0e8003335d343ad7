use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::AnchorError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Rejection type shared by every handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a crate error to its HTTP status.
pub fn api_error(err: AnchorError) -> ApiError {
    let status = match &err {
        AnchorError::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AnchorError::NotFound(_) => StatusCode::NOT_FOUND,
        AnchorError::Config(_) => StatusCode::BAD_REQUEST,
        AnchorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AnchorError::Connection(_)
        | AnchorError::LedgerRead(_)
        | AnchorError::LedgerWrite(_)
        | AnchorError::Signing(_) => StatusCode::BAD_GATEWAY,
        AnchorError::Database(_) | AnchorError::Serialization(_) | AnchorError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            api_error(AnchorError::LedgerUnavailable).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            api_error(AnchorError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            api_error(AnchorError::Database("down".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            api_error(AnchorError::Timeout {
                operation: "get",
                after: Duration::from_secs(30)
            })
            .0,
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_unavailable_message() {
        let (_, Json(body)) = api_error(AnchorError::LedgerUnavailable);
        assert_eq!(body.error, "Ledger not configured");
    }
}
