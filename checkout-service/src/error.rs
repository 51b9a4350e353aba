use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Message returned to callers when the failure detail must stay server-side.
pub const GENERIC_FAILURE_MESSAGE: &str = "Backend server error while processing the payment";

pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("payment gateway credentials are not configured")]
    MisconfiguredGateway,
    #[error("payment gateway rejected the request ({status}): {message}")]
    GatewayRejected {
        status: u16,
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    VerificationFailed(String),
    #[error("internal error: {message}")]
    Internal { message: String, trace_id: Uuid },
}

impl CheckoutError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Wraps an unexpected failure; the detail is logged with a fresh trace id and never returned.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        let trace_id = Uuid::new_v4();
        let message = err.to_string();
        tracing::error!(%trace_id, error = %message, "Unexpected checkout failure");
        Self::Internal { message, trace_id }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidRequest(message) => ApiError::bad_request("invalid_request", message),
            CheckoutError::MisconfiguredGateway => ApiError::Internal {
                code: "gateway_misconfigured",
                trace_id: None,
                message: "Payment gateway credentials are not configured. Check the server log for setup instructions.".into(),
                error: None,
                details: None,
            },
            CheckoutError::GatewayRejected { status, message, details } => ApiError::Upstream {
                // Only error statuses are relayed verbatim.
                status: StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                code: "gateway_rejected",
                message,
                details,
            },
            CheckoutError::VerificationFailed(message) => ApiError::Internal {
                code: "verification_failed",
                trace_id: None,
                message,
                error: None,
                details: None,
            },
            CheckoutError::Internal { trace_id, .. } => {
                ApiError::internal(GENERIC_FAILURE_MESSAGE, Some(trace_id))
            }
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
