use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// JSON envelope shared by every error response: `{"success": false, "message": ..., ...}`.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")] pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: String },
    NotFound { code: &'static str, message: String },
    /// Error relayed from an upstream service; keeps the upstream status code.
    Upstream { status: StatusCode, code: &'static str, message: String, details: Option<Value> },
    Internal { code: &'static str, trace_id: Option<Uuid>, message: String, error: Option<String>, details: Option<Value> },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { code, message: message.into() }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound { code, message: message.into() }
    }

    pub fn internal(message: impl Into<String>, trace_id: Option<Uuid>) -> Self {
        Self::Internal { code: "internal_error", trace_id, message: message.into(), error: None, details: None }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Upstream { code, .. }
            | ApiError::Internal { code, .. } => code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let body = match self {
            ApiError::BadRequest { code, message } | ApiError::NotFound { code, message } => ErrorBody {
                success: false, message, code: code.into(), details: None, error: None, trace_id: None,
            },
            ApiError::Upstream { code, message, details, .. } => ErrorBody {
                success: false, message, code: code.into(), details, error: None, trace_id: None,
            },
            ApiError::Internal { code, trace_id, message, error, details } => ErrorBody {
                success: false, message, code: code.into(), details, error, trace_id,
            },
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
