//! API response types
//!
//! Every JSON endpoint answers with one of two envelopes:
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": { "code": "NOT_FOUND", "message": "..." } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn success_with_meta(data: T, meta: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            meta: Some(meta),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable code such as `VALIDATION_ERROR`
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let value = serde_json::to_value(ApiResponse::success(json!({ "index_id": "abc" }))).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "index_id": "abc" } }));
    }

    #[test]
    fn test_meta_is_included_when_set() {
        let value =
            serde_json::to_value(ApiResponse::success_with_meta(1, json!({ "worker": "w1" })))
                .unwrap();
        assert_eq!(value["meta"]["worker"], "w1");
    }

    #[test]
    fn test_error_envelope() {
        let value = serde_json::to_value(ErrorResponse::new("NOT_FOUND", "gone")).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "error": { "code": "NOT_FOUND", "message": "gone" } })
        );

        let value = serde_json::to_value(ErrorResponse::with_details(
            "VALIDATION_ERROR",
            "bad",
            json!({ "field": "url" }),
        ))
        .unwrap();
        assert_eq!(value["error"]["details"]["field"], "url");
    }
}
