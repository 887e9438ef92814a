//! Non-throwing action envelope.
//!
//! Gateway calls return `ApiResult<T>`. Action endpoints and in-process
//! callers that want a plain `{success, data, error}` shape convert it into
//! an `ActionResult<T>`, which always serializes and never carries both
//! `data` and `error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{ApiResult, ErrorCode};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }

    /// HTTP status the envelope is sent with.
    pub fn status_code(&self) -> StatusCode {
        match self.code {
            Some(code) if !self.success => code.status_code(),
            _ => StatusCode::OK,
        }
    }
}

impl<T> From<ApiResult<T>> for ActionResult<T> {
    fn from(result: ApiResult<T>) -> Self {
        match result {
            Ok(data) => ActionResult::ok(data),
            Err(e) => ActionResult::err(e.code, e.message),
        }
    }
}

impl<T: Serialize> IntoResponse for ActionResult<T> {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_omits_error() {
        let envelope = ActionResult::ok(json!({"id": 1}));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json, json!({"success": true, "data": {"id": 1}}));
    }

    #[test]
    fn test_error_envelope_from_result() {
        let result: ApiResult<u32> = Err(ApiError::state_conflict("invoice already completed"));
        let envelope = ActionResult::from(result);
        assert!(!envelope.is_ok());
        assert_eq!(envelope.status_code(), StatusCode::CONFLICT);

        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"], json!("invoice already completed"));
        assert_eq!(json["code"], json!("STATE_CONFLICT"));
        assert!(json.get("data").is_none());
    }
}
