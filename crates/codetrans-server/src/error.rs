//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use codetrans_core::ValidationErrors;
use serde_json::json;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Per-field problems; rendered as the whole body when present.
    pub fields: Option<ValidationErrors>,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            fields: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
            fields: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.fields {
            Some(fields) => (self.status, Json(fields)).into_response(),
            None => (self.status, Json(json!({ "error": self.message }))).into_response(),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: errors.to_string(),
            fields: Some(errors),
        }
    }
}

impl From<codetrans_core::Error> for ApiError {
    fn from(err: codetrans_core::Error) -> Self {
        if err.is_client_error() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn core_errors_map_to_status_codes() {
        let timeout: ApiError = codetrans_core::Error::Timeout(Duration::from_secs(1)).into();
        assert_eq!(timeout.status, StatusCode::INTERNAL_SERVER_ERROR);

        let invalid: ApiError = codetrans_core::Error::InvalidInput("bad".to_string()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert!(invalid.fields.is_none());
    }

    #[test]
    fn validation_errors_keep_field_detail() {
        let mut errors = ValidationErrors::default();
        errors.add("code", "This field is required.");
        let err: ApiError = errors.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.fields.unwrap().contains("code"));
    }
}
