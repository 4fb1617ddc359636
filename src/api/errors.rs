// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    ValidationError {
        field: String,
        message: String,
    },
    /// Ingress payload does not match the expected structure
    MalformedPayload(String),
    ServiceUnavailable(String),
    InternalError(String),
    Timeout,
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::MalformedPayload(msg) => ("malformed_payload", msg.clone(), None),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
            ApiError::Timeout => ("timeout", "Request timed out".to_string(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::MalformedPayload(_) => 400,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::InternalError(_) => 500,
            ApiError::Timeout => 504,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response(None))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ApiError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(ApiError::MalformedPayload("x".into()).status_code(), 400);
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(ApiError::InternalError("x".into()).status_code(), 500);
        assert_eq!(ApiError::Timeout.status_code(), 504);
    }

    #[test]
    fn test_validation_error_carries_field() {
        let err = ApiError::ValidationError {
            field: "image".to_string(),
            message: "image must not be empty".to_string(),
        };
        let response = err.to_response(Some("req-1".to_string()));
        assert_eq!(response.error_type, "validation_error");
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
        let details = response.details.unwrap();
        assert_eq!(details["field"], "image");
    }

    #[test]
    fn test_malformed_payload_response() {
        let err = ApiError::MalformedPayload("missing annotations".to_string());
        let response = err.to_response(None);
        assert_eq!(response.error_type, "malformed_payload");
        assert_eq!(response.message, "missing annotations");
    }

    #[test]
    fn test_display() {
        let err = ApiError::MalformedPayload("bad".to_string());
        assert_eq!(err.to_string(), "Malformed payload: bad");
    }
}
