//! REST API Error Types
//!
//! Maps protocol failures to HTTP statuses. The body uses the same `error`
//! object as failed statements so clients parse one shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::dto::{QueryErrorDto, StatementResponse};
use crate::protocol::ServerError;

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: QueryErrorDto,
}

impl RestError {
    pub fn new(status: StatusCode, error_name: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: QueryErrorDto::new(message, error_name, status.is_client_error()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "GENERIC_INTERNAL_ERROR", message)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = StatementResponse {
            error: Some(self.error),
            ..StatementResponse::default()
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServerError> for RestError {
    fn from(err: ServerError) -> Self {
        let message = err.to_string();
        match err {
            ServerError::QueryNotFound { .. } => RestError::not_found(message),
            ServerError::TokenExpired => {
                RestError::new(StatusCode::NOT_FOUND, "PAGE_EXPIRED", message)
            }
            ServerError::ServerOverloaded { .. } => RestError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVER_OVERLOADED",
                message,
            ),
            ServerError::ShuttingDown => RestError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVER_SHUTTING_DOWN",
                message,
            ),
            ServerError::InternalError { .. } => RestError::internal(message),
        }
    }
}
