//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use kiln_types::error::ServiceError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from the project/message services.
    Service(ServiceError),
    /// Missing or unusable caller identity.
    Unauthorized(String),
    /// Malformed path or query parameter.
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError::Service(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Service(ServiceError::Validation(e)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Service(ServiceError::NotFound(what)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", capitalize(what)),
            ),
            AppError::Service(ServiceError::Queue(msg)) => {
                tracing::error!(error = %msg, "job queue unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_UNAVAILABLE",
                    "The build queue is unavailable; please try again".to_string(),
                )
            }
            AppError::Service(ServiceError::Storage(msg)) => {
                tracing::error!(error = %msg, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Storage error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(ApiResponse::<()>::error(code, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::error::ValidationError;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_status_codes() {
        assert_eq!(
            status_of(ServiceError::Validation(ValidationError::Required { field: "value" }).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::NotFound("project").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Queue("closed".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ServiceError::Storage("disk".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::Unauthorized("no user".into())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_storage_detail_not_exposed() {
        let (_, code, message) = AppError::from(ServiceError::Storage("secret path".into())).parts();
        assert_eq!(code, "STORAGE_ERROR");
        assert!(!message.contains("secret path"));
    }

    #[test]
    fn test_not_found_message() {
        let (_, _, message) = AppError::from(ServiceError::NotFound("fragment")).parts();
        assert_eq!(message, "Fragment not found");
    }
}
