//! Caller identity extractor.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the `X-User-Id` header. Every service call is scoped to it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Missing X-User-Id header".to_string())
        })?;
        let user = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-User-Id header encoding".to_string()))?
            .trim();
        if user.is_empty() {
            return Err(AppError::Unauthorized("Empty X-User-Id header".to_string()));
        }
        Ok(CurrentUser(user.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/api/v1/projects");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_trimmed_user_id() {
        assert_eq!(extract(Some(" user_1 ")).await.unwrap(), CurrentUser("user_1".into()));
    }

    #[tokio::test]
    async fn test_missing_or_blank_header_rejected() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(extract(Some("  ")).await, Err(AppError::Unauthorized(_))));
    }
}
