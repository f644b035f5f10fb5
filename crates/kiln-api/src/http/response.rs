//! Envelope response format for all API responses.
//!
//! Every response is wrapped in a consistent envelope:
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "..." }
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    /// Always empty on success.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,

    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    pub timestamp: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Per-request id and timer.
pub struct RequestTimer {
    request_id: String,
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            start: Instant::now(),
        }
    }

    pub fn success<T: Serialize>(self, data: T) -> ApiResponse<T> {
        let elapsed = self.start.elapsed().as_millis() as u64;
        ApiResponse::success(data, self.request_id, elapsed)
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, request_id: String, response_time_ms: u64) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta {
                request_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                response_time_ms,
            },
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    /// Add a HATEOAS link.
    pub fn with_link(mut self, rel: &str, href: impl Into<String>) -> Self {
        self.links.insert(rel.to_string(), href.into());
        self
    }

    /// Respond with `status` instead of 200.
    pub fn with_status(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

impl ApiResponse<()> {
    /// Create an error response (no data).
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            data: None,
            meta: ApiMeta {
                request_id: uuid::Uuid::now_v7().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                response_time_ms: 0,
            },
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            }],
            links: HashMap::new(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let resp = RequestTimer::start()
            .success(serde_json::json!({"id": "p1"}))
            .with_link("self", "/api/v1/projects/p1");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["data"]["id"], "p1");
        assert!(json.get("errors").is_none());
        assert_eq!(json["_links"]["self"], "/api/v1/projects/p1");
        assert!(!json["meta"]["request_id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::<()>::error("NOT_FOUND", "Project not found")).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["code"], "NOT_FOUND");
        assert_eq!(json["errors"][0]["message"], "Project not found");
    }
}
