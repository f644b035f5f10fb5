//! HTTP request handlers for the REST API.

pub mod fragment;
pub mod message;
pub mod project;

use uuid::Uuid;

use crate::http::error::AppError;

/// Parse a path id, reporting malformed ids as validation errors.
pub(crate) fn parse_path_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("Invalid {what} id: '{raw}'")))
}
