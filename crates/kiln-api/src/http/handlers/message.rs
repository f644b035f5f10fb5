//! Conversation handlers: accept a prompt, list a project's messages.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use kiln_types::message::Message;

use super::parse_path_id;
use crate::http::error::AppError;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    /// The prompt text.
    pub value: String,
}

/// POST /api/v1/projects/{id}/messages - Accept a prompt.
///
/// Responds 202 with the pending USER message; the assistant reply shows up
/// in the message list once the run finishes.
pub async fn create_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), AppError> {
    let timer = RequestTimer::start();
    let project_id = parse_path_id(&project_id, "project")?;
    let message = state
        .message_service
        .create(&user, &project_id, &body.value)
        .await?;

    Ok(timer
        .success(message)
        .with_link("messages", format!("/api/v1/projects/{project_id}/messages"))
        .with_status(StatusCode::ACCEPTED))
}

/// GET /api/v1/projects/{id}/messages - The conversation in creation order.
pub async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<ApiResponse<Vec<Message>>, AppError> {
    let timer = RequestTimer::start();
    let project_id = parse_path_id(&project_id, "project")?;
    let messages = state.message_service.get_many(&user, &project_id).await?;
    Ok(timer
        .success(messages)
        .with_link("self", format!("/api/v1/projects/{project_id}/messages")))
}
