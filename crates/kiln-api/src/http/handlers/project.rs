//! Project handlers for the REST API.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use kiln_types::message::Message;
use kiln_types::project::Project;

use super::parse_path_id;
use crate::http::error::AppError;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Either a bare `name`, or the first prompt as `value`.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A new project, plus its pending USER message when it was started from a
/// prompt.
#[derive(Debug, Serialize)]
pub struct CreatedProject {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// POST /api/v1/projects - Create a project owned by the caller.
///
/// With `value` the project is named after the prompt and its first run is
/// dispatched in the same call.
pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedProject>>), AppError> {
    let timer = RequestTimer::start();
    let created = match (body.value, body.name) {
        (Some(value), _) => {
            let (project, message) = state
                .message_service
                .create_project_from_prompt(&user, &value)
                .await?;
            CreatedProject {
                project,
                message: Some(message),
            }
        }
        (None, Some(name)) => CreatedProject {
            project: state.project_service.create_project(&user, &name).await?,
            message: None,
        },
        (None, None) => {
            return Err(AppError::Validation("name or value is required".into()));
        }
    };
    let id = created.project.id;

    Ok(timer
        .success(created)
        .with_link("self", format!("/api/v1/projects/{id}"))
        .with_link("messages", format!("/api/v1/projects/{id}/messages"))
        .with_status(StatusCode::CREATED))
}

/// GET /api/v1/projects - The caller's projects, most recently updated first.
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<ApiResponse<Vec<Project>>, AppError> {
    let timer = RequestTimer::start();
    let projects = state.project_service.list_projects(&user).await?;
    Ok(timer.success(projects).with_link("self", "/api/v1/projects"))
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Project>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_path_id(&id, "project")?;
    let project = state.project_service.get_project(&user, &id).await?;
    Ok(timer
        .success(project)
        .with_link("messages", format!("/api/v1/projects/{id}/messages")))
}
