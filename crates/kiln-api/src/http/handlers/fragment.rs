//! Fragment handlers: the artifact itself and its explorer tree.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use kiln_core::tree::explorer::ExplorerView;
use kiln_types::fragment::Fragment;

use super::parse_path_id;
use crate::http::error::AppError;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    /// File to select; defaults to the first file.
    pub selected: Option<String>,
}

/// GET /api/v1/fragments/{id}
pub async fn get_fragment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Fragment>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_path_id(&id, "fragment")?;
    let fragment = state.message_service.get_fragment(&user, &id).await?;
    Ok(timer
        .success(fragment)
        .with_link("tree", format!("/api/v1/fragments/{id}/tree")))
}

/// GET /api/v1/fragments/{id}/tree?selected=path
pub async fn get_fragment_tree(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<ApiResponse<ExplorerView>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_path_id(&id, "fragment")?;
    let view = state
        .message_service
        .explore_fragment(&user, &id, query.selected.as_deref())
        .await?;
    Ok(timer.success(view))
}
