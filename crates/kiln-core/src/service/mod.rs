//! Application services behind the CLI and REST surfaces.
//!
//! Services enforce ownership and validation, then delegate to repository
//! ports. They are generic over those ports -- kiln-core never depends on
//! kiln-infra.

pub mod dispatch;
pub mod message;
pub mod project;

use kiln_types::error::ServiceError;
use kiln_types::project::Project;
use uuid::Uuid;

use crate::repository::project::ProjectRepository;

/// Load `project_id` if `owner_id` owns it.
///
/// Missing and foreign projects are indistinguishable to the caller.
pub(crate) async fn owned_project<P: ProjectRepository>(
    projects: &P,
    owner_id: &str,
    project_id: &Uuid,
) -> Result<Project, ServiceError> {
    match projects.get_project(project_id).await? {
        Some(project) if project.is_owned_by(owner_id) => Ok(project),
        _ => Err(ServiceError::NotFound("project")),
    }
}
