//! Project repository trait definition.

use kiln_types::error::RepositoryError;
use kiln_types::project::Project;
use uuid::Uuid;

/// Repository trait for project persistence.
pub trait ProjectRepository: Send + Sync {
    /// Persist a new project.
    fn create_project(
        &self,
        project: &Project,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a project by ID.
    fn get_project(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Project>, RepositoryError>> + Send;

    /// List projects owned by `owner_id`, most recently updated first.
    fn list_projects(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Project>, RepositoryError>> + Send;
}
