//! Project management service.

use kiln_types::error::{ServiceError, ValidationError};
use kiln_types::project::Project;
use uuid::Uuid;

use crate::repository::project::ProjectRepository;

/// Longest accepted project name, in characters.
pub const MAX_PROJECT_NAME_CHARS: usize = 100;

pub struct ProjectService<P: ProjectRepository> {
    projects: P,
}

impl<P: ProjectRepository> ProjectService<P> {
    pub fn new(projects: P) -> Self {
        Self { projects }
    }

    pub fn repository(&self) -> &P {
        &self.projects
    }

    /// Create a project owned by `owner_id`.
    pub async fn create_project(&self, owner_id: &str, name: &str) -> Result<Project, ServiceError> {
        let project = new_project(owner_id, name)?;
        self.projects.create_project(&project).await?;
        tracing::info!(project_id = %project.id, owner_id, "project created");
        Ok(project)
    }

    /// Get a project the caller owns.
    pub async fn get_project(&self, owner_id: &str, id: &Uuid) -> Result<Project, ServiceError> {
        super::owned_project(&self.projects, owner_id, id).await
    }

    pub async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, ServiceError> {
        Ok(self.projects.list_projects(owner_id).await?)
    }
}

/// Validate the owner and name and build the project record.
pub(crate) fn new_project(owner_id: &str, name: &str) -> Result<Project, ServiceError> {
    if owner_id.trim().is_empty() {
        return Err(ValidationError::Required { field: "owner_id" }.into());
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Required { field: "name" }.into());
    }
    if name.chars().count() > MAX_PROJECT_NAME_CHARS {
        return Err(ValidationError::TooLong {
            field: "name",
            max: MAX_PROJECT_NAME_CHARS,
        }
        .into());
    }
    Ok(Project::new(owner_id, name))
}

/// Words of the prompt kept in a generated project name.
const NAME_WORDS: usize = 4;

/// Name used when the prompt has no usable words.
pub const FALLBACK_PROJECT_NAME: &str = "untitled-project";

/// Kebab-case project name from the first words of a prompt.
///
/// Only ASCII letters and digits survive; everything else separates words.
pub fn project_name_from_prompt(prompt: &str) -> String {
    let words: Vec<String> = prompt
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(NAME_WORDS)
        .map(str::to_ascii_lowercase)
        .collect();
    if words.is_empty() {
        return FALLBACK_PROJECT_NAME.to_string();
    }
    let mut name = words.join("-");
    name.truncate(MAX_PROJECT_NAME_CHARS);
    name.trim_end_matches('-').to_string()
}
