//! SQLite project repository.

use kiln_core::repository::project::ProjectRepository;
use kiln_types::error::RepositoryError;
use kiln_types::project::Project;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ProjectRepository`.
#[derive(Clone)]
pub struct SqliteProjectRepository {
    pool: DatabasePool,
}

impl SqliteProjectRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;
    Ok(Project {
        id: parse_uuid(&id)?,
        name: row.try_get("name").map_err(query_error)?,
        owner_id: row.try_get("owner_id").map_err(query_error)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl ProjectRepository for SqliteProjectRepository {
    async fn create_project(&self, project: &Project) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO projects (id, name, owner_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.owner_id)
        .bind(format_datetime(&project.created_at))
        .bind(format_datetime(&project.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(format!("project {} already exists", project.id))
            }
            other => query_error(other),
        })?;
        Ok(())
    }

    async fn get_project(&self, id: &Uuid) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM projects WHERE owner_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        rows.iter().map(project_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = SqliteProjectRepository::new(test_pool().await);
        let project = Project::new("user_1", "todo app");
        repo.create_project(&project).await.unwrap();

        let loaded = repo.get_project(&project.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "todo app");
        assert_eq!(loaded.owner_id, "user_1");
        assert!(repo.get_project(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let repo = SqliteProjectRepository::new(test_pool().await);
        let project = Project::new("user_1", "a");
        repo.create_project(&project).await.unwrap();
        assert!(matches!(
            repo.create_project(&project).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let repo = SqliteProjectRepository::new(test_pool().await);
        repo.create_project(&Project::new("user_1", "a")).await.unwrap();
        repo.create_project(&Project::new("user_1", "b")).await.unwrap();
        repo.create_project(&Project::new("user_2", "c")).await.unwrap();

        let mine = repo.list_projects("user_1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|p| p.owner_id == "user_1"));
    }
}
