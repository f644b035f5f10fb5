//! SQLite message and fragment repository.
//!
//! Implements `MessageRepository` from `kiln-core`. Every message carries a
//! `run_id`: the run a USER prompt starts, or the run that produced an
//! assistant reply. A partial unique index keeps it to one assistant reply
//! per run, and the terminal writes check for an existing reply inside their
//! transaction before inserting.

use chrono::Utc;
use kiln_core::repository::message::{MessageRepository, NewArtifact, OwnedFragment};
use kiln_types::error::RepositoryError;
use kiln_types::fragment::{FileSet, Fragment};
use kiln_types::message::{Message, MessageRole, MessageType};
use kiln_types::workflow::RunId;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `MessageRepository`.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const MESSAGE_SELECT: &str = r#"SELECT
    m.id, m.project_id, m.role, m.type, m.content, m.created_at, m.updated_at,
    f.id AS fragment_id, f.title AS fragment_title, f.sandbox_url AS fragment_sandbox_url,
    f.files AS fragment_files, f.created_at AS fragment_created_at,
    f.updated_at AS fragment_updated_at
  FROM messages m
  LEFT JOIN fragments f ON f.message_id = m.id"#;

struct MessageRow {
    id: String,
    project_id: String,
    role: String,
    message_type: String,
    content: String,
    created_at: String,
    updated_at: String,
    fragment: Option<FragmentRow>,
}

struct FragmentRow {
    id: String,
    title: String,
    sandbox_url: String,
    files: String,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let fragment_id: Option<String> = row.try_get("fragment_id")?;
        let fragment = match fragment_id {
            Some(id) => Some(FragmentRow {
                id,
                title: row.try_get("fragment_title")?,
                sandbox_url: row.try_get("fragment_sandbox_url")?,
                files: row.try_get("fragment_files")?,
                created_at: row.try_get("fragment_created_at")?,
                updated_at: row.try_get("fragment_updated_at")?,
            }),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            role: row.try_get("role")?,
            message_type: row.try_get("type")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            fragment,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let id = parse_uuid(&self.id)?;
        let fragment = self
            .fragment
            .map(|f| f.into_fragment(id))
            .transpose()?;
        Ok(Message {
            id,
            project_id: parse_uuid(&self.project_id)?,
            role: self.role.parse::<MessageRole>().map_err(RepositoryError::Query)?,
            message_type: self
                .message_type
                .parse::<MessageType>()
                .map_err(RepositoryError::Query)?,
            content: self.content,
            fragment,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl FragmentRow {
    fn into_fragment(self, message_id: Uuid) -> Result<Fragment, RepositoryError> {
        let files: FileSet = serde_json::from_str(&self.files)
            .map_err(|e| RepositoryError::Query(format!("invalid fragment files JSON: {e}")))?;
        Ok(Fragment {
            id: parse_uuid(&self.id)?,
            message_id,
            title: self.title,
            sandbox_url: self.sandbox_url,
            files,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn map_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    MessageRow::from_row(row).map_err(query_error)?.into_message()
}

fn assistant_message(project_id: Uuid, message_type: MessageType, content: &str) -> Message {
    let now = Utc::now();
    Message {
        id: Uuid::now_v7(),
        project_id,
        role: MessageRole::Assistant,
        message_type,
        content: content.to_string(),
        fragment: None,
        created_at: now,
        updated_at: now,
    }
}

async fn insert_message(
    conn: &mut sqlx::SqliteConnection,
    message: &Message,
    run_id: Option<&RunId>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"INSERT INTO messages
           (id, project_id, role, type, content, run_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(message.id.to_string())
    .bind(message.project_id.to_string())
    .bind(message.role.to_string())
    .bind(message.message_type.to_string())
    .bind(&message.content)
    .bind(run_id.map(RunId::as_str))
    .bind(format_datetime(&message.created_at))
    .bind(format_datetime(&message.updated_at))
    .execute(conn)
    .await
    .map_err(query_error)?;
    Ok(())
}

async fn find_assistant(
    conn: &mut sqlx::SqliteConnection,
    run_id: &RunId,
) -> Result<Option<Message>, RepositoryError> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.run_id = ? AND m.role = 'ASSISTANT'");
    let row = sqlx::query(&sql)
        .bind(run_id.as_str())
        .fetch_optional(conn)
        .await
        .map_err(query_error)?;
    row.as_ref().map(map_message).transpose()
}

// ---------------------------------------------------------------------------
// MessageRepository impl
// ---------------------------------------------------------------------------

impl MessageRepository for SqliteMessageRepository {
    async fn create_user_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let run_id = RunId::derive_for_message(message.id);
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        insert_message(&mut conn, message, Some(&run_id)).await
    }

    async fn list_messages(&self, project_id: &Uuid) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!("{MESSAGE_SELECT} WHERE m.project_id = ? ORDER BY m.created_at ASC, m.id ASC");
        let rows = sqlx::query(&sql)
            .bind(project_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(map_message).collect()
    }

    async fn persist_result(&self, artifact: &NewArtifact) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        if let Some(existing) = find_assistant(&mut tx, &artifact.run_id).await? {
            tracing::debug!(run_id = %artifact.run_id, "result already persisted");
            return Ok(existing);
        }

        let mut message =
            assistant_message(artifact.project_id, MessageType::Result, &artifact.content);
        insert_message(&mut tx, &message, Some(&artifact.run_id)).await?;

        let fragment = Fragment {
            id: Uuid::now_v7(),
            message_id: message.id,
            title: artifact.title.clone(),
            sandbox_url: artifact.sandbox_url.clone(),
            files: artifact.files.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
        };
        let files_json = serde_json::to_string(&fragment.files)
            .map_err(|e| RepositoryError::Query(format!("serialize files: {e}")))?;

        sqlx::query(
            r#"INSERT INTO fragments
               (id, message_id, title, sandbox_url, files, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(fragment.id.to_string())
        .bind(fragment.message_id.to_string())
        .bind(&fragment.title)
        .bind(&fragment.sandbox_url)
        .bind(&files_json)
        .bind(format_datetime(&fragment.created_at))
        .bind(format_datetime(&fragment.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        message.fragment = Some(fragment);
        Ok(message)
    }

    async fn persist_failure(
        &self,
        run_id: &RunId,
        project_id: &Uuid,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        if let Some(existing) = find_assistant(&mut tx, run_id).await? {
            tracing::debug!(run_id = %run_id, "failure already persisted");
            return Ok(existing);
        }

        let message = assistant_message(*project_id, MessageType::Error, content);
        insert_message(&mut tx, &message, Some(run_id)).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(message)
    }

    async fn find_by_run(&self, run_id: &RunId) -> Result<Option<Message>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;
        find_assistant(&mut conn, run_id).await
    }

    async fn list_unanswered(&self) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            r#"{MESSAGE_SELECT}
               WHERE m.role = 'USER'
                 AND NOT EXISTS (
                     SELECT 1 FROM messages a
                     WHERE a.role = 'ASSISTANT' AND a.run_id = m.run_id)
               ORDER BY m.created_at ASC, m.id ASC"#
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(map_message).collect()
    }

    async fn get_fragment(&self, id: &Uuid) -> Result<Option<OwnedFragment>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT f.*, m.project_id
               FROM fragments f
               JOIN messages m ON m.id = f.message_id
               WHERE f.id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let message_id: String = row.try_get("message_id").map_err(query_error)?;
        let project_id: String = row.try_get("project_id").map_err(query_error)?;
        let fragment = FragmentRow {
            id: row.try_get("id").map_err(query_error)?,
            title: row.try_get("title").map_err(query_error)?,
            sandbox_url: row.try_get("sandbox_url").map_err(query_error)?,
            files: row.try_get("files").map_err(query_error)?,
            created_at: row.try_get("created_at").map_err(query_error)?,
            updated_at: row.try_get("updated_at").map_err(query_error)?,
        }
        .into_fragment(parse_uuid(&message_id)?)?;

        Ok(Some(OwnedFragment {
            project_id: parse_uuid(&project_id)?,
            fragment,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use crate::sqlite::project::SqliteProjectRepository;
    use kiln_core::repository::project::ProjectRepository;
    use kiln_types::fragment::FilePayload;
    use kiln_types::project::Project;
    use std::collections::BTreeMap;

    async fn setup() -> (SqliteMessageRepository, Uuid) {
        let pool = test_pool().await;
        let project = Project::new("user_1", "app");
        SqliteProjectRepository::new(pool.clone())
            .create_project(&project)
            .await
            .unwrap();
        (SqliteMessageRepository::new(pool), project.id)
    }

    fn artifact(run_id: &str, project_id: Uuid) -> NewArtifact {
        let files = FilePayload::Map(BTreeMap::from([
            ("index.html".to_string(), "<html/>".to_string()),
            ("src/app.js".to_string(), "x".to_string()),
        ]))
        .into_file_set()
        .unwrap();
        NewArtifact {
            run_id: RunId::new(run_id),
            project_id,
            content: "Todo app".into(),
            title: "Todo app".into(),
            sandbox_url: "https://3000-sbx.sandbox.kiln.dev".into(),
            files,
        }
    }

    #[tokio::test]
    async fn test_conversation_round_trip_in_order() {
        let (repo, project_id) = setup().await;
        let user = Message::user(project_id, "build a todo app");
        repo.create_user_message(&user).await.unwrap();
        let reply = repo.persist_result(&artifact("run-1", project_id)).await.unwrap();

        let messages = repo.list_messages(&project_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, user.id);
        assert!(messages[0].fragment.is_none());
        assert_eq!(messages[1].id, reply.id);
        assert_eq!(messages[1].role, MessageRole::Assistant);

        let fragment = messages[1].fragment.as_ref().unwrap();
        assert_eq!(fragment.message_id, reply.id);
        assert_eq!(fragment.files.len(), 2);
        assert_eq!(fragment.files.get("src/app.js"), Some("x"));
    }

    #[tokio::test]
    async fn test_persist_result_is_idempotent_per_run() {
        let (repo, project_id) = setup().await;
        let first = repo.persist_result(&artifact("run-1", project_id)).await.unwrap();
        let second = repo.persist_result(&artifact("run-1", project_id)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            first.fragment.as_ref().unwrap().id,
            second.fragment.as_ref().unwrap().id
        );

        let failure = repo
            .persist_failure(&RunId::new("run-1"), &project_id, "nope")
            .await
            .unwrap();
        assert_eq!(failure.id, first.id);
        assert_eq!(repo.list_messages(&project_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_has_no_fragment() {
        let (repo, project_id) = setup().await;
        let run_id = RunId::new("run-9");
        let message = repo
            .persist_failure(&run_id, &project_id, "Something went wrong.")
            .await
            .unwrap();
        assert_eq!(message.message_type, MessageType::Error);

        let found = repo.find_by_run(&run_id).await.unwrap().unwrap();
        assert_eq!(found.id, message.id);
        assert!(found.fragment.is_none());
        assert!(repo.find_by_run(&RunId::new("other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_fragment_reports_owning_project() {
        let (repo, project_id) = setup().await;
        let reply = repo.persist_result(&artifact("run-1", project_id)).await.unwrap();
        let fragment_id = reply.fragment.unwrap().id;

        let owned = repo.get_fragment(&fragment_id).await.unwrap().unwrap();
        assert_eq!(owned.project_id, project_id);
        assert_eq!(owned.fragment.title, "Todo app");
        assert!(repo.get_fragment(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_unanswered_tracks_derived_run() {
        let (repo, project_id) = setup().await;
        let answered = Message::user(project_id, "build a todo app");
        repo.create_user_message(&answered).await.unwrap();
        let pending = Message::user(project_id, "build a counter");
        repo.create_user_message(&pending).await.unwrap();

        let unanswered = repo.list_unanswered().await.unwrap();
        let ids: Vec<Uuid> = unanswered.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&answered.id) && ids.contains(&pending.id));

        repo.persist_failure(
            &RunId::derive_for_message(answered.id),
            &project_id,
            "Something went wrong.",
        )
        .await
        .unwrap();
        // A reply under an unrelated run id does not answer the prompt.
        repo.persist_result(&artifact("run-1", project_id)).await.unwrap();

        let unanswered = repo.list_unanswered().await.unwrap();
        assert_eq!(unanswered.len(), 1);
        assert_eq!(unanswered[0].id, pending.id);
        assert_eq!(unanswered[0].content, "build a counter");
    }

    #[tokio::test]
    async fn test_unknown_project_rejected() {
        let (repo, _) = setup().await;
        let orphan = Message::user(Uuid::now_v7(), "hi");
        assert!(repo.create_user_message(&orphan).await.is_err());
    }
}
