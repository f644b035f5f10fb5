//! Message and fragment repository trait definition.
//!
//! Defines the storage interface for a project's conversation: pending user
//! messages, terminal assistant messages, and the fragments attached to
//! RESULT messages. The infrastructure layer (kiln-infra) implements this
//! trait with SQLite persistence.

use kiln_types::error::RepositoryError;
use kiln_types::fragment::{FileSet, Fragment};
use kiln_types::message::Message;
use kiln_types::workflow::RunId;
use uuid::Uuid;

/// Everything needed to persist a successful run's artifact.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: RunId,
    pub project_id: Uuid,
    /// Assistant message content.
    pub content: String,
    pub title: String,
    pub sandbox_url: String,
    pub files: FileSet,
}

/// A fragment together with the project its message belongs to.
#[derive(Debug, Clone)]
pub struct OwnedFragment {
    pub project_id: Uuid,
    pub fragment: Fragment,
}

/// Repository trait for conversation persistence.
///
/// The two terminal writes (`persist_result`, `persist_failure`) are atomic
/// and idempotent per `run_id`: if an assistant message for that run already
/// exists it is returned instead of inserting another one.
pub trait MessageRepository: Send + Sync {
    /// Persist a pending USER message. Its run id is
    /// `RunId::derive_for_message(message.id)`.
    fn create_user_message(
        &self,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All messages of a project, ordered by creation time ascending, each
    /// with its fragment when it has one.
    fn list_messages(
        &self,
        project_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Insert the fragment and its ASSISTANT/RESULT message in one
    /// transaction. The returned message carries the fragment.
    fn persist_result(
        &self,
        artifact: &NewArtifact,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Insert the single ASSISTANT/ERROR message for a failed run.
    fn persist_failure(
        &self,
        run_id: &RunId,
        project_id: &Uuid,
        content: &str,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// The assistant message already recorded for `run_id`, if any.
    fn find_by_run(
        &self,
        run_id: &RunId,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// USER messages with no assistant reply under their derived run id,
    /// oldest first. These are the prompts whose runs are still PENDING.
    fn list_unanswered(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Get a fragment by ID, with its owning project.
    fn get_fragment(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<OwnedFragment>, RepositoryError>> + Send;
}
