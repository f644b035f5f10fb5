//! Artifact Builder: turns a run's result into durable conversation state.
//!
//! Success writes one Fragment plus its ASSISTANT/RESULT message; failure
//! writes one ASSISTANT/ERROR message. Both writes are atomic and idempotent
//! per run id in the repository, so a replayed persist step never produces a
//! second assistant message.

use kiln_types::agent::AgentOutput;
use kiln_types::error::RepositoryError;
use kiln_types::fragment::Fragment;
use kiln_types::message::Message;
use kiln_types::workflow::{RunId, StepError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::message::{MessageRepository, NewArtifact};

/// Title used when the agent gave no summary.
pub const DEFAULT_TITLE: &str = "Fragment";

/// Output of the persist-artifact step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub fragment: Fragment,
    /// The ASSISTANT/RESULT message; its `fragment` field is populated.
    pub message: Message,
}

pub struct ArtifactBuilder<M: MessageRepository> {
    messages: M,
}

impl<M: MessageRepository> ArtifactBuilder<M> {
    pub fn new(messages: M) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &M {
        &self.messages
    }

    /// The assistant reply already stored for `run_id`, if any.
    pub async fn existing_reply(&self, run_id: &RunId) -> Result<Option<Message>, RepositoryError> {
        self.messages.find_by_run(run_id).await
    }

    /// Persist the fragment and its RESULT message in one transaction.
    pub async fn build(
        &self,
        run_id: &RunId,
        project_id: Uuid,
        output: &AgentOutput,
        sandbox_url: &str,
    ) -> Result<PersistedArtifact, StepError> {
        let summary = output.summary.trim();
        let title = if summary.is_empty() {
            DEFAULT_TITLE
        } else {
            summary
        };

        let artifact = NewArtifact {
            run_id: run_id.clone(),
            project_id,
            content: title.to_string(),
            title: title.to_string(),
            sandbox_url: sandbox_url.to_string(),
            files: output.files.clone(),
        };

        let message = self.messages.persist_result(&artifact).await?;
        let fragment = message
            .fragment
            .clone()
            .ok_or_else(|| StepError::internal("persisted result message has no fragment"))?;

        tracing::info!(
            run_id = %run_id,
            message_id = %message.id,
            fragment_id = %fragment.id,
            files = fragment.files.len(),
            "artifact persisted"
        );
        Ok(PersistedArtifact { fragment, message })
    }

    /// Persist the single ERROR message explaining why the run failed.
    pub async fn fail(
        &self,
        run_id: &RunId,
        project_id: Uuid,
        error: &StepError,
    ) -> Result<Message, StepError> {
        let content = error.kind.user_summary();
        let message = self
            .messages
            .persist_failure(run_id, &project_id, content)
            .await?;
        tracing::info!(
            run_id = %run_id,
            message_id = %message.id,
            kind = %error.kind,
            "failure message persisted"
        );
        Ok(message)
    }
}
