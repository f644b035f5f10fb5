//! Message service: accepts prompts and serves a project's conversation.
//!
//! `create` is the dispatcher edge: it persists the pending USER message,
//! derives the run id from that message's id, and enqueues the job event.
//! Because the run id is a pure function of the message id, redelivering the
//! same event always resumes the same run.

use kiln_types::error::{FailureKind, ServiceError};
use kiln_types::fragment::Fragment;
use kiln_types::message::{Message, validate_prompt};
use kiln_types::project::Project;
use kiln_types::workflow::{JobEvent, RunId};
use uuid::Uuid;

use crate::repository::message::MessageRepository;
use crate::repository::project::ProjectRepository;
use crate::service::dispatch::JobQueue;
use crate::service::owned_project;
use crate::service::project::{new_project, project_name_from_prompt};
use crate::tree::explorer::ExplorerView;

pub struct MessageService<P, M, Q>
where
    P: ProjectRepository,
    M: MessageRepository,
    Q: JobQueue,
{
    projects: P,
    messages: M,
    queue: Q,
}

impl<P, M, Q> MessageService<P, M, Q>
where
    P: ProjectRepository,
    M: MessageRepository,
    Q: JobQueue,
{
    pub fn new(projects: P, messages: M, queue: Q) -> Self {
        Self {
            projects,
            messages,
            queue,
        }
    }

    /// Accept a prompt for `project_id` and start its run.
    ///
    /// Returns the pending USER message. If the job cannot be enqueued, the
    /// run's ERROR message is written immediately so the prompt is never
    /// silently dropped.
    pub async fn create(
        &self,
        owner_id: &str,
        project_id: &Uuid,
        value: &str,
    ) -> Result<Message, ServiceError> {
        let prompt = validate_prompt(value)?;
        owned_project(&self.projects, owner_id, project_id).await?;
        self.dispatch(*project_id, prompt).await
    }

    /// Start a new project from its first prompt.
    ///
    /// The project is named after the prompt's opening words. Returns the
    /// project and its pending USER message.
    pub async fn create_project_from_prompt(
        &self,
        owner_id: &str,
        value: &str,
    ) -> Result<(Project, Message), ServiceError> {
        let prompt = validate_prompt(value)?;
        let project = new_project(owner_id, &project_name_from_prompt(prompt))?;
        self.projects.create_project(&project).await?;
        tracing::info!(
            project_id = %project.id,
            owner_id,
            name = %project.name,
            "project created from prompt"
        );

        let message = self.dispatch(project.id, prompt).await?;
        Ok((project, message))
    }

    /// Enqueue a job for every prompt still waiting on its reply.
    ///
    /// Run at worker startup so prompts accepted by an earlier process are
    /// not lost with its in-memory queue. Returns how many were enqueued.
    pub async fn redeliver_pending(&self) -> Result<usize, ServiceError> {
        let pending = self.messages.list_unanswered().await?;
        for message in &pending {
            let run_id = RunId::derive_for_message(message.id);
            let event = JobEvent::new(run_id.clone(), message.project_id, message.content.clone());
            self.queue
                .enqueue(event)
                .await
                .map_err(|e| ServiceError::Queue(e.to_string()))?;
            tracing::debug!(run_id = %run_id, message_id = %message.id, "pending job redelivered");
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "pending jobs redelivered");
        }
        Ok(pending.len())
    }

    /// Persist the USER message for an already validated prompt and enqueue
    /// its job.
    async fn dispatch(&self, project_id: Uuid, prompt: &str) -> Result<Message, ServiceError> {
        let message = Message::user(project_id, prompt);
        self.messages.create_user_message(&message).await?;

        let run_id = RunId::derive_for_message(message.id);
        let event = JobEvent::new(run_id.clone(), project_id, prompt);

        if let Err(err) = self.queue.enqueue(event).await {
            tracing::error!(run_id = %run_id, error = %err, "failed to enqueue job");
            self.messages
                .persist_failure(
                    &run_id,
                    &project_id,
                    FailureKind::TransientInfra.user_summary(),
                )
                .await?;
            return Err(ServiceError::Queue(err.to_string()));
        }

        tracing::info!(
            run_id = %run_id,
            project_id = %project_id,
            message_id = %message.id,
            "job enqueued"
        );
        Ok(message)
    }

    /// The project's conversation in creation order, fragments included.
    pub async fn get_many(
        &self,
        owner_id: &str,
        project_id: &Uuid,
    ) -> Result<Vec<Message>, ServiceError> {
        owned_project(&self.projects, owner_id, project_id).await?;
        Ok(self.messages.list_messages(project_id).await?)
    }

    /// A fragment the caller owns.
    pub async fn get_fragment(
        &self,
        owner_id: &str,
        fragment_id: &Uuid,
    ) -> Result<Fragment, ServiceError> {
        let owned = self
            .messages
            .get_fragment(fragment_id)
            .await?
            .ok_or(ServiceError::NotFound("fragment"))?;
        owned_project(&self.projects, owner_id, &owned.project_id)
            .await
            .map_err(|_| ServiceError::NotFound("fragment"))?;
        Ok(owned.fragment)
    }

    /// Explorer view of a fragment the caller owns.
    pub async fn explore_fragment(
        &self,
        owner_id: &str,
        fragment_id: &Uuid,
        selected: Option<&str>,
    ) -> Result<ExplorerView, ServiceError> {
        let fragment = self.get_fragment(owner_id, fragment_id).await?;
        Ok(ExplorerView::open(&fragment.files, selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use kiln_types::message::{MessageRole, MessageType};

    use crate::repository::message::NewArtifact;
    use crate::service::dispatch::QueueError;
    use crate::testing::{MemMessages, MemProjects};

    #[derive(Default)]
    struct RecordingQueue {
        events: Mutex<Vec<JobEvent>>,
        closed: bool,
    }

    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, event: JobEvent) -> Result<(), QueueError> {
            if self.closed {
                return Err(QueueError::Closed);
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    async fn service_with_project(
        queue: RecordingQueue,
    ) -> (MessageService<MemProjects, MemMessages, RecordingQueue>, Uuid) {
        let projects = MemProjects::default();
        let project = Project::new("user_1", "app");
        projects.create_project(&project).await.unwrap();
        (
            MessageService::new(projects, MemMessages::default(), queue),
            project.id,
        )
    }

    #[tokio::test]
    async fn test_create_enqueues_deterministic_run() {
        let (service, project_id) = service_with_project(RecordingQueue::default()).await;

        let message = service
            .create("user_1", &project_id, "  build a todo app ")
            .await
            .unwrap();
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.message_type, MessageType::Result);
        assert_eq!(message.content, "build a todo app");

        let events = service.queue.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, RunId::derive_for_message(message.id));
        assert_eq!(events[0].project_id, project_id);
        assert_eq!(events[0].prompt_text, "build a todo app");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_prompt_and_foreign_project() {
        let (service, project_id) = service_with_project(RecordingQueue::default()).await;

        assert!(matches!(
            service.create("user_1", &project_id, "").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.create("user_2", &project_id, "hi").await,
            Err(ServiceError::NotFound("project"))
        ));
        assert!(matches!(
            service.create("user_1", &Uuid::now_v7(), "hi").await,
            Err(ServiceError::NotFound("project"))
        ));
        assert!(service.queue.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_persists_error_reply() {
        let queue = RecordingQueue {
            closed: true,
            ..RecordingQueue::default()
        };
        let (service, project_id) = service_with_project(queue).await;

        let err = service.create("user_1", &project_id, "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Queue(_)));

        let messages = service.get_many("user_1", &project_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].message_type, MessageType::Error);
    }

    #[tokio::test]
    async fn test_create_project_from_prompt_dispatches_first_run() {
        let service = MessageService::new(
            MemProjects::default(),
            MemMessages::default(),
            RecordingQueue::default(),
        );

        let (project, message) = service
            .create_project_from_prompt("user_1", " Build a todo app with tags ")
            .await
            .unwrap();
        assert_eq!(project.name, "build-a-todo-app");
        assert!(project.is_owned_by("user_1"));
        assert_eq!(message.project_id, project.id);
        assert_eq!(message.content, "Build a todo app with tags");

        let conversation = service.get_many("user_1", &project.id).await.unwrap();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].id, message.id);

        let events = service.queue.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, RunId::derive_for_message(message.id));
        assert_eq!(events[0].project_id, project.id);
    }

    #[tokio::test]
    async fn test_create_project_from_invalid_prompt_creates_nothing() {
        let service = MessageService::new(
            MemProjects::default(),
            MemMessages::default(),
            RecordingQueue::default(),
        );

        assert!(matches!(
            service.create_project_from_prompt("user_1", "   ").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.create_project_from_prompt("", "build a todo app").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(service.projects.list_projects("user_1").await.unwrap().is_empty());
        assert!(service.queue.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeliver_pending_skips_answered_prompts() {
        let (service, project_id) = service_with_project(RecordingQueue::default()).await;
        let answered = service.create("user_1", &project_id, "first").await.unwrap();
        let pending = service.create("user_1", &project_id, "second").await.unwrap();
        service
            .messages
            .persist_failure(
                &RunId::derive_for_message(answered.id),
                &project_id,
                FailureKind::Internal.user_summary(),
            )
            .await
            .unwrap();
        service.queue.events.lock().unwrap().clear();

        let count = service.redeliver_pending().await.unwrap();
        assert_eq!(count, 1);
        let events = service.queue.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, RunId::derive_for_message(pending.id));
        assert_eq!(events[0].prompt_text, "second");
        assert_eq!(events[0].project_id, project_id);
    }

    #[tokio::test]
    async fn test_fragment_access_is_owner_scoped() {
        let (service, project_id) = service_with_project(RecordingQueue::default()).await;
        let files = kiln_types::fragment::FilePayload::Map(
            [("src/app.js".to_string(), "x".to_string())].into(),
        )
        .into_file_set()
        .unwrap();
        let message = service
            .messages
            .persist_result(&NewArtifact {
                run_id: RunId::new("r1"),
                project_id,
                content: "Todo app".into(),
                title: "Todo app".into(),
                sandbox_url: "https://sbx-1.example".into(),
                files,
            })
            .await
            .unwrap();
        let fragment_id = message.fragment.unwrap().id;

        let view = service
            .explore_fragment("user_1", &fragment_id, None)
            .await
            .unwrap();
        assert_eq!(view.tree.len(), 1);
        assert_eq!(view.tree[0].children[0].path, "src/app.js");
        assert_eq!(view.selected.as_deref(), Some("src/app.js"));

        assert!(matches!(
            service.get_fragment("user_2", &fragment_id).await,
            Err(ServiceError::NotFound("fragment"))
        ));
    }
}
