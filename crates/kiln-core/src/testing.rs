//! In-memory fakes shared by the engine and service tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use kiln_types::config::AgentConfig;
use kiln_types::error::RepositoryError;
use kiln_types::fragment::Fragment;
use kiln_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};
use kiln_types::message::{Message, MessageRole, MessageType};
use kiln_types::project::Project;
use kiln_types::sandbox::SandboxId;
use kiln_types::workflow::{RunId, StepName, StepRecord};
use uuid::Uuid;

use crate::agent::AgentAdapter;
use crate::artifact::ArtifactBuilder;
use crate::llm::provider::LlmProvider;
use crate::repository::ledger::StepLedger;
use crate::repository::message::{MessageRepository, NewArtifact, OwnedFragment};
use crate::repository::project::ProjectRepository;
use crate::sandbox::{SandboxError, SandboxManager, SandboxProvider};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::memo::StepMemo;
use crate::workflow::retry::{RetryPolicy, StepTimeouts};

pub type TestEngine = WorkflowEngine<MemLedger, FakeSandbox, FakeLlm, MemMessages>;

pub fn test_engine(
    ledger: MemLedger,
    sandbox: FakeSandbox,
    llm: FakeLlm,
    messages: MemMessages,
    max_attempts: u32,
) -> TestEngine {
    WorkflowEngine::new(
        StepMemo::new(ledger, RetryPolicy::immediate(max_attempts), StepTimeouts::default()),
        SandboxManager::new(sandbox),
        AgentAdapter::new(llm, &AgentConfig::default()),
        ArtifactBuilder::new(messages),
        3000,
    )
}

/// JSON reply in the agent contract shape.
pub fn agent_reply(summary: &str, files: &[(&str, &str)]) -> String {
    let files: serde_json::Map<String, serde_json::Value> = files
        .iter()
        .map(|(path, content)| (path.to_string(), serde_json::json!(content)))
        .collect();
    serde_json::json!({ "summary": summary, "files": files }).to_string()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemLedger {
    records: Mutex<Vec<StepRecord>>,
}

impl StepLedger for MemLedger {
    async fn get(
        &self,
        run_id: &RunId,
        step: StepName,
    ) -> Result<Option<StepRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.run_id == run_id && r.step_name == step)
            .cloned())
    }

    async fn put(&self, record: &StepRecord) -> Result<bool, RepositoryError> {
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.run_id == record.run_id && r.step_name == record.step_name)
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn list(&self, run_id: &RunId) -> Result<Vec<StepRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.run_id == run_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// Keyed sandbox provider: one sandbox per workspace key.
#[derive(Default)]
pub struct FakeSandbox {
    by_key: Mutex<HashMap<String, SandboxId>>,
    known: Mutex<Vec<SandboxId>>,
    pub creates: AtomicU32,
    fail_first: u32,
    expire_all: bool,
}

impl FakeSandbox {
    /// The first `n` create calls fail transiently.
    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    /// Sandboxes vanish right after creation.
    pub fn expiring() -> Self {
        Self {
            expire_all: true,
            ..Self::default()
        }
    }

    pub fn register(&self, id: SandboxId) {
        self.known.lock().unwrap().push(id);
    }
}

impl SandboxProvider for FakeSandbox {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, workspace_key: &str) -> Result<SandboxId, SandboxError> {
        let attempt = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(SandboxError::Unavailable("connection refused".into()));
        }
        let mut by_key = self.by_key.lock().unwrap();
        let next = by_key.len() + 1;
        let id = by_key
            .entry(workspace_key.to_string())
            .or_insert_with(|| SandboxId::new(format!("sbx-{next}")))
            .clone();
        self.known.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn host(&self, sandbox_id: &SandboxId, _port: u16) -> Result<String, SandboxError> {
        let known = self.known.lock().unwrap().contains(sandbox_id);
        if self.expire_all || !known {
            return Err(SandboxError::NotFound(sandbox_id.clone()));
        }
        Ok(format!("{sandbox_id}.example"))
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

pub struct FakeLlm {
    reply: Result<String, ()>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl FakeLlm {
    pub fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn quota_exceeded() -> Self {
        Self {
            reply: Err(()),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(content) => Ok(CompletionResponse {
                id: "resp-1".into(),
                content: content.clone(),
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            }),
            Err(()) => Err(LlmError::QuotaExceeded("monthly token quota".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemMessages {
    messages: Mutex<Vec<(Option<RunId>, Message)>>,
}

impl MemMessages {
    pub fn assistant_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.role == MessageRole::Assistant)
            .count()
    }

    pub fn fragment_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.fragment.is_some())
            .count()
    }

    fn assistant(project_id: Uuid, message_type: MessageType, content: &str) -> Message {
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

    fn existing(&self, run_id: &RunId) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r.as_ref() == Some(run_id))
            .map(|(_, m)| m.clone())
    }
}

impl MessageRepository for MemMessages {
    async fn create_user_message(&self, message: &Message) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().push((None, message.clone()));
        Ok(())
    }

    async fn list_messages(&self, project_id: &Uuid) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| &m.project_id == project_id)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn persist_result(&self, artifact: &NewArtifact) -> Result<Message, RepositoryError> {
        if let Some(existing) = self.existing(&artifact.run_id) {
            return Ok(existing);
        }
        let mut message = Self::assistant(artifact.project_id, MessageType::Result, &artifact.content);
        message.fragment = Some(Fragment {
            id: Uuid::now_v7(),
            message_id: message.id,
            title: artifact.title.clone(),
            sandbox_url: artifact.sandbox_url.clone(),
            files: artifact.files.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
        });
        self.messages
            .lock()
            .unwrap()
            .push((Some(artifact.run_id.clone()), message.clone()));
        Ok(message)
    }

    async fn persist_failure(
        &self,
        run_id: &RunId,
        project_id: &Uuid,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        if let Some(existing) = self.existing(run_id) {
            return Ok(existing);
        }
        let message = Self::assistant(*project_id, MessageType::Error, content);
        self.messages
            .lock()
            .unwrap()
            .push((Some(run_id.clone()), message.clone()));
        Ok(message)
    }

    async fn find_by_run(&self, run_id: &RunId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.existing(run_id))
    }

    async fn list_unanswered(&self) -> Result<Vec<Message>, RepositoryError> {
        let users: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.role == MessageRole::User)
            .map(|(_, m)| m.clone())
            .collect();
        Ok(users
            .into_iter()
            .filter(|m| self.existing(&RunId::derive_for_message(m.id)).is_none())
            .collect())
    }

    async fn get_fragment(&self, id: &Uuid) -> Result<Option<OwnedFragment>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, m)| {
                m.fragment.clone().map(|fragment| OwnedFragment {
                    project_id: m.project_id,
                    fragment,
                })
            })
            .find(|owned| &owned.fragment.id == id))
    }
}

#[derive(Default)]
pub struct MemProjects {
    projects: Mutex<Vec<Project>>,
}

impl ProjectRepository for MemProjects {
    async fn create_project(&self, project: &Project) -> Result<(), RepositoryError> {
        self.projects.lock().unwrap().push(project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &Uuid) -> Result<Option<Project>, RepositoryError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| &p.id == id)
            .cloned())
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, RepositoryError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
