//! Workflow engine: runs the generation pipeline for one job event.
//!
//! The pipeline is fixed and strictly sequential:
//!
//! 1. `provision-sandbox`: create (or reuse) the sandbox keyed by run id
//! 2. `invoke-agent`: one model call, normalized into summary + files
//! 3. `resolve-sandbox-address`: derive the preview URL
//! 4. `persist-artifact`: Fragment + ASSISTANT/RESULT message, atomically
//!
//! Every step goes through [`StepMemo`], so a redelivered event replays
//! completed steps from the ledger instead of repeating their side effects.
//! When a step fails for good, its failure is recorded and the
//! `persist-failure` step writes the single ASSISTANT/ERROR message.

use kiln_types::agent::AgentOutput;
use kiln_types::config::KilnConfig;
use kiln_types::error::{FailureKind, ValidationError};
use kiln_types::fragment::Fragment;
use kiln_types::message::{Message, MessageType};
use kiln_types::sandbox::SandboxId;
use kiln_types::workflow::{JobEvent, RunId, StepError, StepName, WorkflowRunStatus};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::agent::AgentAdapter;
use crate::artifact::{ArtifactBuilder, PersistedArtifact};
use crate::llm::provider::LlmProvider;
use crate::repository::ledger::StepLedger;
use crate::repository::message::MessageRepository;
use crate::sandbox::{SandboxManager, SandboxProvider};
use crate::workflow::memo::{MemoError, StepMemo};
use crate::workflow::retry::{RetryPolicy, StepTimeouts};
use crate::workflow::run_lock::RunLocks;

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// Terminal result of one run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded {
        fragment: Fragment,
        message: Message,
    },
    Failed {
        /// Step that failed; `None` when the event itself was rejected.
        failed_step: Option<StepName>,
        error: StepError,
        /// The ASSISTANT/ERROR message shown to the user.
        message: Message,
    },
}

impl RunOutcome {
    pub fn status(&self) -> WorkflowRunStatus {
        match self {
            RunOutcome::Succeeded { .. } => WorkflowRunStatus::Succeeded,
            RunOutcome::Failed { .. } => WorkflowRunStatus::Failed,
        }
    }

    /// Rebuild the outcome from an assistant reply stored by an earlier
    /// delivery. `None` for a RESULT message without its fragment.
    pub fn from_reply(message: Message) -> Option<Self> {
        match message.message_type {
            MessageType::Result => {
                let fragment = message.fragment.clone()?;
                Some(RunOutcome::Succeeded { fragment, message })
            }
            MessageType::Error => {
                let kind =
                    FailureKind::from_user_summary(&message.content).unwrap_or(FailureKind::Internal);
                Some(RunOutcome::Failed {
                    failed_step: None,
                    error: StepError::new(kind, message.content.clone()),
                    message,
                })
            }
        }
    }

    /// The assistant message produced by the run, whichever way it ended.
    pub fn message(&self) -> &Message {
        match self {
            RunOutcome::Succeeded { message, .. } | RunOutcome::Failed { message, .. } => message,
        }
    }
}

/// Output of the persist-failure step.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordedFailure {
    failed_step: Option<StepName>,
    error: StepError,
    message: Message,
}

/// Errors that leave a run PENDING. Redelivering the event resumes it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid job event: {0}")]
    InvalidEvent(#[from] ValidationError),

    #[error("step ledger unavailable: {0}")]
    Ledger(String),

    #[error("message store unavailable: {0}")]
    Storage(String),

    #[error("could not persist failure for run {run_id}: {error}")]
    FailureNotPersisted { run_id: RunId, error: StepError },
}

/// Why the success pipeline stopped early.
enum Halt {
    Step(StepName, StepError),
    Engine(EngineError),
}

fn halt(step: StepName) -> impl FnOnce(MemoError) -> Halt {
    move |err| match err {
        MemoError::Step(error) => Halt::Step(step, error),
        other => Halt::Engine(EngineError::Ledger(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Orchestrates sandbox, agent and artifact steps for one job at a time per
/// run id.
///
/// Generic over every port so tests can swap in in-memory fakes.
pub struct WorkflowEngine<L, S, P, M>
where
    L: StepLedger,
    S: SandboxProvider,
    P: LlmProvider,
    M: MessageRepository,
{
    memo: StepMemo<L>,
    sandboxes: SandboxManager<S>,
    agent: AgentAdapter<P>,
    artifacts: ArtifactBuilder<M>,
    locks: RunLocks,
    sandbox_port: u16,
}

impl<L, S, P, M> WorkflowEngine<L, S, P, M>
where
    L: StepLedger,
    S: SandboxProvider,
    P: LlmProvider,
    M: MessageRepository,
{
    pub fn new(
        memo: StepMemo<L>,
        sandboxes: SandboxManager<S>,
        agent: AgentAdapter<P>,
        artifacts: ArtifactBuilder<M>,
        sandbox_port: u16,
    ) -> Self {
        Self {
            memo,
            sandboxes,
            agent,
            artifacts,
            locks: RunLocks::new(),
            sandbox_port,
        }
    }

    /// Wire an engine from its ports and the loaded configuration.
    pub fn from_config(ledger: L, sandbox: S, llm: P, messages: M, config: &KilnConfig) -> Self {
        Self::new(
            StepMemo::new(
                ledger,
                RetryPolicy::from_config(&config.workflow),
                StepTimeouts::from_config(&config.workflow),
            ),
            SandboxManager::new(sandbox),
            AgentAdapter::new(llm, &config.agent),
            ArtifactBuilder::new(messages),
            config.sandbox.port,
        )
    }

    pub fn memo(&self) -> &StepMemo<L> {
        &self.memo
    }

    pub fn sandboxes(&self) -> &SandboxManager<S> {
        &self.sandboxes
    }

    pub fn agent(&self) -> &AgentAdapter<P> {
        &self.agent
    }

    pub fn artifacts(&self) -> &ArtifactBuilder<M> {
        &self.artifacts
    }

    pub fn locks(&self) -> &RunLocks {
        &self.locks
    }

    /// Run (or resume) the pipeline for `event`.
    ///
    /// Concurrent calls for the same run id are serialized: the second waits
    /// for the first and then replays its recorded results. A run that has
    /// already failed stays failed.
    pub async fn run(&self, event: &JobEvent) -> Result<RunOutcome, EngineError> {
        if event.run_id.as_str().trim().is_empty() {
            return Err(ValidationError::Required { field: "run_id" }.into());
        }

        let _guard = self.locks.acquire(&event.run_id).await;
        let span = tracing::info_span!(
            "workflow.run",
            run_id = %event.run_id,
            project_id = %event.project_id,
        );
        self.execute(event).instrument(span).await
    }

    async fn execute(&self, event: &JobEvent) -> Result<RunOutcome, EngineError> {
        if let Some(failure) = self.recorded_failure(&event.run_id).await? {
            tracing::info!(kind = %failure.error.kind, "run already failed, replaying outcome");
            return Ok(RunOutcome::Failed {
                failed_step: failure.failed_step,
                error: failure.error,
                message: failure.message,
            });
        }

        let existing = self
            .artifacts
            .existing_reply(&event.run_id)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        if let Some(outcome) = existing.and_then(RunOutcome::from_reply) {
            tracing::info!(
                message_id = %outcome.message().id,
                status = ?outcome.status(),
                "run already answered, replaying reply"
            );
            return Ok(outcome);
        }

        if let Err(invalid) = event.validate() {
            return self.fail(event, None, invalid.into()).await;
        }

        match self.pipeline(event).await {
            Ok(artifact) => {
                tracing::info!(
                    message_id = %artifact.message.id,
                    fragment_id = %artifact.fragment.id,
                    "run succeeded"
                );
                Ok(RunOutcome::Succeeded {
                    fragment: artifact.fragment,
                    message: artifact.message,
                })
            }
            Err(Halt::Step(step, error)) => self.fail(event, Some(step), error).await,
            Err(Halt::Engine(err)) => Err(err),
        }
    }

    async fn pipeline(&self, event: &JobEvent) -> Result<PersistedArtifact, Halt> {
        let run_id = &event.run_id;
        let sandboxes = &self.sandboxes;
        let agent = &self.agent;
        let artifacts = &self.artifacts;
        let port = self.sandbox_port;

        let sandbox_id: SandboxId = self
            .memo
            .run(run_id, StepName::ProvisionSandbox, move || async move {
                sandboxes
                    .provision(run_id.as_str())
                    .await
                    .map_err(StepError::from)
            })
            .await
            .map_err(halt(StepName::ProvisionSandbox))?;

        let output: AgentOutput = self
            .memo
            .run(run_id, StepName::InvokeAgent, move || async move {
                agent
                    .generate(&event.prompt_text, agent.system_policy())
                    .await
                    .map_err(StepError::from)
            })
            .await
            .map_err(halt(StepName::InvokeAgent))?;

        let sandbox_id = &sandbox_id;
        let sandbox_url: String = self
            .memo
            .run(run_id, StepName::ResolveSandboxAddress, move || async move {
                sandboxes
                    .resolve_address(sandbox_id, port)
                    .await
                    .map_err(StepError::from)
            })
            .await
            .map_err(halt(StepName::ResolveSandboxAddress))?;

        let output = &output;
        let sandbox_url = &sandbox_url;
        let artifact: PersistedArtifact = self
            .memo
            .run(run_id, StepName::PersistArtifact, move || async move {
                artifacts
                    .build(run_id, event.project_id, output, sandbox_url)
                    .await
            })
            .await
            .map_err(halt(StepName::PersistArtifact))?;

        Ok(artifact)
    }

    /// Record the failure and persist the single ERROR message.
    async fn fail(
        &self,
        event: &JobEvent,
        failed_step: Option<StepName>,
        error: StepError,
    ) -> Result<RunOutcome, EngineError> {
        let run_id = &event.run_id;
        tracing::warn!(
            step = ?failed_step.map(|s| s.as_str()),
            kind = %error.kind,
            error = %error.message,
            "run failed"
        );

        if let Some(step) = failed_step {
            self.memo
                .record_failure(run_id, step, &error)
                .await
                .map_err(|e| EngineError::Ledger(e.to_string()))?;
        }

        let artifacts = &self.artifacts;
        let project_id = event.project_id;
        let error_ref = &error;
        let recorded: RecordedFailure = match self
            .memo
            .run(run_id, StepName::PersistFailure, move || async move {
                artifacts
                    .fail(run_id, project_id, error_ref)
                    .await
                    .map(|message| RecordedFailure {
                        failed_step,
                        error: error_ref.clone(),
                        message,
                    })
            })
            .await
        {
            Ok(recorded) => recorded,
            Err(MemoError::Step(persist_error)) => {
                return Err(EngineError::FailureNotPersisted {
                    run_id: run_id.clone(),
                    error: persist_error,
                });
            }
            Err(other) => return Err(EngineError::Ledger(other.to_string())),
        };

        Ok(RunOutcome::Failed {
            failed_step: recorded.failed_step,
            error: recorded.error,
            message: recorded.message,
        })
    }

    async fn recorded_failure(&self, run_id: &RunId) -> Result<Option<RecordedFailure>, EngineError> {
        let record = self
            .memo
            .recorded(run_id, StepName::PersistFailure)
            .await
            .map_err(|e| EngineError::Ledger(e.to_string()))?;

        match record.map(|r| r.outcome) {
            Some(kiln_types::workflow::StepOutcome::Completed { output }) => {
                serde_json::from_value(output)
                    .map(Some)
                    .map_err(|e| EngineError::Ledger(format!("corrupt persist-failure record: {e}")))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use kiln_types::message::MessageRole;
    use uuid::Uuid;

    use crate::repository::message::MessageRepository;

    use crate::testing::{
        FakeLlm, FakeSandbox, MemLedger, MemMessages, TestEngine, agent_reply, test_engine,
    };
    use crate::tree::{NodeKind, build_tree};

    const TODO_REPLY: &str = r#"{"summary": "Todo app", "files": {"index.html": "<html>...</html>", "src/app.js": "..."}}"#;

    fn event(run_id: &str) -> JobEvent {
        JobEvent::new(RunId::new(run_id), Uuid::nil(), "build a todo app")
    }

    fn engine_with(sandbox: FakeSandbox, llm: FakeLlm) -> TestEngine {
        test_engine(MemLedger::default(), sandbox, llm, MemMessages::default(), 3)
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));

        let outcome = engine.run(&event("r1")).await.unwrap();
        assert_eq!(outcome.status(), WorkflowRunStatus::Succeeded);

        let RunOutcome::Succeeded { fragment, message } = outcome else {
            panic!("expected success");
        };
        assert_eq!(fragment.sandbox_url, "https://sbx-1.example");
        assert_eq!(fragment.title, "Todo app");
        assert_eq!(fragment.files.len(), 2);
        assert_eq!(fragment.files.get("index.html"), Some("<html>...</html>"));
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.message_type, MessageType::Result);
        assert_eq!(message.fragment.as_ref().map(|f| f.id), Some(fragment.id));

        let forest = build_tree(fragment.files.as_map());
        assert_eq!(forest.len(), 2);
        assert_eq!((forest[0].name.as_str(), forest[0].kind), ("src", NodeKind::Folder));
        assert_eq!(forest[0].children[0].path, "src/app.js");
        assert_eq!((forest[1].name.as_str(), forest[1].kind), ("index.html", NodeKind::File));
    }

    #[tokio::test]
    async fn test_replay_has_no_duplicate_side_effects() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));

        let first = engine.run(&event("r1")).await.unwrap();
        let second = engine.run(&event("r1")).await.unwrap();

        assert_eq!(first.message().id, second.message().id);
        let sandboxes = engine.sandboxes().provider();
        assert_eq!(sandboxes.creates.load(Ordering::SeqCst), 1);
        assert_eq!(engine.agent().provider().calls(), 1);

        let messages = engine.artifacts().messages();
        assert_eq!(messages.assistant_count(), 1);
        assert_eq!(messages.fragment_count(), 1);

        let records = engine.memo().ledger().list(&RunId::new("r1")).await.unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn test_transient_provision_failures_then_success() {
        let engine = engine_with(
            FakeSandbox::failing_first(2),
            FakeLlm::replying(TODO_REPLY),
        );

        let outcome = engine.run(&event("r1")).await.unwrap();
        assert_eq!(outcome.status(), WorkflowRunStatus::Succeeded);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_provision_retries_exhausted() {
        let engine = engine_with(
            FakeSandbox::failing_first(10),
            FakeLlm::replying(TODO_REPLY),
        );

        let outcome = engine.run(&event("r1")).await.unwrap();
        let RunOutcome::Failed {
            failed_step,
            error,
            message,
        } = outcome
        else {
            panic!("expected failure");
        };
        assert_eq!(failed_step, Some(StepName::ProvisionSandbox));
        assert_eq!(error.kind, FailureKind::TransientInfra);
        assert_eq!(message.message_type, MessageType::Error);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 3);
        assert_eq!(engine.agent().provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_escaping_path_fails_without_fragment() {
        let engine = engine_with(
            FakeSandbox::default(),
            FakeLlm::replying(r#"{"summary": "x", "files": {"../../etc/passwd": "root"}}"#),
        );

        let outcome = engine.run(&event("r1")).await.unwrap();
        let RunOutcome::Failed { error, message, .. } = &outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.kind, FailureKind::MalformedAgentOutput);
        assert_eq!(message.content, FailureKind::MalformedAgentOutput.user_summary());
        assert!(message.fragment.is_none());

        let messages = engine.artifacts().messages();
        assert_eq!(messages.fragment_count(), 0);
        assert_eq!(messages.assistant_count(), 1);

        // Terminal: redelivery neither re-invokes the agent nor adds messages.
        let replay = engine.run(&event("r1")).await.unwrap();
        assert_eq!(replay.status(), WorkflowRunStatus::Failed);
        assert_eq!(replay.message().id, message.id);
        assert_eq!(engine.agent().provider().calls(), 1);
        assert_eq!(messages.assistant_count(), 1);
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_not_retried() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::quota_exceeded());

        let outcome = engine.run(&event("r1")).await.unwrap();
        let RunOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.kind, FailureKind::QuotaExceeded);
        assert_eq!(engine.agent().provider().calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_sandbox_fails_run() {
        let engine = engine_with(FakeSandbox::expiring(), FakeLlm::replying(TODO_REPLY));

        let outcome = engine.run(&event("r1")).await.unwrap();
        let RunOutcome::Failed {
            failed_step, error, ..
        } = outcome
        else {
            panic!("expected failure");
        };
        assert_eq!(failed_step, Some(StepName::ResolveSandboxAddress));
        assert_eq!(error.kind, FailureKind::SandboxExpired);
        assert_eq!(engine.artifacts().messages().fragment_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_prompt_persists_error_without_provisioning() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));
        let event = JobEvent::new(RunId::new("r1"), Uuid::nil(), "   ");

        let outcome = engine.run(&event).await.unwrap();
        let RunOutcome::Failed {
            failed_step, error, ..
        } = outcome
        else {
            panic!("expected failure");
        };
        assert_eq!(failed_step, None);
        assert_eq!(error.kind, FailureKind::Validation);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 0);
        assert_eq!(engine.artifacts().messages().assistant_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_run_id_rejected() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));
        let err = engine.run(&event("")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidEvent(_)));
        assert_eq!(engine.artifacts().messages().assistant_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_runs_once() {
        let engine = Arc::new(engine_with(
            FakeSandbox::default(),
            FakeLlm::replying(TODO_REPLY).with_delay(Duration::from_millis(50)),
        ));

        let a = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(&event("r1")).await }
        });
        let b = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(&event("r1")).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.message().id, b.message().id);
        assert_eq!(engine.agent().provider().calls(), 1);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 1);
        assert_eq!(engine.artifacts().messages().assistant_count(), 1);
        assert!(engine.locks().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_runs_are_independent() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));

        let a = engine.run(&event("r1")).await.unwrap();
        let b = engine.run(&event("r2")).await.unwrap();
        let (RunOutcome::Succeeded { fragment: fa, .. }, RunOutcome::Succeeded { fragment: fb, .. }) =
            (a, b)
        else {
            panic!("expected two successes");
        };
        assert_ne!(fa.id, fb.id);
        assert_ne!(fa.sandbox_url, fb.sandbox_url);
        assert_eq!(engine.agent().provider().calls(), 2);
    }

    #[tokio::test]
    async fn test_reply_written_outside_ledger_is_replayed() {
        // A dispatch failure writes the ERROR reply without touching the ledger.
        let messages = MemMessages::default();
        let stored = messages
            .persist_failure(
                &RunId::new("r1"),
                &Uuid::nil(),
                FailureKind::TransientInfra.user_summary(),
            )
            .await
            .unwrap();
        let engine = test_engine(
            MemLedger::default(),
            FakeSandbox::default(),
            FakeLlm::replying(TODO_REPLY),
            messages,
            3,
        );

        let outcome = engine.run(&event("r1")).await.unwrap();
        let RunOutcome::Failed {
            failed_step,
            error,
            message,
        } = outcome
        else {
            panic!("expected failure");
        };
        assert_eq!(failed_step, None);
        assert_eq!(error.kind, FailureKind::TransientInfra);
        assert_eq!(message.id, stored.id);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 0);
        assert_eq!(engine.agent().provider().calls(), 0);
        assert_eq!(engine.artifacts().messages().assistant_count(), 1);
        assert!(engine.memo().ledger().list(&RunId::new("r1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stored_result_replays_success() {
        let engine = engine_with(FakeSandbox::default(), FakeLlm::replying(TODO_REPLY));
        let first = engine.run(&event("r1")).await.unwrap();

        // The stored RESULT alone is enough to rebuild the outcome.
        let messages = engine.artifacts().messages();
        let reply = messages.find_by_run(&RunId::new("r1")).await.unwrap().unwrap();
        let outcome = RunOutcome::from_reply(reply).unwrap();
        assert_eq!(outcome.status(), WorkflowRunStatus::Succeeded);
        assert_eq!(outcome.message().id, first.message().id);
    }

    #[tokio::test]
    async fn test_crash_after_provision_resumes_from_ledger() {
        // Pre-seed the ledger as if a previous process provisioned then died.
        let ledger = MemLedger::default();
        ledger
            .put(&kiln_types::workflow::StepRecord::completed(
                RunId::new("r1"),
                StepName::ProvisionSandbox,
                serde_json::json!("sbx-1"),
            ))
            .await
            .unwrap();
        let sandbox = FakeSandbox::default();
        sandbox.register(SandboxId::new("sbx-1"));

        let engine = test_engine(
            ledger,
            sandbox,
            FakeLlm::replying(&agent_reply("Resumed", &[("a.txt", "a")])),
            MemMessages::default(),
            3,
        );
        let outcome = engine.run(&event("r1")).await.unwrap();

        assert_eq!(outcome.status(), WorkflowRunStatus::Succeeded);
        assert_eq!(engine.sandboxes().provider().creates.load(Ordering::SeqCst), 0);
    }
}
