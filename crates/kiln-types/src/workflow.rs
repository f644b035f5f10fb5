//! Workflow domain types for Kiln.
//!
//! Defines the inbound job event, the deterministic run identifier, the fixed
//! step pipeline, and the Step Ledger record shapes used by the workflow
//! engine in kiln-core.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{FailureKind, RepositoryError, ValidationError};
use crate::message::validate_prompt;

/// Event name the dispatcher emits for a new user message.
pub const RUN_EVENT_NAME: &str = "code-agent/run";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identifier of one workflow run.
///
/// Derived deterministically from the triggering event so that redelivery of
/// the same event resumes the same run instead of starting a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the run id for the job triggered by `message_id`.
    ///
    /// `sha256("code-agent/run:" + message_id)`, hex encoded, first 32 chars.
    pub fn derive_for_message(message_id: Uuid) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(RUN_EVENT_NAME.as_bytes());
        hasher.update(b":");
        hasher.update(message_id.to_string().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// Inbound job event consumed by the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub run_id: RunId,
    pub project_id: Uuid,
    pub prompt_text: String,
}

impl JobEvent {
    pub fn new(run_id: RunId, project_id: Uuid, prompt_text: impl Into<String>) -> Self {
        Self {
            run_id,
            project_id,
            prompt_text: prompt_text.into(),
        }
    }

    /// Check the event is well-formed: non-empty run id, prompt of
    /// 1..=10000 characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.run_id.as_str().trim().is_empty() {
            return Err(ValidationError::Required { field: "run_id" });
        }
        validate_prompt(&self.prompt_text)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A named, individually memoized unit of work within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    ProvisionSandbox,
    InvokeAgent,
    ResolveSandboxAddress,
    PersistArtifact,
    /// Terminal step executed only when the pipeline fails.
    PersistFailure,
}

impl StepName {
    /// The fixed success pipeline, in execution order.
    pub const PIPELINE: [StepName; 4] = [
        StepName::ProvisionSandbox,
        StepName::InvokeAgent,
        StepName::ResolveSandboxAddress,
        StepName::PersistArtifact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::ProvisionSandbox => "provision-sandbox",
            StepName::InvokeAgent => "invoke-agent",
            StepName::ResolveSandboxAddress => "resolve-sandbox-address",
            StepName::PersistArtifact => "persist-artifact",
            StepName::PersistFailure => "persist-failure",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision-sandbox" => Ok(StepName::ProvisionSandbox),
            "invoke-agent" => Ok(StepName::InvokeAgent),
            "resolve-sandbox-address" => Ok(StepName::ResolveSandboxAddress),
            "persist-artifact" => Ok(StepName::PersistArtifact),
            "persist-failure" => Ok(StepName::PersistFailure),
            other => Err(format!("invalid step name: '{other}'")),
        }
    }
}

/// Terminal status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowRunStatus {
    Pending,
    Succeeded,
    Failed,
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowRunStatus::Pending => write!(f, "PENDING"),
            WorkflowRunStatus::Succeeded => write!(f, "SUCCEEDED"),
            WorkflowRunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Step Ledger records
// ---------------------------------------------------------------------------

/// What a step produced: a serialized output or a recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { output: serde_json::Value },
    Failed { kind: FailureKind, message: String },
}

impl StepOutcome {
    /// Storage label, matches the `outcome` column CHECK constraint.
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed { .. } => "completed",
            StepOutcome::Failed { .. } => "failed",
        }
    }
}

/// One Step Ledger entry, keyed by `(run_id, step_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: RunId,
    pub step_name: StepName,
    pub outcome: StepOutcome,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn completed(run_id: RunId, step_name: StepName, output: serde_json::Value) -> Self {
        Self {
            run_id,
            step_name,
            outcome: StepOutcome::Completed { output },
            completed_at: Utc::now(),
        }
    }

    pub fn failed(run_id: RunId, step_name: StepName, error: &StepError) -> Self {
        Self {
            run_id,
            step_name,
            outcome: StepOutcome::Failed {
                kind: error.kind,
                message: error.message.clone(),
            },
            completed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// The single error type a step body returns.
///
/// Adapter errors convert into this via `From` impls that carry their
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: FailureKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientInfra, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<ValidationError> for StepError {
    fn from(err: ValidationError) -> Self {
        StepError::new(FailureKind::Validation, err.to_string())
    }
}

impl From<RepositoryError> for StepError {
    fn from(err: RepositoryError) -> Self {
        let kind = match err {
            RepositoryError::Connection => FailureKind::TransientInfra,
            _ => FailureKind::Internal,
        };
        StepError::new(kind, err.to_string())
    }
}
