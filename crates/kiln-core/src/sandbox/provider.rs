//! SandboxProvider trait definition and error classification.

use kiln_types::error::FailureKind;
use kiln_types::sandbox::SandboxId;
use kiln_types::workflow::StepError;

/// Errors from sandbox provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox service unavailable: {0}")]
    Unavailable(String),

    #[error("sandbox request timed out")]
    Timeout,

    #[error("sandbox quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("sandbox not found: {0}")]
    NotFound(SandboxId),

    #[error("sandbox request rejected: {0}")]
    Rejected(String),
}

impl SandboxError {
    /// Workflow classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SandboxError::Unavailable(_) | SandboxError::Timeout => FailureKind::TransientInfra,
            SandboxError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            SandboxError::NotFound(_) => FailureKind::SandboxExpired,
            SandboxError::Rejected(_) => FailureKind::Internal,
        }
    }
}

impl From<SandboxError> for StepError {
    fn from(err: SandboxError) -> Self {
        StepError::new(err.failure_kind(), err.to_string())
    }
}

/// Trait for sandbox backends (remote control plane, local directories).
///
/// Implementations live in kiln-infra.
pub trait SandboxProvider: Send + Sync {
    /// Human-readable provider name (e.g., "http", "local").
    fn name(&self) -> &str;

    /// Create the sandbox for `workspace_key`, or return the one already
    /// created for that key. Must be idempotent per key.
    fn create(
        &self,
        workspace_key: &str,
    ) -> impl std::future::Future<Output = Result<SandboxId, SandboxError>> + Send;

    /// Public host (no scheme) exposing `port` of an existing sandbox.
    ///
    /// Returns [`SandboxError::NotFound`] if the sandbox no longer exists.
    fn host(
        &self,
        sandbox_id: &SandboxId,
        port: u16,
    ) -> impl std::future::Future<Output = Result<String, SandboxError>> + Send;
}
