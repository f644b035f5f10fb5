//! Retry policy and step timeouts.
//!
//! Stateless: the engine asks [`RetryPolicy::should_retry`] after every
//! failed attempt and sleeps for [`RetryPolicy::backoff`] before the next.
//! Only transient failures are ever retried.

use std::time::Duration;

use kiln_types::config::WorkflowConfig;
use kiln_types::workflow::{StepError, StepName};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per step, including the first. Never less than 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Whether another attempt should follow failed attempt number `attempt`
    /// (1-based).
    pub fn should_retry(&self, attempt: u32, error: &StepError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt that follows failed attempt `attempt`.
    ///
    /// `initial * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

// ---------------------------------------------------------------------------
// StepTimeouts
// ---------------------------------------------------------------------------

/// Wall-clock bound for a single attempt of each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTimeouts {
    pub provision: Duration,
    pub agent: Duration,
    pub resolve: Duration,
    pub persist: Duration,
}

impl StepTimeouts {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            provision: Duration::from_secs(config.provision_timeout_secs),
            agent: Duration::from_secs(config.agent_timeout_secs),
            resolve: Duration::from_secs(config.resolve_timeout_secs),
            persist: Duration::from_secs(config.persist_timeout_secs),
        }
    }

    pub fn for_step(&self, step: StepName) -> Duration {
        match step {
            StepName::ProvisionSandbox => self.provision,
            StepName::InvokeAgent => self.agent,
            StepName::ResolveSandboxAddress => self.resolve,
            StepName::PersistArtifact | StepName::PersistFailure => self.persist,
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}
