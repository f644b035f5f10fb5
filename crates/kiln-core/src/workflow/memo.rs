//! Memoized step execution over the Step Ledger.
//!
//! [`StepMemo::run`] is the heart of replay safety: a step whose record is
//! already in the ledger is never re-invoked, and a freshly executed step's
//! result is written to the ledger before the caller sees it. A crash between
//! a step's side effect and its ledger write may repeat that side effect on
//! resume; a crash after the write never does.

use std::future::Future;

use kiln_types::workflow::{RunId, StepError, StepName, StepOutcome, StepRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::repository::ledger::StepLedger;
use crate::workflow::retry::{RetryPolicy, StepTimeouts};

/// Errors from memoized step execution.
#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    /// The step itself failed (after retries, if any applied).
    #[error(transparent)]
    Step(#[from] StepError),

    /// The ledger could not be read or written.
    #[error("step ledger error: {0}")]
    Ledger(String),

    /// A ledger record exists but cannot be decoded as the step's output.
    #[error("corrupt ledger record for {run_id}/{step}: {reason}")]
    Corrupt {
        run_id: RunId,
        step: StepName,
        reason: String,
    },
}

/// Step Ledger wrapper applying memoization, retry and timeout policy.
///
/// Generic over `L: StepLedger` so it works with any storage backend
/// (SQLite, in-memory mock, etc.).
pub struct StepMemo<L: StepLedger> {
    ledger: L,
    policy: RetryPolicy,
    timeouts: StepTimeouts,
}

impl<L: StepLedger> StepMemo<L> {
    pub fn new(ledger: L, policy: RetryPolicy, timeouts: StepTimeouts) -> Self {
        Self {
            ledger,
            policy,
            timeouts,
        }
    }

    /// Access the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `body` as step `step` of run `run_id`, at most once as
    /// observed by the workflow.
    ///
    /// - Ledger hit (completed): decode and return the recorded output.
    /// - Ledger hit (failed): return the recorded failure without re-running.
    /// - Miss: run `body` under the step timeout, retrying transient failures
    ///   with backoff, then write the result before returning it.
    ///
    /// Failures are returned but not recorded; see [`StepMemo::record_failure`].
    pub async fn run<T, F, Fut>(
        &self,
        run_id: &RunId,
        step: StepName,
        mut body: F,
    ) -> Result<T, MemoError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StepError>> + Send,
    {
        if let Some(record) = self.recorded(run_id, step).await? {
            tracing::debug!(run_id = %run_id, step = %step, "step ledger hit, skipping execution");
            return Self::decode(run_id, step, record.outcome);
        }

        let timeout = self.timeouts.for_step(step);
        let mut attempt = 1u32;
        loop {
            tracing::info!(run_id = %run_id, step = %step, attempt, "executing step");

            let result = match tokio::time::timeout(timeout, body()).await {
                Ok(result) => result,
                Err(_) => Err(StepError::transient(format!(
                    "{step} timed out after {}s",
                    timeout.as_secs_f64()
                ))),
            };

            match result {
                Ok(value) => return self.commit(run_id, step, value).await,
                Err(error) if self.policy.should_retry(attempt, &error) => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        run_id = %run_id,
                        step = %step,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient step failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        run_id = %run_id,
                        step = %step,
                        attempt,
                        kind = %error.kind,
                        error = %error.message,
                        "step failed"
                    );
                    return Err(MemoError::Step(error));
                }
            }
        }
    }

    /// Record a terminal failure for `step`. First writer wins: an existing
    /// record is left untouched.
    pub async fn record_failure(
        &self,
        run_id: &RunId,
        step: StepName,
        error: &StepError,
    ) -> Result<(), MemoError> {
        let record = StepRecord::failed(run_id.clone(), step, error);
        let inserted = self
            .ledger
            .put(&record)
            .await
            .map_err(|e| MemoError::Ledger(e.to_string()))?;
        if !inserted {
            tracing::debug!(run_id = %run_id, step = %step, "failure already recorded");
        }
        Ok(())
    }

    /// Read the ledger record for `(run_id, step)`.
    pub async fn recorded(
        &self,
        run_id: &RunId,
        step: StepName,
    ) -> Result<Option<StepRecord>, MemoError> {
        self.ledger
            .get(run_id, step)
            .await
            .map_err(|e| MemoError::Ledger(e.to_string()))
    }

    async fn commit<T>(&self, run_id: &RunId, step: StepName, value: T) -> Result<T, MemoError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let output = serde_json::to_value(&value).map_err(|e| MemoError::Corrupt {
            run_id: run_id.clone(),
            step,
            reason: e.to_string(),
        })?;
        let record = StepRecord::completed(run_id.clone(), step, output);
        let inserted = self
            .ledger
            .put(&record)
            .await
            .map_err(|e| MemoError::Ledger(e.to_string()))?;

        if inserted {
            tracing::debug!(run_id = %run_id, step = %step, "step result recorded");
            return Ok(value);
        }

        // Lost the race to another writer: the first recorded result wins.
        tracing::warn!(run_id = %run_id, step = %step, "step already recorded, using first result");
        match self.recorded(run_id, step).await? {
            Some(existing) => Self::decode(run_id, step, existing.outcome),
            None => Err(MemoError::Ledger(format!(
                "record for {run_id}/{step} vanished after conflicting write"
            ))),
        }
    }

    fn decode<T: DeserializeOwned>(
        run_id: &RunId,
        step: StepName,
        outcome: StepOutcome,
    ) -> Result<T, MemoError> {
        match outcome {
            StepOutcome::Completed { output } => {
                serde_json::from_value(output).map_err(|e| MemoError::Corrupt {
                    run_id: run_id.clone(),
                    step,
                    reason: e.to_string(),
                })
            }
            StepOutcome::Failed { kind, message } => Err(MemoError::Step(StepError { kind, message })),
        }
    }
}
