//! Step Ledger trait definition.
//!
//! The ledger is the durable memoization store behind the workflow engine:
//! one record per `(run_id, step_name)`, written once, read on every re-entry
//! into that step. It must outlive any single process since resumability
//! depends on it.

use kiln_types::error::RepositoryError;
use kiln_types::workflow::{RunId, StepName, StepRecord};

/// Repository trait for Step Ledger persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait StepLedger: Send + Sync {
    /// Look up the record for `(run_id, step)`, if one was written.
    fn get(
        &self,
        run_id: &RunId,
        step: StepName,
    ) -> impl std::future::Future<Output = Result<Option<StepRecord>, RepositoryError>> + Send;

    /// Write a record. Write-once per key: returns `false` (and changes
    /// nothing) if a record for the same `(run_id, step_name)` already exists.
    fn put(
        &self,
        record: &StepRecord,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All records for one run, in completion order.
    fn list(
        &self,
        run_id: &RunId,
    ) -> impl std::future::Future<Output = Result<Vec<StepRecord>, RepositoryError>> + Send;
}
