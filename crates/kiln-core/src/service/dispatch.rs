//! Dispatcher edge: the job queue port.
//!
//! The message service hands every accepted prompt to a [`JobQueue`] as a
//! [`JobEvent`]. The in-process queue worker in kiln-api implements it; a
//! durable broker could too.

use kiln_types::workflow::JobEvent;

/// Errors from enqueueing a job event.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,
}

/// Port for delivering job events to the workflow engine.
pub trait JobQueue: Send + Sync {
    /// Deliver `event`. Waits for capacity when the queue is full.
    fn enqueue(
        &self,
        event: JobEvent,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}
