//! In-process job queue and workflow workers.
//!
//! [`ChannelQueue`] is the [`JobQueue`] the message service enqueues into; a
//! pool of workers drains the channel and hands each event to the workflow
//! engine. When a run returns an engine error the worker keeps redelivering
//! the event with backoff until it settles or the pool shuts down. Events
//! still pending at shutdown are picked up by the startup redelivery of the
//! next process.

use std::future::Future;
use std::sync::Arc;

use kiln_core::service::dispatch::{JobQueue, QueueError};
use kiln_core::workflow::engine::{EngineError, RunOutcome};
use kiln_core::workflow::retry::RetryPolicy;
use kiln_types::workflow::JobEvent;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::ConcreteEngine;

pub type JobReceiver = mpsc::Receiver<JobEvent>;

/// Bounded mpsc sender implementing the job queue port.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::Sender<JobEvent>,
}

/// Create a queue and its receiving end. Capacity is at least 1.
pub fn channel(capacity: usize) -> (ChannelQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelQueue { tx }, rx)
}

impl JobQueue for ChannelQueue {
    async fn enqueue(&self, event: JobEvent) -> Result<(), QueueError> {
        self.tx.send(event).await.map_err(|_| QueueError::Closed)
    }
}

/// Whatever runs a job event to its outcome. The workflow engine in
/// production.
pub trait JobRunner: Send + Sync + 'static {
    fn run_job(
        &self,
        event: &JobEvent,
    ) -> impl Future<Output = Result<RunOutcome, EngineError>> + Send;
}

impl JobRunner for ConcreteEngine {
    fn run_job(
        &self,
        event: &JobEvent,
    ) -> impl Future<Output = Result<RunOutcome, EngineError>> + Send {
        self.run(event)
    }
}

/// Handle to running workers.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Stop taking new events and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker task panicked");
            }
        }
        tracing::debug!("job workers stopped");
    }
}

/// Spawn `count` workers sharing one receiver.
///
/// `redelivery` paces repeated attempts at an event whose run returned an
/// engine error; its `max_attempts` is not consulted.
pub fn spawn_workers<R: JobRunner>(
    runner: Arc<R>,
    rx: JobReceiver,
    count: usize,
    redelivery: RetryPolicy,
    cancel: CancellationToken,
) -> WorkerPool {
    let rx = Arc::new(Mutex::new(rx));
    let redelivery = Arc::new(redelivery);
    let handles = (0..count.max(1))
        .map(|worker| {
            tokio::spawn(worker_loop(
                worker,
                Arc::clone(&runner),
                Arc::clone(&rx),
                Arc::clone(&redelivery),
                cancel.clone(),
            ))
        })
        .collect();

    tracing::info!(workers = count.max(1), "job workers started");
    WorkerPool { cancel, handles }
}

async fn worker_loop<R: JobRunner>(
    worker: usize,
    runner: Arc<R>,
    rx: Arc<Mutex<JobReceiver>>,
    redelivery: Arc<RetryPolicy>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = async { rx.lock().await.recv().await } => match event {
                Some(event) => event,
                None => break,
            },
        };

        run_until_settled(worker, runner.as_ref(), &event, &redelivery, &cancel).await;
    }
}

/// Run `event` until the engine reports an outcome.
///
/// Engine errors leave the run PENDING, so the event is tried again after a
/// backoff. Cancellation abandons the event; its prompt stays unanswered and
/// is redelivered on the next startup.
async fn run_until_settled<R: JobRunner>(
    worker: usize,
    runner: &R,
    event: &JobEvent,
    redelivery: &RetryPolicy,
    cancel: &CancellationToken,
) {
    let mut attempt: u32 = 1;
    loop {
        match runner.run_job(event).await {
            Ok(outcome) => {
                tracing::info!(
                    worker,
                    run_id = %event.run_id,
                    status = %outcome.status(),
                    attempt,
                    "run finished"
                );
                return;
            }
            Err(err @ EngineError::InvalidEvent(_)) => {
                tracing::error!(worker, run_id = %event.run_id, error = %err, "job event rejected");
                return;
            }
            Err(err) => {
                let delay = redelivery.backoff(attempt);
                tracing::warn!(
                    worker,
                    run_id = %event.run_id,
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "run left pending, redelivering"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::warn!(worker, run_id = %event.run_id, "shutdown with run pending");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
