//! Application state wiring concrete infrastructure to the services.
//!
//! `AppState` is shared by every CLI command and axum handler. Services are
//! held behind `Arc` so the state clones cheaply into handlers.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_core::llm::box_provider::BoxLlmProvider;
use kiln_core::sandbox::box_provider::BoxSandboxProvider;
use kiln_core::service::message::MessageService;
use kiln_core::service::project::ProjectService;
use kiln_core::workflow::engine::WorkflowEngine;
use kiln_core::workflow::retry::RetryPolicy;
use kiln_infra::config::{load_config, resolve_data_dir};
use kiln_infra::sqlite::ledger::SqliteStepLedger;
use kiln_infra::sqlite::message::SqliteMessageRepository;
use kiln_infra::sqlite::pool::{DatabasePool, database_url};
use kiln_infra::sqlite::project::SqliteProjectRepository;
use kiln_types::config::KilnConfig;
use tokio_util::sync::CancellationToken;

use crate::worker::{self, ChannelQueue, JobReceiver, WorkerPool};

/// The workflow engine over SQLite storage and runtime-selected providers.
pub type ConcreteEngine = WorkflowEngine<
    SqliteStepLedger,
    BoxSandboxProvider,
    BoxLlmProvider,
    SqliteMessageRepository,
>;

pub type ConcreteProjectService = ProjectService<SqliteProjectRepository>;

pub type ConcreteMessageService =
    MessageService<SqliteProjectRepository, SqliteMessageRepository, ChannelQueue>;

#[derive(Clone)]
pub struct AppState {
    pub project_service: Arc<ConcreteProjectService>,
    pub message_service: Arc<ConcreteMessageService>,
    /// Direct repository access for reply polling.
    pub message_repo: SqliteMessageRepository,
    pub ledger: SqliteStepLedger,
    pub config: Arc<KilnConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire
    /// services.
    ///
    /// Returns the receiving end of the job queue; pass it to
    /// [`AppState::start_workers`] to process prompts.
    pub async fn init() -> anyhow::Result<(Self, JobReceiver)> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        tracing::debug!(data_dir = %data_dir.display(), "database ready");

        Ok(Self::build(db_pool, config, data_dir))
    }

    /// Wire services over an already opened pool.
    pub fn build(
        db_pool: DatabasePool,
        config: KilnConfig,
        data_dir: PathBuf,
    ) -> (Self, JobReceiver) {
        let (queue, jobs) = worker::channel(config.server.queue_capacity);

        let project_repo = SqliteProjectRepository::new(db_pool.clone());
        let message_repo = SqliteMessageRepository::new(db_pool.clone());
        let ledger = SqliteStepLedger::new(db_pool.clone());

        let state = Self {
            project_service: Arc::new(ProjectService::new(project_repo.clone())),
            message_service: Arc::new(MessageService::new(
                project_repo,
                message_repo.clone(),
                queue,
            )),
            message_repo,
            ledger,
            config: Arc::new(config),
            data_dir,
            db_pool,
        };
        (state, jobs)
    }

    pub fn engine(&self, sandbox: BoxSandboxProvider, llm: BoxLlmProvider) -> ConcreteEngine {
        WorkflowEngine::from_config(
            self.ledger.clone(),
            sandbox,
            llm,
            self.message_repo.clone(),
            &self.config,
        )
    }

    /// Engine over the providers named in config.
    pub fn configured_engine(&self) -> anyhow::Result<ConcreteEngine> {
        let sandbox = kiln_infra::sandbox::create_provider(&self.config.sandbox, &self.data_dir)?;
        let llm = kiln_infra::llm::create_provider(&self.config.agent)?;
        Ok(self.engine(sandbox, llm))
    }

    /// Start `[server].workers` workers draining `jobs` over the configured
    /// providers.
    pub fn start_workers(&self, jobs: JobReceiver) -> anyhow::Result<WorkerPool> {
        let engine = self.configured_engine()?;
        Ok(self.start_workers_with(engine, jobs))
    }

    /// Start workers over `engine`, then redeliver every prompt still waiting
    /// on its reply.
    ///
    /// Redelivery runs in the background since enqueueing waits on queue
    /// capacity.
    pub fn start_workers_with(&self, engine: ConcreteEngine, jobs: JobReceiver) -> WorkerPool {
        let pool = worker::spawn_workers(
            Arc::new(engine),
            jobs,
            self.config.server.workers,
            RetryPolicy::from_config(&self.config.workflow),
            CancellationToken::new(),
        );

        let messages = Arc::clone(&self.message_service);
        tokio::spawn(async move {
            if let Err(e) = messages.redeliver_pending().await {
                tracing::error!(error = %e, "failed to redeliver pending jobs");
            }
        });
        pool
    }
}
