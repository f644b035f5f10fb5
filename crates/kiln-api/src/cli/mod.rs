//! CLI command definitions for the `kiln` binary.

pub mod job;
pub mod message;
pub mod project;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Turn prompts into running code.
#[derive(Parser)]
#[command(name = "kiln", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (RUST_LOG still wins when set).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Acting user id.
    #[arg(long, global = true, env = "KILN_USER", default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and job workers.
    Serve {
        /// Host to bind to (defaults to `[server].host`).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to `[server].port`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },

    /// Start a project from its first prompt and wait for the reply.
    New { prompt: String },

    /// Send a prompt to a project and wait for the reply.
    Send {
        project_id: String,
        prompt: String,
    },

    /// Show a project's conversation.
    Messages { project_id: String },

    /// Show a fragment's file tree.
    Tree {
        fragment_id: String,

        /// File to select instead of the first one.
        #[arg(long)]
        select: Option<String>,
    },

    /// Re-deliver a job event to the workflow engine.
    #[command(name = "run-job")]
    RunJob {
        run_id: String,
        project_id: String,
        prompt: String,
    },

    /// Show the Step Ledger records of a run.
    Steps { run_id: String },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project.
    Create { name: String },

    /// List your projects.
    #[command(alias = "ls")]
    List,
}

/// Parse a UUID argument with a readable error.
pub(crate) fn parse_id(raw: &str, what: &str) -> anyhow::Result<uuid::Uuid> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid {what} id: '{raw}'"))
}
