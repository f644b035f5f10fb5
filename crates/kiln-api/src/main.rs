//! Kiln CLI and REST API entry point.
//!
//! Binary name: `kiln`
//!
//! Parses CLI arguments, opens the database and wires services, then
//! dispatches to a command handler or starts the REST API server with its
//! job workers.

mod cli;
mod http;
mod state;
mod worker;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, ProjectCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "kiln", &mut std::io::stdout());
        return Ok(());
    }

    kiln_observe::tracing_setup::init_tracing(cli.otel, cli.verbose > 0)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    kiln_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (state, jobs) = AppState::init().await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let workers = state.start_workers(jobs)?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            println!(
                "  {} Kiln API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            workers.shutdown().await;
            println!("\n  Server stopped.");
        }

        Commands::Project { action } => match action {
            ProjectCommand::Create { name } => {
                cli::project::create_project(&state, &cli.user, &name, cli.json).await?;
            }
            ProjectCommand::List => {
                cli::project::list_projects(&state, &cli.user, cli.json).await?;
            }
        },

        Commands::New { prompt } => {
            let workers = state.start_workers(jobs)?;
            let result = cli::message::new_project(&state, &cli.user, &prompt, cli.json).await;
            workers.shutdown().await;
            result?;
        }

        Commands::Send { project_id, prompt } => {
            let workers = state.start_workers(jobs)?;
            let result =
                cli::message::send(&state, &cli.user, &project_id, &prompt, cli.json).await;
            workers.shutdown().await;
            result?;
        }

        Commands::Messages { project_id } => {
            cli::message::list_messages(&state, &cli.user, &project_id, cli.json).await?;
        }

        Commands::Tree { fragment_id, select } => {
            cli::message::show_tree(&state, &cli.user, &fragment_id, select.as_deref(), cli.json)
                .await?;
        }

        Commands::RunJob {
            run_id,
            project_id,
            prompt,
        } => {
            cli::job::run_job(&state, &run_id, &project_id, &prompt, cli.json).await?;
        }

        Commands::Steps { run_id } => {
            cli::job::list_steps(&state, &run_id, cli.json).await?;
        }

        // Handled before state init.
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
