//! Job CLI commands: redeliver a job event, inspect a run's Step Ledger.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use kiln_core::repository::ledger::StepLedger;
use kiln_core::workflow::engine::RunOutcome;
use kiln_types::workflow::{JobEvent, RunId, StepOutcome};

use super::parse_id;
use crate::state::AppState;

/// Run (or resume) one job event in the foreground.
///
/// Completed steps replay from the ledger; a terminal run reports its
/// recorded outcome without touching the sandbox or the model again.
pub async fn run_job(
    state: &AppState,
    run_id: &str,
    project_id: &str,
    prompt: &str,
    json: bool,
) -> Result<()> {
    let event = JobEvent::new(
        RunId::new(run_id.trim()),
        parse_id(project_id, "project")?,
        prompt,
    );
    let engine = state.configured_engine()?;
    let outcome = engine.run(&event).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(outcome.message())?);
        return Ok(());
    }

    println!();
    match &outcome {
        RunOutcome::Succeeded { fragment, .. } => {
            println!(
                "  {} Run {} {}",
                style("✓").green().bold(),
                style(&event.run_id).dim(),
                style(outcome.status()).green()
            );
            println!("    {} {}", style("Title:").bold(), fragment.title);
            println!("    {} {}", style("Preview:").bold(), style(&fragment.sandbox_url).cyan());
        }
        RunOutcome::Failed {
            failed_step,
            error,
            message,
        } => {
            println!(
                "  {} Run {} {}",
                style("✗").red().bold(),
                style(&event.run_id).dim(),
                style(outcome.status()).red()
            );
            if let Some(step) = failed_step {
                println!("    {} {step}", style("Step:").bold());
            }
            println!("    {} {}", style("Kind:").bold(), error.kind);
            println!("    {} {}", style("Reply:").bold(), message.content);
        }
    }
    println!();
    Ok(())
}

pub async fn list_steps(state: &AppState, run_id: &str, json: bool) -> Result<()> {
    let run_id = RunId::new(run_id.trim());
    let records = state.ledger.list(&run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!(
            "  {} No steps recorded for run {}",
            style("i").blue().bold(),
            style(&run_id).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Step").fg(Color::White),
        Cell::new("Outcome").fg(Color::White),
        Cell::new("Detail").fg(Color::White),
        Cell::new("Completed").fg(Color::White),
    ]);

    for record in &records {
        let (outcome, detail) = match &record.outcome {
            StepOutcome::Completed { .. } => (Cell::new("● completed").fg(Color::Green), String::new()),
            StepOutcome::Failed { kind, message } => (
                Cell::new("✗ failed").fg(Color::Red),
                format!("{kind}: {message}"),
            ),
        };
        table.add_row(vec![
            Cell::new(record.step_name.as_str()).fg(Color::Cyan),
            outcome,
            Cell::new(detail),
            Cell::new(record.completed_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
