//! Project CLI commands: create, list.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use crate::state::AppState;

pub async fn create_project(state: &AppState, user: &str, name: &str, json: bool) -> Result<()> {
    let project = state.project_service.create_project(user, name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&project)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Project {} created",
        style("✓").green().bold(),
        style(&project.name).cyan()
    );
    println!("    {} {}", style("ID:").bold(), style(project.id).dim());
    println!();
    println!(
        "  Send a prompt: {}",
        style(format!("kiln send {} \"build a todo app\"", project.id)).yellow()
    );
    println!();
    Ok(())
}

pub async fn list_projects(state: &AppState, user: &str, json: bool) -> Result<()> {
    let projects = state.project_service.list_projects(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!();
        println!(
            "  {} No projects yet. Create one with {}",
            style("i").blue().bold(),
            style("kiln project create <name>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for project in &projects {
        table.add_row(vec![
            Cell::new(&project.name).fg(Color::Cyan),
            Cell::new(project.id.to_string()).fg(Color::DarkGrey),
            Cell::new(project.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} project{}",
        style(projects.len()).bold(),
        if projects.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}
