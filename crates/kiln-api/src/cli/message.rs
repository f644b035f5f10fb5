//! Conversation CLI commands: new, send, messages, tree.

use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kiln_core::repository::message::MessageRepository;
use kiln_core::tree::TreeNode;
use kiln_types::config::WorkflowConfig;
use kiln_types::message::{Message, MessageRole, MessageType};
use kiln_types::workflow::RunId;

use super::parse_id;
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on how long a run can take before every step has either
/// finished or exhausted its retries.
pub(crate) fn reply_deadline(config: &WorkflowConfig) -> Duration {
    let per_attempt = config.provision_timeout_secs
        + config.agent_timeout_secs
        + config.resolve_timeout_secs
        + config.persist_timeout_secs * 2;
    let attempts = u64::from(config.max_attempts.max(1));
    Duration::from_secs(per_attempt * attempts)
        + Duration::from_millis(config.max_backoff_ms * attempts * 4)
}

/// Accept a prompt, then wait for the run's assistant reply.
pub async fn send(
    state: &AppState,
    user: &str,
    project_id: &str,
    prompt: &str,
    json: bool,
) -> Result<()> {
    let project_id = parse_id(project_id, "project")?;
    let message = state
        .message_service
        .create(user, &project_id, prompt)
        .await?;
    wait_and_print(state, &message, json).await
}

/// Start a project from its first prompt, then wait for the reply.
pub async fn new_project(state: &AppState, user: &str, prompt: &str, json: bool) -> Result<()> {
    let (project, message) = state
        .message_service
        .create_project_from_prompt(user, prompt)
        .await?;
    if !json {
        println!();
        println!(
            "  {} Created project {} ({})",
            style("✓").green().bold(),
            style(&project.name).cyan().bold(),
            style(project.id).dim()
        );
    }
    wait_and_print(state, &message, json).await
}

async fn wait_and_print(state: &AppState, message: &Message, json: bool) -> Result<()> {
    let run_id = RunId::derive_for_message(message.id);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!("Building (run {run_id})..."));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let deadline = tokio::time::Instant::now() + reply_deadline(&state.config.workflow);
    let reply = loop {
        if let Some(reply) = state.message_repo.find_by_run(&run_id).await? {
            break reply;
        }
        if tokio::time::Instant::now() >= deadline {
            spinner.finish_and_clear();
            anyhow::bail!(
                "no reply for run {run_id} yet; it resumes the next time workers start (`kiln serve`)"
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    println!();
    print_reply(&reply);
    println!();
    Ok(())
}

fn print_reply(reply: &Message) {
    if reply.is_error() {
        println!("  {} {}", style("✗").red().bold(), reply.content);
        return;
    }

    println!("  {} {}", style("✓").green().bold(), reply.content);
    if let Some(fragment) = &reply.fragment {
        println!("    {} {}", style("Preview:").bold(), style(&fragment.sandbox_url).cyan());
        println!("    {} {}", style("Fragment:").bold(), style(fragment.id).dim());
        for path in fragment.files.paths() {
            println!("      {} {}", style("•").dim(), path);
        }
    }
}

pub async fn list_messages(state: &AppState, user: &str, project_id: &str, json: bool) -> Result<()> {
    let project_id = parse_id(project_id, "project")?;
    let messages = state.message_service.get_many(user, &project_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!("  {} No messages yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Fragment").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for message in &messages {
        let role = match (message.role, message.message_type) {
            (MessageRole::User, _) => Cell::new("user").fg(Color::Cyan),
            (MessageRole::Assistant, MessageType::Result) => Cell::new("● kiln").fg(Color::Green),
            (MessageRole::Assistant, MessageType::Error) => Cell::new("✗ kiln").fg(Color::Red),
        };
        let content = truncate(&message.content, 60);
        let fragment = message
            .fragment
            .as_ref()
            .map(|f| format!("{} ({} files)", f.id, f.files.len()))
            .unwrap_or_default();

        table.add_row(vec![
            role,
            Cell::new(content),
            Cell::new(fragment).fg(Color::DarkGrey),
            Cell::new(message.created_at.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn show_tree(
    state: &AppState,
    user: &str,
    fragment_id: &str,
    select: Option<&str>,
    json: bool,
) -> Result<()> {
    let fragment_id = parse_id(fragment_id, "fragment")?;
    let view = state
        .message_service
        .explore_fragment(user, &fragment_id, select)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!();
    for node in &view.tree {
        print_node(node, 1, view.selected.as_deref());
    }
    if view.selected.is_some() {
        let trail: Vec<&str> = view.breadcrumbs.iter().map(|c| c.name.as_str()).collect();
        println!();
        println!(
            "  {} {} {}",
            style("Selected:").bold(),
            trail.join(" › "),
            style(format!("[{}]", view.language.as_deref().unwrap_or("text"))).dim()
        );
    }
    println!();
    Ok(())
}

fn print_node(node: &TreeNode, depth: usize, selected: Option<&str>) {
    let indent = "  ".repeat(depth);
    if node.is_folder() {
        println!("{indent}{}/", style(&node.name).blue().bold());
        for child in &node.children {
            print_node(child, depth + 1, selected);
        }
    } else if selected == Some(node.path.as_str()) {
        println!("{indent}{}", style(&node.name).cyan().bold());
    } else {
        println!("{indent}{}", node.name);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_deadline_covers_all_retries() {
        let config = WorkflowConfig::default();
        let deadline = reply_deadline(&config);
        let single_pass = Duration::from_secs(
            config.provision_timeout_secs
                + config.agent_timeout_secs
                + config.resolve_timeout_secs
                + config.persist_timeout_secs,
        );
        assert!(deadline > single_pass * config.max_attempts);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
