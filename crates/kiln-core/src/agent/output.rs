//! Parsing and validation of the model's raw reply.
//!
//! The reply is expected to be a JSON [`AgentResponse`], possibly wrapped in
//! a Markdown code fence or surrounded by stray prose. Anything that does not
//! yield a well-formed response with at least one valid file is rejected as
//! malformed.

use kiln_types::agent::{AgentOutput, AgentResponse};

/// Parse and normalize the model's raw reply.
///
/// Returns a human-readable reason on failure.
pub fn parse_agent_reply(content: &str) -> Result<AgentOutput, String> {
    let json = extract_json(content).ok_or_else(|| "reply contains no JSON object".to_string())?;
    let response: AgentResponse =
        serde_json::from_str(json).map_err(|e| format!("reply does not match contract: {e}"))?;
    let output = AgentOutput::try_from(response).map_err(|e| e.to_string())?;
    if output.files.is_empty() {
        return Err("reply contains no files".to_string());
    }
    Ok(output)
}

/// Locate the JSON object in a reply.
///
/// Prefers the body of the first fenced code block; otherwise takes the span
/// from the first `{` to the last `}`.
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(fenced) = fenced_block(content) {
        let fenced = fenced.trim();
        if fenced.starts_with('{') {
            return Some(fenced);
        }
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn fenced_block(content: &str) -> Option<&str> {
    let open = content.find("```")?;
    let after_open = &content[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the fence line.
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}
