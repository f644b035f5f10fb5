//! System policy and prompt construction for the code agent.

use kiln_types::agent::AgentResponse;

/// Built-in persona used when no override is configured.
pub const DEFAULT_PERSONA: &str = "You are an expert next.js developer. You write readable, \
maintainable code. You write simple next.js and react snippets.";

/// Wrap the user's request the way the agent expects it.
pub fn user_prompt(value: &str) -> String {
    format!("write the following snippet: {}", value.trim())
}

/// Full system policy: persona followed by the structured output contract.
pub fn system_policy(persona: Option<&str>) -> String {
    let persona = persona
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PERSONA);
    format!("{persona}\n\n{}", output_contract())
}

/// Instructions pinning the response to the `AgentResponse` JSON shape.
pub fn output_contract() -> String {
    let schema = schemars::schema_for!(AgentResponse);
    let schema_json = serde_json::to_string_pretty(schema.as_value()).unwrap_or_default();
    format!(
        "Respond with a single JSON object and nothing else. It must match this JSON schema:\n\
         {schema_json}\n\
         `summary` is one short sentence describing what you built. `files` lists every file \
         you created or changed, using paths relative to the project root (for example \
         `app/page.tsx`). Never use absolute paths or `..` segments. Always include full file \
         contents, never diffs."
    )
}
