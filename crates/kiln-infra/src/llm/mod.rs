//! LLM provider implementations.
//!
//! [`create_provider`] builds the OpenAI-compatible provider named by the
//! `[agent]` config section, resolving its API key from the environment.

pub mod openai;

use kiln_core::llm::box_provider::BoxLlmProvider;
use kiln_types::config::AgentConfig;
use kiln_types::llm::LlmError;
use secrecy::SecretString;

use self::openai::OpenAiProvider;

/// Create a [`BoxLlmProvider`] from the agent config.
///
/// # Errors
///
/// [`LlmError::AuthenticationFailed`] if the API key env var is unset or empty.
pub fn create_provider(config: &AgentConfig) -> Result<BoxLlmProvider, LlmError> {
    let key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::AuthenticationFailed)?;
    let provider = OpenAiProvider::new(
        "openai",
        &config.base_url,
        SecretString::from(key),
        &config.model,
    );
    Ok(BoxLlmProvider::new(provider))
}
