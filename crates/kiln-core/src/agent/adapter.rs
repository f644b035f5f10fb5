//! Agent Invocation Adapter.
//!
//! Exactly one provider call per `generate`. Failures are classified and
//! handed back to the workflow engine, which alone decides whether to
//! re-invoke; retrying here would double-bill and could mix partial output
//! from different attempts.

use kiln_observe::genai_attrs;
use kiln_types::agent::AgentOutput;
use kiln_types::config::AgentConfig;
use kiln_types::error::FailureKind;
use kiln_types::llm::{ChatMessage, CompletionRequest, LlmError, StopReason};
use kiln_types::workflow::StepError;
use tracing::{Instrument, info_span};

use super::output::parse_agent_reply;
use super::prompt::{system_policy, user_prompt};
use crate::llm::provider::LlmProvider;

/// Errors from a single agent invocation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("malformed agent output: {0}")]
    Malformed(String),

    #[error("agent output truncated at max_tokens")]
    Truncated,
}

impl AgentError {
    /// Workflow classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AgentError::Llm(err) => match err {
                LlmError::Provider { .. }
                | LlmError::RateLimited { .. }
                | LlmError::Overloaded(_)
                | LlmError::Timeout => FailureKind::TransientInfra,
                LlmError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
                LlmError::Deserialization(_) => FailureKind::MalformedAgentOutput,
                LlmError::ContextLengthExceeded { .. } => FailureKind::Validation,
                LlmError::AuthenticationFailed | LlmError::InvalidRequest(_) => {
                    FailureKind::Internal
                }
            },
            AgentError::Malformed(_) | AgentError::Truncated => FailureKind::MalformedAgentOutput,
        }
    }
}

impl From<AgentError> for StepError {
    fn from(err: AgentError) -> Self {
        StepError::new(err.failure_kind(), err.to_string())
    }
}

/// Wraps one LLM provider with the model settings and system policy.
pub struct AgentAdapter<P: LlmProvider> {
    provider: P,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
    system_policy: String,
}

impl<P: LlmProvider> AgentAdapter<P> {
    pub fn new(provider: P, config: &AgentConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            system_policy: system_policy(config.system_policy.as_deref()),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The configured system policy (persona plus output contract).
    pub fn system_policy(&self) -> &str {
        &self.system_policy
    }

    /// Send `prompt_text` under `system_policy` and normalize the reply.
    pub async fn generate(
        &self,
        prompt_text: &str,
        system_policy: &str,
    ) -> Result<AgentOutput, AgentError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(user_prompt(prompt_text))],
            system: Some(system_policy.to_string()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.operation.name = genai_attrs::OP_INVOKE_AGENT,
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
        );

        let response = self
            .provider
            .complete(&request)
            .instrument(span.clone())
            .await?;

        span.record(genai_attrs::GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
        span.record(genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
        span.record(
            genai_attrs::GEN_AI_RESPONSE_FINISH_REASONS,
            response.stop_reason.to_string().as_str(),
        );

        if response.stop_reason == StopReason::MaxTokens {
            return Err(AgentError::Truncated);
        }

        let output = parse_agent_reply(&response.content).map_err(AgentError::Malformed)?;
        tracing::info!(
            model = %response.model,
            files = output.files.len(),
            "agent output accepted"
        );
        Ok(output)
    }
}
