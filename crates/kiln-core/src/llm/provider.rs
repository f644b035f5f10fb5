//! LlmProvider trait definition.
//!
//! The single abstraction the agent adapter talks to. One call, one
//! response: providers must not retry internally, since the workflow engine
//! owns retry policy for the invoke-agent step.

use kiln_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (OpenAI-compatible endpoints, test fakes).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// Implementations live in kiln-infra (e.g., `OpenAiProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
