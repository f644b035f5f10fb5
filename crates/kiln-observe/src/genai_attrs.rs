//! OpenTelemetry GenAI semantic convention attribute names.
//!
//! The invocation span declares its `gen_ai.*` fields inline; these names are
//! used when recording values onto that span after the call returns.

pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// Why generation stopped, e.g. `end_turn` or `max_tokens`.
pub const GEN_AI_RESPONSE_FINISH_REASONS: &str = "gen_ai.response.finish_reasons";

/// `gen_ai.operation.name` for one code-generation call made by a workflow run.
pub const OP_INVOKE_AGENT: &str = "invoke_agent";
