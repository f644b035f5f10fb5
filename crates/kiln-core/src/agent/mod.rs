//! Agent Invocation Adapter: one call to the code-generating model,
//! normalized into a summary plus a validated file set.

pub mod adapter;
pub mod output;
pub mod prompt;

pub use adapter::{AgentAdapter, AgentError};
