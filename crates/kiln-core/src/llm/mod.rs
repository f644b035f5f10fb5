//! LLM provider port for the code-generating model.

pub mod box_provider;
pub mod provider;
