//! Agent invocation shapes.
//!
//! [`AgentResponse`] is the raw structured reply the model is asked to
//! produce; [`AgentOutput`] is the validated, normalized form recorded in the
//! Step Ledger and consumed by the artifact builder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fragment::{FilePayload, FileSet};

/// Structured reply requested from the code-generating model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentResponse {
    /// One-line human-readable summary of what was built.
    pub summary: String,
    /// Generated files, as `[{path, content}]` or `{path: content}`.
    pub files: FilePayload,
}

/// Normalized agent result: summary plus canonical file mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub summary: String,
    pub files: FileSet,
}

impl TryFrom<AgentResponse> for AgentOutput {
    type Error = ValidationError;

    fn try_from(response: AgentResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            summary: response.summary.trim().to_string(),
            files: response.files.into_file_set()?,
        })
    }
}
