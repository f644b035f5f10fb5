use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from repository operations (used by trait definitions in kiln-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised when inbound data is malformed.
///
/// Never retried: surfaced to the caller immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} is too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid file path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("duplicate file path '{0}'")]
    DuplicatePath(String),
}

/// Errors surfaced by the project/message services to API callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("job queue unavailable: {0}")]
    Queue(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound("entity"),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

/// Classification of a workflow failure.
///
/// Every error that can stop a run is reduced to one of these kinds. Only
/// `TransientInfra` is retried by the engine; everything else terminates the
/// run on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed prompt or payload.
    Validation,
    /// Timeouts and network failures talking to the sandbox or model service.
    TransientInfra,
    /// Model or sandbox quota exhausted.
    QuotaExceeded,
    /// Agent response was structurally unusable.
    MalformedAgentOutput,
    /// The sandbox disappeared before its address could be resolved.
    SandboxExpired,
    /// Storage or configuration failure inside the system itself.
    Internal,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Validation,
        FailureKind::TransientInfra,
        FailureKind::QuotaExceeded,
        FailureKind::MalformedAgentOutput,
        FailureKind::SandboxExpired,
        FailureKind::Internal,
    ];

    /// The kind whose [`user_summary`](Self::user_summary) is `content`.
    pub fn from_user_summary(content: &str) -> Option<FailureKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.user_summary() == content)
    }

    /// Whether the engine may re-invoke the step after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientInfra)
    }

    /// Human-readable explanation persisted as the ERROR message content.
    pub fn user_summary(&self) -> &'static str {
        match self {
            FailureKind::Validation => {
                "Your request could not be processed because it was malformed. Please rephrase it and try again."
            }
            FailureKind::TransientInfra => {
                "Something went wrong while building your app. The build service was unreachable; please try again."
            }
            FailureKind::QuotaExceeded => {
                "You have run out of build capacity for now. Please wait a while or upgrade your plan, then try again."
            }
            FailureKind::MalformedAgentOutput => {
                "The code generator produced an invalid result. Please try again, possibly with a more specific request."
            }
            FailureKind::SandboxExpired => {
                "The preview environment expired before your app was ready. Please try again."
            }
            FailureKind::Internal => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::TransientInfra => write!(f, "transient_infra"),
            FailureKind::QuotaExceeded => write!(f, "quota_exceeded"),
            FailureKind::MalformedAgentOutput => write!(f, "malformed_agent_output"),
            FailureKind::SandboxExpired => write!(f, "sandbox_expired"),
            FailureKind::Internal => write!(f, "internal"),
        }
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "validation" => Ok(FailureKind::Validation),
            "transient_infra" => Ok(FailureKind::TransientInfra),
            "quota_exceeded" => Ok(FailureKind::QuotaExceeded),
            "malformed_agent_output" => Ok(FailureKind::MalformedAgentOutput),
            "sandbox_expired" => Ok(FailureKind::SandboxExpired),
            "internal" => Ok(FailureKind::Internal),
            other => Err(format!("invalid failure kind: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FailureKind::TransientInfra.is_retryable());
        for kind in [
            FailureKind::Validation,
            FailureKind::QuotaExceeded,
            FailureKind::MalformedAgentOutput,
            FailureKind::SandboxExpired,
            FailureKind::Internal,
        ] {
            assert!(!kind.is_retryable(), "{kind} must not be retried");
        }
    }

    #[test]
    fn test_failure_kind_display_matches_serde() {
        for kind in [
            FailureKind::Validation,
            FailureKind::TransientInfra,
            FailureKind::QuotaExceeded,
            FailureKind::MalformedAgentOutput,
            FailureKind::SandboxExpired,
            FailureKind::Internal,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            let parsed: FailureKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_user_summary_maps_back_to_kind() {
        for kind in FailureKind::ALL {
            assert_eq!(FailureKind::from_user_summary(kind.user_summary()), Some(kind));
        }
        assert_eq!(FailureKind::from_user_summary("hello"), None);
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooLong {
            field: "value",
            max: 10_000,
        };
        assert_eq!(err.to_string(), "value is too long (max 10000 characters)");
    }

    #[test]
    fn test_service_error_from_repository() {
        let err: ServiceError = RepositoryError::NotFound.into();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err: ServiceError = RepositoryError::Connection.into();
        assert_eq!(err.to_string(), "storage error: database connection error");
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }
}
