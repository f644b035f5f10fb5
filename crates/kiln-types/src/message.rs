//! Conversation message types for Kiln.
//!
//! A project's conversation is an ordered list of [`Message`]s. Every USER
//! message is answered by exactly one ASSISTANT message, either a RESULT
//! carrying a [`Fragment`] or an ERROR carrying a human-readable summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::fragment::Fragment;

/// Maximum accepted prompt length, in characters.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Who authored a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('USER', 'ASSISTANT'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "USER"),
            MessageRole::Assistant => write!(f, "ASSISTANT"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(MessageRole::User),
            "ASSISTANT" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// Whether a message reports a result or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Result,
    Error,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Result => write!(f, "RESULT"),
            MessageType::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RESULT" => Ok(MessageType::Result),
            "ERROR" => Ok(MessageType::Error),
            other => Err(format!("invalid message type: '{other}'")),
        }
    }
}

/// A single utterance in a project's conversation.
///
/// Messages are ordered by `created_at` within a project. Only RESULT
/// assistant messages carry a fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub project_id: Uuid,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<Fragment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build the pending user message for an accepted prompt.
    pub fn user(project_id: Uuid, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            project_id,
            role: MessageRole::User,
            message_type: MessageType::Result,
            content: content.into(),
            fragment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }
}

/// Trim and bound-check a user prompt.
///
/// Returns the trimmed prompt on success.
pub fn validate_prompt(value: &str) -> Result<&str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field: "value" });
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(ValidationError::TooLong {
            field: "value",
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(trimmed)
}
