//! Project domain type.
//!
//! A project is a named workspace owned by exactly one user. Its conversation
//! is the ordered list of messages attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named workspace owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// UUIDv7 project ID.
    pub id: Uuid,
    pub name: String,
    /// Identity of the owning user, as issued by the external auth provider.
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Build a fresh project owned by `owner_id`.
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this project.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}
