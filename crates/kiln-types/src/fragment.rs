//! Fragment and file-set types.
//!
//! A [`Fragment`] is the generated artifact attached to a successful
//! assistant message: a summary, the sandbox preview URL, and the generated
//! files keyed by relative path.
//!
//! Agent output arrives either as an array of `{path, content}` pairs or as a
//! path-to-content object. [`FilePayload`] captures both shapes and is
//! resolved exactly once into the canonical [`FileSet`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// The generated artifact attached to one RESULT assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// UUIDv7 fragment ID.
    pub id: Uuid,
    /// Owning assistant message (1:1).
    pub message_id: Uuid,
    /// Human-readable title/summary.
    pub title: String,
    /// Fully qualified URL of the sandbox's exposed service port.
    pub sandbox_url: String,
    pub files: FileSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical path-to-content mapping.
///
/// Keys are normalized relative paths: forward-slash separated, no leading
/// slash, no empty, `.` or `..` segments. Iteration order is lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet(BTreeMap<String, String>);

impl FileSet {
    /// Validate and normalize an array-of-pairs payload.
    ///
    /// Two entries that normalize to the same path are rejected.
    pub fn from_pairs(entries: Vec<FileEntry>) -> Result<Self, ValidationError> {
        let mut files = BTreeMap::new();
        for entry in entries {
            let path = normalize_path(&entry.path)?;
            if files.insert(path.clone(), entry.content).is_some() {
                return Err(ValidationError::DuplicatePath(path));
            }
        }
        Ok(Self(files))
    }

    /// Validate and normalize a path-to-content object payload.
    pub fn from_map(map: BTreeMap<String, String>) -> Result<Self, ValidationError> {
        Self::from_pairs(
            map.into_iter()
                .map(|(path, content)| FileEntry { path, content })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// One generated file in array form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileEntry {
    /// Relative path, e.g. `app/page.tsx`.
    pub path: String,
    /// Full file content.
    pub content: String,
}

/// The file payload as the agent (or a client) sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FilePayload {
    /// `[{"path": "...", "content": "..."}, ...]`
    Pairs(Vec<FileEntry>),
    /// `{"path": "content", ...}`
    Map(BTreeMap<String, String>),
}

impl FilePayload {
    /// Resolve either shape into the canonical mapping.
    pub fn into_file_set(self) -> Result<FileSet, ValidationError> {
        match self {
            FilePayload::Pairs(entries) => FileSet::from_pairs(entries),
            FilePayload::Map(map) => FileSet::from_map(map),
        }
    }
}

/// Normalize a relative file path.
///
/// Empty and `.` segments are dropped; absolute paths, backslashes and `..`
/// segments are rejected.
pub fn normalize_path(raw: &str) -> Result<String, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }
    if trimmed.contains('\\') {
        return Err(invalid("backslash separators are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("path escapes the project root")),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(segments.join("/"))
}
