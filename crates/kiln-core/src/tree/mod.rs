//! Path Tree Builder: flat path -> content mapping to a sorted forest.
//!
//! Pure and deterministic. Within every sibling group folders come before
//! files, and names of the same kind sort case-sensitively. Building the same
//! mapping twice yields structurally equal forests.

pub mod explorer;

use std::collections::BTreeMap;

use kiln_types::fragment::normalize_path;
use serde::{Deserialize, Serialize};

/// Whether a node is a file leaf or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    // Declaration order is sibling order: folders first.
    Folder,
    File,
}

/// One node of the file forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Last path segment.
    pub name: String,
    /// Full slash-joined path from the root.
    pub path: String,
    pub kind: NodeKind,
    /// Ordered children; always empty for files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Intermediate trie: one entry per unique path prefix.
#[derive(Default)]
struct Draft {
    is_file: bool,
    children: BTreeMap<String, Draft>,
}

/// Forest built from well-formed paths, plus the paths left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedTree {
    pub forest: Vec<TreeNode>,
    /// Input paths that are not already in normalized form, in input order.
    pub rejected: Vec<String>,
}

/// Build the sorted forest for a path -> content mapping.
///
/// Only keys already in [`normalize_path`] form become nodes, so every file
/// node's `path` is a key of `files`. Other keys (`/a.txt`, `a//b`, `../x`)
/// are skipped with a warning. A name that is both a file and a folder
/// prefix (`a` and `a/b`) yields a folder node and a file node side by side.
pub fn build_tree<V>(files: &BTreeMap<String, V>) -> Vec<TreeNode> {
    build_tree_from_paths(files.keys().map(String::as_str))
}

/// Build the sorted forest from bare paths, skipping malformed ones.
pub fn build_tree_from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<TreeNode> {
    let checked = build_tree_checked(paths);
    if !checked.rejected.is_empty() {
        tracing::warn!(rejected = ?checked.rejected, "skipped malformed file paths");
    }
    checked.forest
}

/// Build the sorted forest and report which paths were rejected.
pub fn build_tree_checked<'a>(paths: impl IntoIterator<Item = &'a str>) -> CheckedTree {
    let mut root = Draft::default();
    let mut rejected = Vec::new();
    for path in paths {
        if !is_well_formed(path) {
            rejected.push(path.to_string());
            continue;
        }
        let mut node = &mut root;
        let mut segments = path.split('/').peekable();
        while let Some(segment) = segments.next() {
            node = node.children.entry(segment.to_string()).or_default();
            if segments.peek().is_none() {
                node.is_file = true;
            }
        }
    }
    CheckedTree {
        forest: materialize(&root, ""),
        rejected,
    }
}

fn is_well_formed(path: &str) -> bool {
    normalize_path(path).is_ok_and(|normalized| normalized == path)
}

fn materialize(draft: &Draft, prefix: &str) -> Vec<TreeNode> {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    // BTreeMap iteration is byte order, which is case-sensitive lexicographic.
    for (name, child) in &draft.children {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        if !child.children.is_empty() {
            folders.push(TreeNode {
                name: name.clone(),
                path: path.clone(),
                kind: NodeKind::Folder,
                children: materialize(child, &path),
            });
        }
        if child.is_file {
            files.push(TreeNode {
                name: name.clone(),
                path,
                kind: NodeKind::File,
                children: Vec::new(),
            });
        }
    }

    folders.extend(files);
    folders
}
