//! File explorer helpers over a fragment's files and its forest.

use serde::{Deserialize, Serialize};

use kiln_types::fragment::FileSet;

use super::{NodeKind, TreeNode, build_tree};

/// One segment of a file path, for breadcrumb navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub name: String,
    /// Path from the root up to and including this segment.
    pub path: String,
    pub is_last: bool,
}

/// Split `path` into breadcrumb segments.
pub fn breadcrumbs(path: &str) -> Vec<Breadcrumb> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(i, name)| Breadcrumb {
            name: (*name).to_string(),
            path: segments[..=i].join("/"),
            is_last: i == last,
        })
        .collect()
}

/// Syntax-highlighting language for a file: its lower-cased extension, or
/// `"text"` when it has none.
pub fn language_for(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => "text".to_string(),
    }
}

/// Every folder path in the forest, depth-first (used to expand all).
pub fn collect_folder_paths(forest: &[TreeNode]) -> Vec<String> {
    let mut out = Vec::new();
    collect_into(forest, &mut out);
    out
}

fn collect_into(forest: &[TreeNode], out: &mut Vec<String>) {
    for node in forest {
        if node.kind == NodeKind::Folder {
            out.push(node.path.clone());
            collect_into(&node.children, out);
        }
    }
}

/// File selected by default when a fragment is opened.
pub fn first_file(files: &FileSet) -> Option<&str> {
    files.paths().next()
}

/// What a file explorer shows for one fragment: the forest, every folder
/// expanded, and the selected file with its language and breadcrumbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerView {
    pub tree: Vec<TreeNode>,
    pub expanded: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl ExplorerView {
    /// Open `files`, selecting `selected` if it names a file in the set and
    /// the first file otherwise.
    pub fn open(files: &FileSet, selected: Option<&str>) -> Self {
        let tree = build_tree(files.as_map());
        let expanded = collect_folder_paths(&tree);
        let selected = selected
            .filter(|path| files.contains(path))
            .or_else(|| first_file(files))
            .map(str::to_string);

        Self {
            tree,
            expanded,
            language: selected.as_deref().map(language_for),
            breadcrumbs: selected.as_deref().map(breadcrumbs).unwrap_or_default(),
            selected,
        }
    }
}
