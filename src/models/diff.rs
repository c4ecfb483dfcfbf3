//! Diff models

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a file changed within a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffChange {
    Added,
    Deleted,
    Renamed,
    Modified,
}

impl fmt::Display for DiffChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffChange::Added => "Added",
            DiffChange::Deleted => "Deleted",
            DiffChange::Renamed => "Renamed",
            DiffChange::Modified => "Modified",
        };
        f.write_str(label)
    }
}

/// One file section found in a patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffFileEntry {
    /// 1-based position of the file in the patch
    pub index: usize,
    pub name: String,
    pub old_name: Option<String>,
    pub change: DiffChange,
}

/// Parsed two-sided text produced from a unified diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiff {
    /// "Before" body
    pub left: String,
    /// "After" body
    pub right: String,
    pub files: Vec<DiffFileEntry>,
}

/// Generated before/after files ready for an external diff viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDiff {
    pub left_path: PathBuf,
    pub right_path: PathBuf,
    pub changed_files: Vec<String>,
}
