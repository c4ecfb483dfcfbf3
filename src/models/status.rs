//! Working tree status snapshot

use serde::{Deserialize, Serialize};

use super::GitConflict;

/// Change kind of a single file in the working tree or index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Conflict,
}

impl FileStatus {
    /// Map git2 status bits to the dominant change kind
    pub fn from_git2(status: git2::Status) -> Option<Self> {
        if status.is_conflicted() {
            Some(FileStatus::Conflict)
        } else if status.intersects(git2::Status::INDEX_RENAMED | git2::Status::WT_RENAMED) {
            Some(FileStatus::Renamed)
        } else if status.intersects(git2::Status::INDEX_NEW | git2::Status::WT_NEW) {
            Some(FileStatus::Added)
        } else if status.intersects(git2::Status::INDEX_DELETED | git2::Status::WT_DELETED) {
            Some(FileStatus::Deleted)
        } else if status.intersects(
            git2::Status::INDEX_MODIFIED
                | git2::Status::WT_MODIFIED
                | git2::Status::INDEX_TYPECHANGE
                | git2::Status::WT_TYPECHANGE,
        ) {
            Some(FileStatus::Modified)
        } else {
            None
        }
    }
}

/// A changed file in a status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFile {
    pub path: String,
    pub old_path: Option<String>,
    pub status: FileStatus,
}

impl StatusFile {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            status,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: Some(old_path.into()),
            status: FileStatus::Renamed,
        }
    }
}

/// Point-in-time summary of uncommitted changes and conflict state
///
/// A snapshot is built in full from one git inquiry and never mutated;
/// a newer poll replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    files: Vec<StatusFile>,
    conflicts: Vec<GitConflict>,
    is_merging: bool,
    is_fully_merged: bool,
    merge_message: Option<String>,
}

impl Status {
    pub fn new(
        files: Vec<StatusFile>,
        conflicts: Vec<GitConflict>,
        is_merging: bool,
        merge_message: Option<String>,
    ) -> Self {
        let is_fully_merged = is_merging && conflicts.is_empty();
        Self {
            files,
            conflicts,
            is_merging,
            is_fully_merged,
            merge_message,
        }
    }

    /// Status of a clean working tree
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[StatusFile] {
        &self.files
    }

    pub fn conflicts(&self) -> &[GitConflict] {
        &self.conflicts
    }

    pub fn is_merging(&self) -> bool {
        self.is_merging
    }

    pub fn is_fully_merged(&self) -> bool {
        self.is_fully_merged
    }

    pub fn merge_message(&self) -> Option<&str> {
        self.merge_message.as_deref()
    }

    pub fn changed_count(&self) -> usize {
        self.files.len()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    pub fn added_count(&self) -> usize {
        self.count_of(FileStatus::Added)
    }

    pub fn deleted_count(&self) -> usize {
        self.count_of(FileStatus::Deleted)
    }

    pub fn renamed_count(&self) -> usize {
        self.count_of(FileStatus::Renamed)
    }

    pub fn is_clean(&self) -> bool {
        self.files.is_empty() && self.conflicts.is_empty() && !self.is_merging
    }

    /// Cheap sameness check used to suppress redundant notifications.
    ///
    /// Only counts and merge flags are compared, never individual paths, so
    /// two snapshots with different files but equal counts are the same.
    pub fn is_same(&self, other: &Status) -> bool {
        self.changed_count() == other.changed_count()
            && self.conflict_count() == other.conflict_count()
            && self.added_count() == other.added_count()
            && self.deleted_count() == other.deleted_count()
            && self.renamed_count() == other.renamed_count()
            && self.is_merging == other.is_merging
            && self.is_fully_merged == other.is_fully_merged
    }

    fn count_of(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }
}
