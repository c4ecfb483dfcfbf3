//! Conflict-related model types

use serde::{Deserialize, Serialize};

/// A file left in a conflicted state by a merge
///
/// Each side holds the blob id of that version. A missing id means the file
/// did not exist on that side (an add/delete conflict).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConflict {
    /// File path relative to repository root
    pub path: String,
    /// Our (current branch) version
    pub local_id: Option<String>,
    /// Their (incoming) version
    pub remote_id: Option<String>,
    /// Base (ancestor) version
    pub base_id: Option<String>,
}

impl GitConflict {
    pub fn new(
        path: impl Into<String>,
        local_id: Option<String>,
        remote_id: Option<String>,
        base_id: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            local_id,
            remote_id,
            base_id,
        }
    }

    /// The file was deleted on our side
    pub fn is_deleted_locally(&self) -> bool {
        self.local_id.is_none()
    }

    /// The file was deleted on their side
    pub fn is_deleted_remotely(&self) -> bool {
        self.remote_id.is_none()
    }

    /// Both sides added the file independently
    pub fn is_added_on_both(&self) -> bool {
        self.base_id.is_none() && self.local_id.is_some() && self.remote_id.is_some()
    }
}

impl From<git2::IndexConflict> for GitConflict {
    fn from(conflict: git2::IndexConflict) -> Self {
        let path = [&conflict.our, &conflict.their, &conflict.ancestor]
            .into_iter()
            .flatten()
            .next()
            .map(|entry| String::from_utf8_lossy(&entry.path).to_string())
            .unwrap_or_default();

        Self {
            path,
            local_id: conflict.our.map(|e| e.id.to_string()),
            remote_id: conflict.their.map(|e| e.id.to_string()),
            base_id: conflict.ancestor.map(|e| e.id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_sides() {
        let conflict = GitConflict::new("a.txt", None, Some("abc".to_string()), Some("def".to_string()));
        assert!(conflict.is_deleted_locally());
        assert!(!conflict.is_deleted_remotely());
        assert!(!conflict.is_added_on_both());
    }

    #[test]
    fn test_added_on_both() {
        let conflict = GitConflict::new("a.txt", Some("1".to_string()), Some("2".to_string()), None);
        assert!(conflict.is_added_on_both());
    }
}
