//! Cached repository model

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Schema version of the cached model. Bump whenever the on-disk layout or
/// the meaning of any persisted field changes.
pub const CURRENT_VERSION: u32 = 3;

/// A commit node in the repository graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MCommit {
    pub id: String,
    pub parent_ids: Vec<String>,
    pub subject: String,
    pub author: String,
    pub author_date: i64,
    /// Name of the branch the commit was first reached from
    pub branch_name: Option<String>,
}

impl MCommit {
    pub fn short_id(&self) -> &str {
        &self.id[..7.min(self.id.len())]
    }

    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// A local or remote branch tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MBranch {
    pub name: String,
    pub tip_id: String,
    pub is_remote: bool,
    pub is_current: bool,
}

/// A merge edge from a merged-in parent to the merge commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MMerge {
    pub commit_id: String,
    pub merged_parent_id: String,
}

/// In-memory repository model persisted by the cache service
#[derive(Debug, Clone)]
pub struct MRepository {
    pub version: u32,
    pub time_stamp: DateTime<Utc>,
    pub current_branch: Option<String>,
    pub commits: Vec<MCommit>,
    pub branches: Vec<MBranch>,
    pub merges: Vec<MMerge>,
    // Not persisted, restored by complete_deserialization
    working_folder: PathBuf,
    commit_lookup: HashMap<String, usize>,
}

impl MRepository {
    pub fn new(working_folder: &Path) -> Self {
        Self {
            version: CURRENT_VERSION,
            time_stamp: Utc::now(),
            current_branch: None,
            commits: Vec::new(),
            branches: Vec::new(),
            merges: Vec::new(),
            working_folder: working_folder.to_path_buf(),
            commit_lookup: HashMap::new(),
        }
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    /// Append a commit and index it by id
    pub fn add_commit(&mut self, commit: MCommit) {
        self.commit_lookup.insert(commit.id.clone(), self.commits.len());
        self.commits.push(commit);
    }

    pub fn commit(&self, id: &str) -> Option<&MCommit> {
        self.commit_lookup.get(id).map(|&i| &self.commits[i])
    }

    /// Position of a commit in `commits`
    pub fn commit_index(&self, id: &str) -> Option<usize> {
        self.commit_lookup.get(id).copied()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Re-link transient state after the model was read back from disk
    pub fn complete_deserialization(&mut self, working_folder: &Path) {
        self.working_folder = working_folder.to_path_buf();
        self.commit_lookup = self
            .commits
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
    }
}

/// Interning table mapping commit ids to compact integers for storage
#[derive(Debug, Default)]
pub struct CommitIdTable {
    ids: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl CommitIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a stored id list
    pub fn from_ids(ids: Vec<String>) -> Self {
        let lookup = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();
        Self { ids, lookup }
    }

    /// Return the compact id for `id`, adding it if unseen
    pub fn intern(&mut self, id: &str) -> u32 {
        if let Some(&index) = self.lookup.get(id) {
            return index;
        }
        let index = self.ids.len() as u32;
        self.ids.push(id.to_string());
        self.lookup.insert(id.to_string(), index);
        index
    }

    pub fn resolve(&self, index: u32) -> Option<&str> {
        self.ids.get(index as usize).map(String::as_str)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, parents: &[&str]) -> MCommit {
        MCommit {
            id: id.to_string(),
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            subject: format!("commit {}", id),
            author: "Test User".to_string(),
            author_date: 1_700_000_000,
            branch_name: None,
        }
    }

    #[test]
    fn test_lookup_after_add() {
        let mut repo = MRepository::new(Path::new("/work"));
        repo.add_commit(commit("aaaaaaaaaa", &[]));
        repo.add_commit(commit("bbbbbbbbbb", &["aaaaaaaaaa"]));
        assert_eq!(repo.commit_count(), 2);
        assert_eq!(repo.commit("bbbbbbbbbb").unwrap().short_id(), "bbbbbbb");
        assert!(repo.commit("cccc").is_none());
    }

    #[test]
    fn test_commit_index_matches_position() {
        let mut repo = MRepository::new(Path::new("/work"));
        for (i, id) in ["c3", "c2", "c1"].iter().enumerate() {
            repo.add_commit(commit(id, &[]));
            assert_eq!(repo.commit_index(id), Some(i));
        }
        assert_eq!(repo.commits[repo.commit_index("c2").unwrap()].id, "c2");
        assert_eq!(repo.commit_index("missing"), None);
    }

    #[test]
    fn test_complete_deserialization_rebuilds_lookup() {
        let mut repo = MRepository::new(Path::new("/old"));
        repo.commits.push(commit("abc", &[]));
        assert!(repo.commit("abc").is_none());

        repo.complete_deserialization(Path::new("/new"));
        assert!(repo.commit("abc").is_some());
        assert_eq!(repo.working_folder(), Path::new("/new"));
    }

    #[test]
    fn test_id_table_interns_once() {
        let mut table = CommitIdTable::new();
        let a = table.intern("abc");
        let b = table.intern("def");
        assert_eq!(table.intern("abc"), a);
        assert_ne!(a, b);
        assert_eq!(table.resolve(b), Some("def"));
        assert_eq!(table.resolve(99), None);
        assert_eq!(table.len(), 2);
    }
}
