//! Scratch git repositories for tests

#![cfg(test)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A git repository in a temporary directory, removed on drop
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Empty repository with a committer identity configured
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().to_path_buf();

        let repo = git2::Repository::init(&path).expect("Failed to init repo");
        let mut config = repo.config().expect("Failed to get config");
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();

        Self { dir, path }
    }

    /// Repository whose HEAD has one commit containing README.md
    pub fn with_initial_commit() -> Self {
        let test_repo = Self::new();
        test_repo.create_commit("Initial commit", &[("README.md", "# Test Repo")]);
        test_repo
    }

    pub fn repo(&self) -> git2::Repository {
        git2::Repository::open(&self.path).expect("Failed to open repo")
    }

    /// Write a working tree file, creating parent folders
    pub fn create_file(&self, name: &str, content: &str) {
        let file_path = self.path.join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
    }

    /// Write and stage `files`, then commit them on HEAD
    pub fn create_commit(&self, message: &str, files: &[(&str, &str)]) -> git2::Oid {
        let repo = self.repo();
        let mut index = repo.index().expect("Failed to get index");
        for (name, content) in files {
            self.create_file(name, content);
            index.add_path(Path::new(name)).expect("Failed to stage file");
        }
        index.write().unwrap();

        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        commit_tree(&repo, message, &tree, &parents)
    }

    /// Local branch at HEAD
    pub fn create_branch(&self, name: &str) {
        let repo = self.repo();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch(name, &head, false).expect("Failed to create branch");
    }

    /// Switch HEAD and the working tree to a local branch
    pub fn checkout_branch(&self, name: &str) {
        let repo = self.repo();
        let commit = branch_commit(&repo, name);
        repo.checkout_tree(commit.as_object(), None)
            .expect("Failed to checkout");
        repo.set_head(&format!("refs/heads/{}", name)).unwrap();
    }

    pub fn current_branch(&self) -> String {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.shorthand().unwrap_or("").to_string()
    }

    pub fn head_oid(&self) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.target().expect("HEAD is symbolic")
    }

    /// Commit a merge of `branch` into HEAD; the branches must not conflict
    pub fn create_merge_commit(&self, message: &str, branch: &str) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        let other = branch_commit(&repo, branch);

        let mut index = repo.merge_commits(&head, &other, None).unwrap();
        assert!(!index.has_conflicts(), "Merge has conflicts");
        let tree = repo.find_tree(index.write_tree_to(&repo).unwrap()).unwrap();

        let oid = commit_tree(&repo, message, &tree, &[&head, &other]);
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .expect("Failed to checkout");
        oid
    }

    /// Start a merge of `branch` into HEAD and leave it unfinished
    pub fn start_merge(&self, branch: &str) {
        let repo = self.repo();
        let reference = repo
            .find_branch(branch, git2::BranchType::Local)
            .unwrap()
            .into_reference();
        let annotated = repo.reference_to_annotated_commit(&reference).unwrap();
        repo.merge(&[&annotated], None, None).expect("Failed to merge");
    }
}

fn commit_tree(
    repo: &git2::Repository,
    message: &str,
    tree: &git2::Tree,
    parents: &[&git2::Commit],
) -> git2::Oid {
    let sig = repo.signature().expect("Failed to get signature");
    repo.commit(Some("HEAD"), &sig, &sig, message, tree, parents)
        .expect("Failed to create commit")
}

fn branch_commit<'r>(repo: &'r git2::Repository, name: &str) -> git2::Commit<'r> {
    repo.find_branch(name, git2::BranchType::Local)
        .expect("Failed to find branch")
        .get()
        .peel_to_commit()
        .expect("Branch has no commit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_branch() {
        let repo = TestRepo::with_initial_commit();
        repo.create_branch("feature");
        repo.checkout_branch("feature");
        assert_eq!(repo.current_branch(), "feature");
    }

    #[test]
    fn test_create_merge_commit() {
        let repo = TestRepo::with_initial_commit();
        let base = repo.current_branch();
        repo.create_branch("feature");
        repo.checkout_branch("feature");
        repo.create_commit("Feature", &[("feature.txt", "feature")]);
        repo.checkout_branch(&base);
        repo.create_commit("Main", &[("main.txt", "main")]);

        let oid = repo.create_merge_commit("Merge", "feature");
        let git = repo.repo();
        let commit = git.find_commit(oid).unwrap();
        assert_eq!(commit.parent_count(), 2);
        assert!(repo.path.join("feature.txt").exists());
    }
}
