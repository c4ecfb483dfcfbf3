//! Shared setup for integration tests

#![allow(dead_code)]

use git2::Repository;
use std::path::Path;
use tempfile::TempDir;

/// Create a repository with one commit containing README.md
pub fn setup_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repo = Repository::init(dir.path()).expect("Failed to init repo");

    let mut config = repo.config().expect("Failed to get config");
    config
        .set_str("user.name", "Test User")
        .expect("Failed to set user.name");
    config
        .set_str("user.email", "test@example.com")
        .expect("Failed to set user.email");

    commit_file(&repo, dir.path(), "README.md", "# Test Repo\n", "Initial commit");
    (dir, repo)
}

/// Write, stage and commit a single file on HEAD
pub fn commit_file(
    repo: &Repository,
    path: &Path,
    name: &str,
    content: &str,
    message: &str,
) -> git2::Oid {
    std::fs::write(path.join(name), content).expect("Failed to write file");

    let mut index = repo.index().expect("Failed to get index");
    index.add_path(Path::new(name)).expect("Failed to stage file");
    index.write().expect("Failed to write index");

    let tree_oid = index.write_tree().expect("Failed to write tree");
    let tree = repo.find_tree(tree_oid).expect("Failed to find tree");
    let sig = repo.signature().expect("Failed to get signature");

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.as_ref().into_iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .expect("Failed to create commit")
}
