//! Git layer: the git binary runner and the git2-backed status provider

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GitMindError, Result};
use crate::models::{FileStatus, GitConflict, Status, StatusFile};
use crate::services::cancellation::CancellationToken;
use crate::utils::{create_command, run_command, ProcessOutput};

/// Default time limit for a single git invocation
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Check if a path is a valid git repository
pub fn is_valid_repo(path: &Path) -> bool {
    git2::Repository::open(path).is_ok()
}

/// Find the repository root from a given path
pub fn find_repo_root(path: &Path) -> Option<PathBuf> {
    git2::Repository::discover(path)
        .ok()
        .map(|repo| repo.workdir().unwrap_or(repo.path()).to_path_buf())
}

/// Runs the git binary inside one working folder
#[derive(Debug, Clone)]
pub struct GitRunner {
    working_folder: PathBuf,
    git_binary: String,
    timeout: Option<Duration>,
}

impl GitRunner {
    pub fn new(working_folder: &Path) -> Self {
        Self {
            working_folder: working_folder.to_path_buf(),
            git_binary: "git".to_string(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Use a specific git executable instead of the one on PATH
    pub fn with_git_binary(mut self, git_binary: impl Into<String>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    /// Run git with `args`, returning the output whatever the exit code
    pub async fn run(&self, args: &[&str], token: &CancellationToken) -> Result<ProcessOutput> {
        let mut cmd = create_command(&self.git_binary);
        cmd.current_dir(&self.working_folder);
        cmd.args(args);

        tracing::debug!("git {}", args.join(" "));
        run_command(cmd, token, self.timeout).await
    }

    /// Run git with `args`, treating a non-zero exit code as a failure
    pub async fn run_checked(
        &self,
        args: &[&str],
        token: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let output = self.run(args, token).await?;
        if output.is_success() {
            return Ok(output);
        }

        let command = format!("git {}", args.join(" "));
        tracing::warn!(
            "{} failed ({}): {}",
            command,
            output.exit_code,
            output.stderr.trim()
        );
        Err(GitMindError::ProcessFailed {
            command,
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Source of working tree status snapshots
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn get_status(&self) -> Result<Status>;
}

/// Reads status through libgit2 on a blocking thread
#[derive(Debug, Clone)]
pub struct GitStatusProvider {
    working_folder: PathBuf,
}

impl GitStatusProvider {
    pub fn new(working_folder: &Path) -> Self {
        Self {
            working_folder: working_folder.to_path_buf(),
        }
    }
}

#[async_trait]
impl StatusProvider for GitStatusProvider {
    async fn get_status(&self) -> Result<Status> {
        let path = self.working_folder.clone();
        tokio::task::spawn_blocking(move || read_status(&path))
            .await
            .map_err(|e| GitMindError::OperationFailed(format!("Status task failed: {}", e)))?
    }
}

/// Build a full status snapshot from a single repository inquiry
pub fn read_status(working_folder: &Path) -> Result<Status> {
    let repo = git2::Repository::open(working_folder)
        .map_err(|_| GitMindError::RepositoryNotFound(working_folder.display().to_string()))?;

    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .include_unmodified(false)
        .renames_head_to_index(true)
        .renames_index_to_workdir(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut files = Vec::new();

    for entry in statuses.iter() {
        let Some(status) = FileStatus::from_git2(entry.status()) else {
            continue;
        };

        let rename = entry.head_to_index().or_else(|| entry.index_to_workdir());
        let (path, old_path) = match (status, rename) {
            (FileStatus::Renamed, Some(delta)) => (
                delta
                    .new_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()),
                delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().to_string()),
            ),
            _ => (entry.path().map(str::to_string), None),
        };

        files.push(StatusFile {
            path: path.unwrap_or_default(),
            old_path,
            status,
        });
    }

    let mut conflicts = Vec::new();
    let index = repo.index()?;
    if index.has_conflicts() {
        for conflict in index.conflicts()? {
            conflicts.push(GitConflict::from(conflict?));
        }
    }

    let is_merging = repo.state() == git2::RepositoryState::Merge;
    let merge_message = if is_merging {
        std::fs::read_to_string(repo.path().join("MERGE_MSG"))
            .ok()
            .map(|m| m.trim_end().to_string())
    } else {
        None
    };

    Ok(Status::new(files, conflicts, is_merging, merge_message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRepo;

    #[test]
    fn test_is_valid_repo() {
        let repo = TestRepo::new();
        assert!(is_valid_repo(&repo.path));

        let dir = tempfile::TempDir::new().unwrap();
        assert!(!is_valid_repo(dir.path()));
    }

    #[test]
    fn test_find_repo_root_from_subdir() {
        let repo = TestRepo::with_initial_commit();
        repo.create_file("nested/deep/file.txt", "x");
        let root = find_repo_root(&repo.path.join("nested/deep")).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            repo.path.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_clean_repo_status() {
        let repo = TestRepo::with_initial_commit();
        let status = GitStatusProvider::new(&repo.path).get_status().await.unwrap();
        assert!(status.is_clean());
    }

    #[tokio::test]
    async fn test_status_reports_changes() {
        let repo = TestRepo::with_initial_commit();
        repo.create_file("README.md", "# Changed");
        repo.create_file("new.txt", "new");

        let status = GitStatusProvider::new(&repo.path).get_status().await.unwrap();
        assert_eq!(status.changed_count(), 2);
        assert_eq!(status.added_count(), 1);
        assert!(status
            .files()
            .iter()
            .any(|f| f.path == "README.md" && f.status == FileStatus::Modified));
        assert!(!status.is_merging());
    }

    #[tokio::test]
    async fn test_status_reports_deleted() {
        let repo = TestRepo::with_initial_commit();
        std::fs::remove_file(repo.path.join("README.md")).unwrap();

        let status = GitStatusProvider::new(&repo.path).get_status().await.unwrap();
        assert_eq!(status.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_merge_conflicts() {
        let repo = TestRepo::with_initial_commit();
        let base = repo.current_branch();
        repo.create_branch("feature");
        repo.checkout_branch("feature");
        repo.create_commit("Feature edit", &[("README.md", "# Feature")]);
        repo.checkout_branch(&base);
        repo.create_commit("Main edit", &[("README.md", "# Main")]);
        repo.start_merge("feature");

        let status = GitStatusProvider::new(&repo.path).get_status().await.unwrap();
        assert!(status.is_merging());
        assert!(!status.is_fully_merged());
        assert_eq!(status.conflicts().len(), 1);
        assert_eq!(status.conflicts()[0].path, "README.md");
        assert!(status
            .merge_message()
            .is_some_and(|m| m.contains("feature")));
    }

    #[tokio::test]
    async fn test_status_of_missing_repo_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = GitStatusProvider::new(dir.path()).get_status().await;
        assert!(matches!(result, Err(GitMindError::RepositoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_runner_reports_failure() {
        let repo = TestRepo::with_initial_commit();
        let runner = GitRunner::new(&repo.path);
        let token = CancellationToken::new();

        let ok = runner.run_checked(&["rev-parse", "HEAD"], &token).await.unwrap();
        assert_eq!(ok.stdout.trim(), repo.head_oid().to_string());

        let err = runner
            .run_checked(&["rev-parse", "no-such-ref"], &token)
            .await
            .unwrap_err();
        assert!(matches!(err, GitMindError::ProcessFailed { .. }));
    }
}
