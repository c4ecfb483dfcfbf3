//! File system watcher service
//!
//! Two watchers per working folder feed two independent debounce channels:
//! the working tree drives "status changed", `.git/refs` (plus `.git/HEAD`)
//! drives "repo changed".

use std::path::{Path, PathBuf};

use chrono::Utc;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{FileChangeEvent, FileChangeKind, MonitorEvent};
use crate::services::debounce::{run_debounce_channel, DebounceConfig};

/// Where a working tree path change should be routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Ignore,
    Status,
    Repo,
}

/// Classify a path reported by the working tree watcher.
///
/// `is_ignored` receives the path relative to the working folder.
pub fn classify_working_tree_path<F>(
    root: &Path,
    path: &Path,
    is_dir: bool,
    is_ignored: F,
) -> PathClass
where
    F: Fn(&Path) -> bool,
{
    let Ok(relative) = path.strip_prefix(root) else {
        return PathClass::Ignore;
    };

    if relative.starts_with(".git") {
        if relative == Path::new(".git").join("HEAD") {
            return PathClass::Repo;
        }
        return PathClass::Ignore;
    }

    if is_dir || relative.as_os_str().is_empty() || is_ignored(relative) {
        return PathClass::Ignore;
    }

    PathClass::Status
}

/// Whether a path under `.git/refs` should count as a repository change.
/// Git writes `.lock` files transiently while updating refs.
pub fn is_repo_trigger(path: &Path, is_dir: bool) -> bool {
    !is_dir && path.extension().map_or(true, |ext| ext != "lock")
}

struct ActiveMonitor {
    working_folder: PathBuf,
    // Dropping a watcher stops it
    _status_watcher: RecommendedWatcher,
    _repo_watcher: RecommendedWatcher,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ActiveMonitor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Debounced change detector for one working folder at a time
pub struct FolderMonitor {
    sender: UnboundedSender<MonitorEvent>,
    config: DebounceConfig,
    active: Option<ActiveMonitor>,
}

impl FolderMonitor {
    /// Create a monitor delivering debounced events to `sender`
    pub fn new(sender: UnboundedSender<MonitorEvent>) -> Self {
        Self::with_config(sender, DebounceConfig::default())
    }

    pub fn with_config(sender: UnboundedSender<MonitorEvent>, config: DebounceConfig) -> Self {
        Self {
            sender,
            config,
            active: None,
        }
    }

    /// Currently monitored working folder
    pub fn working_folder(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.working_folder.as_path())
    }

    pub fn is_monitoring(&self) -> bool {
        self.active.is_some()
    }

    /// (Re)arm the watchers for `working_folder`.
    ///
    /// Must be called from within a tokio runtime. A folder that is not a git
    /// working tree is logged and left unmonitored.
    pub fn monitor(&mut self, working_folder: &Path) -> Result<()> {
        self.stop();

        let refs_folder = working_folder.join(".git").join("refs");
        if !working_folder.is_dir() || !refs_folder.is_dir() {
            tracing::warn!(
                "Not monitoring {}: no git working tree found",
                working_folder.display()
            );
            return Ok(());
        }

        let (status_tx, status_rx) = unbounded_channel();
        let (repo_tx, repo_rx) = unbounded_channel();

        let status_watcher = create_status_watcher(working_folder, status_tx, repo_tx.clone())?;
        let repo_watcher = create_repo_watcher(&refs_folder, repo_tx)?;

        let status_sender = self.sender.clone();
        let status_task = tokio::spawn(run_debounce_channel(self.config, status_rx, move |at| {
            tracing::debug!("Status changed at {}", at);
            let _ = status_sender.send(MonitorEvent::StatusChanged(at));
        }));

        let repo_sender = self.sender.clone();
        let repo_task = tokio::spawn(run_debounce_channel(self.config, repo_rx, move |at| {
            tracing::debug!("Repo changed at {}", at);
            let _ = repo_sender.send(MonitorEvent::RepoChanged(at));
        }));

        tracing::info!("Monitoring {}", working_folder.display());
        self.active = Some(ActiveMonitor {
            working_folder: working_folder.to_path_buf(),
            _status_watcher: status_watcher,
            _repo_watcher: repo_watcher,
            tasks: vec![status_task, repo_task],
        });

        Ok(())
    }

    /// Stop watching
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!("Stopped monitoring {}", active.working_folder.display());
        }
    }
}

impl Drop for FolderMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn create_status_watcher(
    working_folder: &Path,
    status_tx: UnboundedSender<FileChangeEvent>,
    head_tx: UnboundedSender<FileChangeEvent>,
) -> Result<RecommendedWatcher> {
    let root = working_folder.to_path_buf();
    let canonical_root = working_folder
        .canonicalize()
        .unwrap_or_else(|_| root.clone());

    // Read-only handle used only for ignore rules
    let ignore_repo = git2::Repository::open(working_folder).ok();

    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Working tree watch error: {}", e);
                    return;
                }
            };
            let Some(kind) = FileChangeKind::from_event_kind(&event.kind) else {
                return;
            };

            for path in event.paths {
                let is_ignored = |relative: &Path| {
                    ignore_repo
                        .as_ref()
                        .map_or(false, |repo| repo.is_path_ignored(relative).unwrap_or(false))
                };
                let base = if path.starts_with(&root) {
                    &root
                } else {
                    &canonical_root
                };

                let class = classify_working_tree_path(base, &path, path.is_dir(), is_ignored);
                let change = FileChangeEvent {
                    timestamp: Utc::now(),
                    path,
                    kind,
                };
                match class {
                    PathClass::Status => {
                        let _ = status_tx.send(change);
                    }
                    PathClass::Repo => {
                        let _ = head_tx.send(change);
                    }
                    PathClass::Ignore => {}
                }
            }
        },
        Config::default(),
    )?;

    watcher.watch(working_folder, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn create_repo_watcher(
    refs_folder: &Path,
    repo_tx: UnboundedSender<FileChangeEvent>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Refs watch error: {}", e);
                    return;
                }
            };
            let Some(kind) = FileChangeKind::from_event_kind(&event.kind) else {
                return;
            };

            for path in event.paths {
                if is_repo_trigger(&path, path.is_dir()) {
                    let _ = repo_tx.send(FileChangeEvent {
                        timestamp: Utc::now(),
                        path,
                        kind,
                    });
                }
            }
        },
        Config::default(),
    )?;

    watcher.watch(refs_folder, RecursiveMode::Recursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRepo;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn never_ignored(_: &Path) -> bool {
        false
    }

    #[test]
    fn test_classify_working_tree_file() {
        let root = Path::new("/work");
        assert_eq!(
            classify_working_tree_path(root, Path::new("/work/src/main.rs"), false, never_ignored),
            PathClass::Status
        );
    }

    #[test]
    fn test_classify_git_dir_ignored_except_head() {
        let root = Path::new("/work");
        assert_eq!(
            classify_working_tree_path(root, Path::new("/work/.git/index"), false, never_ignored),
            PathClass::Ignore
        );
        assert_eq!(
            classify_working_tree_path(
                root,
                Path::new("/work/.git/objects/ab/cdef"),
                false,
                never_ignored
            ),
            PathClass::Ignore
        );
        assert_eq!(
            classify_working_tree_path(root, Path::new("/work/.git/HEAD"), false, never_ignored),
            PathClass::Repo
        );
    }

    #[test]
    fn test_classify_directories_and_ignored_paths() {
        let root = Path::new("/work");
        assert_eq!(
            classify_working_tree_path(root, Path::new("/work/src"), true, never_ignored),
            PathClass::Ignore
        );
        assert_eq!(
            classify_working_tree_path(root, Path::new("/work/target/out.o"), false, |p| {
                p.starts_with("target")
            }),
            PathClass::Ignore
        );
        assert_eq!(
            classify_working_tree_path(root, Path::new("/elsewhere/file"), false, never_ignored),
            PathClass::Ignore
        );
    }

    #[test]
    fn test_repo_trigger_skips_lock_files() {
        assert!(is_repo_trigger(Path::new("/w/.git/refs/heads/main"), false));
        assert!(!is_repo_trigger(Path::new("/w/.git/refs/heads/main.lock"), false));
        assert!(!is_repo_trigger(Path::new("/w/.git/refs/heads"), true));
    }

    fn fast_config() -> DebounceConfig {
        DebounceConfig {
            min_quiet: Duration::from_millis(50),
            max_wait: Duration::from_millis(500),
            quiet_end: Duration::from_millis(200),
            tick: Duration::from_millis(20),
        }
    }

    async fn next_event(rx: &mut UnboundedReceiver<MonitorEvent>) -> Option<MonitorEvent> {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_monitor_non_repo_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, _rx) = unbounded_channel();
        let mut monitor = FolderMonitor::new(tx);

        monitor.monitor(dir.path()).unwrap();
        assert!(!monitor.is_monitoring());

        monitor.monitor(&dir.path().join("missing")).unwrap();
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test]
    async fn test_monitor_reports_working_tree_change() {
        let repo = TestRepo::with_initial_commit();
        let (tx, mut rx) = unbounded_channel();
        let mut monitor = FolderMonitor::with_config(tx, fast_config());
        monitor.monitor(&repo.path).unwrap();
        assert!(monitor.is_monitoring());

        tokio::time::sleep(Duration::from_millis(100)).await;
        repo.create_file("changed.txt", "content");

        let event = next_event(&mut rx).await;
        assert!(matches!(event, Some(MonitorEvent::StatusChanged(_))));
    }

    #[tokio::test]
    async fn test_monitor_reports_ref_change() {
        let repo = TestRepo::with_initial_commit();
        let (tx, mut rx) = unbounded_channel();
        let mut monitor = FolderMonitor::with_config(tx, fast_config());
        monitor.monitor(&repo.path).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        repo.create_branch("feature");

        let mut saw_repo_change = false;
        while let Some(event) = next_event(&mut rx).await {
            if matches!(event, MonitorEvent::RepoChanged(_)) {
                saw_repo_change = true;
                break;
            }
        }
        assert!(saw_repo_change);
    }

    #[tokio::test]
    async fn test_stop_clears_state() {
        let repo = TestRepo::with_initial_commit();
        let (tx, _rx) = unbounded_channel();
        let mut monitor = FolderMonitor::with_config(tx, fast_config());
        monitor.monitor(&repo.path).unwrap();
        assert_eq!(monitor.working_folder(), Some(repo.path.as_path()));

        monitor.stop();
        assert!(!monitor.is_monitoring());
    }
}
