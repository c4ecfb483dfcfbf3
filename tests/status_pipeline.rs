//! Integration tests for the monitor -> status service pipeline
//!
//! A real folder monitor watches a temporary repository and feeds the status
//! service, which publishes changes on its broadcast channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gitmind_lib::models::{FileStatus, StatusEvent};
use gitmind_lib::services::{
    DebounceConfig, FolderMonitor, GitStatusProvider, StatusService,
};
use tokio::sync::{broadcast, mpsc};

fn fast_config() -> DebounceConfig {
    DebounceConfig {
        min_quiet: Duration::from_millis(50),
        max_wait: Duration::from_millis(500),
        quiet_end: Duration::from_millis(200),
        tick: Duration::from_millis(20),
    }
}

/// Wait for the next status change, skipping other notifications
async fn next_status_change(
    events: &mut broadcast::Receiver<StatusEvent>,
) -> Option<Arc<gitmind_lib::models::Status>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv()).await.ok()?;
        if let Ok(StatusEvent::StatusChanged(change)) = event {
            return Some(change.new_status);
        }
    }
}

#[tokio::test]
async fn test_file_edit_reaches_subscribers() {
    let (dir, _repo) = common::setup_repo();

    let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
    let mut monitor = FolderMonitor::with_config(monitor_tx, fast_config());
    let service = StatusService::new(Arc::new(GitStatusProvider::new(dir.path())));
    let mut events = service.subscribe();

    monitor.monitor(dir.path()).unwrap();
    let listener = service.spawn_listener(monitor_rx);
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    let status = next_status_change(&mut events)
        .await
        .expect("No status change published");
    assert_eq!(status.added_count(), 1);
    assert!(status
        .files()
        .iter()
        .any(|f| f.path == "notes.txt" && f.status == FileStatus::Added));
    assert_eq!(service.last_status().added_count(), 1);

    monitor.stop();
    listener.abort();
}

#[tokio::test]
async fn test_ignored_files_do_not_trigger_polls() {
    let (dir, repo) = common::setup_repo();
    common::commit_file(&repo, dir.path(), ".gitignore", "*.log\n", "Ignore logs");

    let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
    let mut monitor = FolderMonitor::with_config(monitor_tx, fast_config());
    let service = StatusService::new(Arc::new(GitStatusProvider::new(dir.path())));

    monitor.monitor(dir.path()).unwrap();
    let listener = service.spawn_listener(monitor_rx);
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(dir.path().join("build.log"), "noise").unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(service.poll_count(), 0);

    monitor.stop();
    listener.abort();
}

#[tokio::test]
async fn test_pause_holds_back_notifications_until_released() {
    let (dir, _repo) = common::setup_repo();
    let service = StatusService::new(Arc::new(GitStatusProvider::new(dir.path())));
    let mut events = service.subscribe();

    let guard = service.pause_status_notifications();
    std::fs::write(dir.path().join("paused.txt"), "x").unwrap();
    service.on_status_trigger(chrono::Utc::now()).await.unwrap();
    assert!(service.last_status().is_clean());
    drop(guard);

    assert!(matches!(
        events.recv().await,
        Ok(StatusEvent::FocusRequested)
    ));

    let status = service.on_status_trigger(chrono::Utc::now()).await.unwrap();
    assert_eq!(status.added_count(), 1);
    assert!(matches!(
        events.recv().await,
        Ok(StatusEvent::StatusChanged(_))
    ));
}
