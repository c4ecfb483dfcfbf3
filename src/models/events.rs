//! Events flowing from the folder monitor through the status service

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::EventKind;

use super::Status;

/// Raw file system change reported by a watcher
#[derive(Debug, Clone, PartialEq)]
pub struct FileChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

/// Simplified event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl FileChangeKind {
    /// Map a notify event kind, skipping access and other noise
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(FileChangeKind::Renamed),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(FileChangeKind::Modified),
            EventKind::Remove(_) => Some(FileChangeKind::Deleted),
            EventKind::Any => Some(FileChangeKind::Modified),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}

/// Debounced notification produced by the folder monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Something in the working tree changed; carries the last change time
    StatusChanged(DateTime<Utc>),
    /// Refs or HEAD changed
    RepoChanged(DateTime<Utc>),
}

/// Status change with the snapshots on either side of it
#[derive(Debug, Clone)]
pub struct StatusChangedEvent {
    pub timestamp: DateTime<Utc>,
    pub old_status: Arc<Status>,
    pub new_status: Arc<Status>,
}

/// Notifications published by the status service
#[derive(Debug, Clone)]
pub enum StatusEvent {
    StatusChanged(StatusChangedEvent),
    RepoChanged(DateTime<Utc>),
    /// A pause scope ended and the UI should take focus back
    FocusRequested,
}
