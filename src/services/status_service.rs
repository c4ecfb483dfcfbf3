//! Status polling service
//!
//! Polls the git layer when the folder monitor reports a working tree change
//! and publishes a [`StatusEvent::StatusChanged`] only when the new snapshot
//! differs from the last one. At most one poll runs at a time; requests that
//! arrive while a poll is running share its result instead of starting
//! another one. Each poll retains and compares its snapshot exactly once,
//! whichever caller started it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::error::{GitMindError, Result};
use crate::models::{MonitorEvent, Status, StatusChangedEvent, StatusEvent};
use crate::services::git_service::StatusProvider;

const EVENT_BUFFER: usize = 64;

type PollOutcome = std::result::Result<Arc<Status>, String>;
type PollFuture = Shared<BoxFuture<'static, PollOutcome>>;

struct InFlightPoll {
    id: u64,
    future: PollFuture,
}

struct ServiceState {
    provider: Arc<dyn StatusProvider>,
    in_flight: Mutex<Option<InFlightPoll>>,
    poll_counter: AtomicU64,
    last_status: RwLock<Arc<Status>>,
    pause_count: AtomicUsize,
    events: broadcast::Sender<StatusEvent>,
}

impl ServiceState {
    fn is_paused(&self) -> bool {
        self.pause_count.load(Ordering::SeqCst) > 0
    }

    /// Retain `new_status` and publish it if it differs from the previous one
    fn record(&self, timestamp: DateTime<Utc>, new_status: &Arc<Status>) {
        let old_status = {
            let mut last = self
                .last_status
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *last, Arc::clone(new_status))
        };

        if old_status.is_same(new_status) {
            tracing::trace!("Status unchanged");
        } else if self.is_paused() {
            tracing::debug!("Status changed while paused, not notifying");
        } else {
            tracing::debug!(
                "Status changed: {} -> {} changed files, {} -> {} conflicts",
                old_status.changed_count(),
                new_status.changed_count(),
                old_status.conflict_count(),
                new_status.conflict_count()
            );
            let _ = self
                .events
                .send(StatusEvent::StatusChanged(StatusChangedEvent {
                    timestamp,
                    old_status,
                    new_status: Arc::clone(new_status),
                }));
        }
    }
}

/// Status service for one working folder
#[derive(Clone)]
pub struct StatusService {
    state: Arc<ServiceState>,
}

impl StatusService {
    pub fn new(provider: Arc<dyn StatusProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(ServiceState {
                provider,
                in_flight: Mutex::new(None),
                poll_counter: AtomicU64::new(0),
                last_status: RwLock::new(Arc::new(Status::empty())),
                pause_count: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Subscribe to status, repo and focus notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.state.events.subscribe()
    }

    /// Snapshot retained by the most recent completed poll
    pub fn last_status(&self) -> Arc<Status> {
        let last = self
            .state
            .last_status
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&last)
    }

    /// Number of polls started so far
    pub fn poll_count(&self) -> u64 {
        self.state.poll_counter.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Query the current status, joining a poll already in flight
    pub async fn get_status(&self) -> Result<Arc<Status>> {
        self.poll(Utc::now()).await
    }

    /// Handle a debounced working tree change.
    ///
    /// Returns the snapshot of the poll this call started or joined. While
    /// notifications are paused no poll is made.
    pub async fn on_status_trigger(&self, timestamp: DateTime<Utc>) -> Result<Arc<Status>> {
        if self.is_paused() {
            tracing::debug!("Status notifications paused, skipping poll");
            return Ok(self.last_status());
        }
        self.poll(timestamp).await
    }

    /// Handle a debounced refs/HEAD change
    pub fn on_repo_trigger(&self, timestamp: DateTime<Utc>) {
        if self.is_paused() {
            tracing::debug!("Repo notifications paused");
            return;
        }
        let _ = self.state.events.send(StatusEvent::RepoChanged(timestamp));
    }

    /// Suppress all notifications until the returned guard is dropped
    pub fn pause_status_notifications(&self) -> PauseGuard {
        self.state.pause_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Status notifications paused");
        PauseGuard {
            state: Arc::clone(&self.state),
        }
    }

    /// Route monitor events into this service until the sender closes
    pub fn spawn_listener(&self, mut monitor_rx: UnboundedReceiver<MonitorEvent>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(event) = monitor_rx.recv().await {
                match event {
                    MonitorEvent::StatusChanged(timestamp) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            if let Err(e) = service.on_status_trigger(timestamp).await {
                                tracing::debug!("Status trigger ended with error: {}", e);
                            }
                        });
                    }
                    MonitorEvent::RepoChanged(timestamp) => service.on_repo_trigger(timestamp),
                }
            }
            tracing::debug!("Monitor channel closed");
        })
    }

    /// Await the in-flight poll or start one stamped with `timestamp`
    async fn poll(&self, timestamp: DateTime<Utc>) -> Result<Arc<Status>> {
        let (id, future) = self.join_or_start_poll(timestamp);
        let outcome = future.await;
        self.finish_poll(id);
        outcome.map_err(GitMindError::StatusFailed)
    }

    fn join_or_start_poll(&self, timestamp: DateTime<Utc>) -> (u64, PollFuture) {
        let mut slot = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(in_flight) = slot.as_ref() {
            // A finished poll that nobody cleared is not reusable
            if in_flight.future.peek().is_none() {
                tracing::trace!("Joining in-flight status poll {}", in_flight.id);
                return (in_flight.id, in_flight.future.clone());
            }
        }

        let id = self.state.poll_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = Arc::clone(&self.state.provider);
        // Weak: the in-flight slot inside the state owns this future
        let state = Arc::downgrade(&self.state);
        let future = async move {
            match provider.get_status().await {
                Ok(status) => {
                    let status = Arc::new(status);
                    if let Some(state) = state.upgrade() {
                        state.record(timestamp, &status);
                    }
                    Ok(status)
                }
                Err(e) => {
                    tracing::warn!("Status poll failed: {}", e);
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlightPoll {
            id,
            future: future.clone(),
        });
        (id, future)
    }

    fn finish_poll(&self, id: u64) {
        let mut slot = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map_or(false, |p| p.id == id) {
            *slot = None;
        }
    }
}

/// Scope that keeps status notifications suppressed while alive
pub struct PauseGuard {
    state: Arc<ServiceState>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        if self.state.pause_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::debug!("Status notifications resumed");
            let _ = self.state.events.send(StatusEvent::FocusRequested);
        }
    }
}
