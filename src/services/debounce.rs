//! Debounce engine for file system change notifications
//!
//! A [`Debouncer`] turns a burst of raw change events into few callbacks:
//! one early callback when a burst starts, a forced heartbeat callback while a
//! long burst keeps going, and a final callback once the burst has been quiet
//! long enough, unless nothing changed since the last callback.
//!
//! The state machine itself is clock-agnostic and driven by explicit
//! instants; [`run_debounce_channel`] wires it to a tokio interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::models::FileChangeEvent;

/// Timing parameters for one debounce channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Changes closer together than this only extend the current burst
    pub min_quiet: Duration,
    /// Longest a running burst may go without a callback
    pub max_wait: Duration,
    /// Quiet time after the last change that ends a burst
    pub quiet_end: Duration,
    /// Timer interval while a burst is tracked
    pub tick: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_quiet: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
            quiet_end: Duration::from_secs(5),
            tick: Duration::from_millis(250),
        }
    }
}

/// Result of one timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    /// Change time to report, if the callback should fire
    pub fire: Option<DateTime<Utc>>,
    /// The burst ended and the timer should stop
    pub timer_stopped: bool,
}

/// Debounce state for a single channel
#[derive(Debug, Clone)]
pub struct Debouncer {
    config: DebounceConfig,
    last_change: Option<Instant>,
    last_change_at: Option<DateTime<Utc>>,
    last_trigger: Option<Instant>,
    timer_running: bool,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            last_change: None,
            last_change_at: None,
            last_trigger: None,
            timer_running: false,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_running
    }

    /// Record a raw change. Returns true when the timer has to be started.
    pub fn on_change(&mut self, now: Instant, at: DateTime<Utc>) -> bool {
        let quiet = self
            .last_change
            .map_or(true, |t| now.duration_since(t) > self.config.min_quiet);

        let mut start_timer = false;
        if quiet && !self.timer_running {
            self.timer_running = true;
            start_timer = true;
        }

        self.last_change = Some(now);
        self.last_change_at = Some(at);
        start_timer
    }

    /// Advance the timer
    pub fn on_tick(&mut self, now: Instant) -> Tick {
        let mut tick = Tick::default();
        if !self.timer_running {
            return tick;
        }

        let overdue = self
            .last_trigger
            .map_or(true, |t| now.duration_since(t) > self.config.max_wait);
        if overdue {
            tick.fire = self.last_change_at;
            self.last_trigger = Some(now);
        }

        let quiet = self
            .last_change
            .map_or(true, |t| now.duration_since(t) > self.config.quiet_end);
        if quiet {
            self.timer_running = false;
            tick.timer_stopped = true;

            // Fire once more only if something changed after the last callback
            let changed_since_trigger = match (self.last_trigger, self.last_change) {
                (Some(trigger), Some(change)) => trigger < change,
                (None, Some(_)) => true,
                _ => false,
            };
            if tick.fire.is_none() && changed_since_trigger {
                tick.fire = self.last_change_at;
                self.last_trigger = Some(now);
            }
        }

        tick
    }
}

/// Drive one debounce channel until the raw event sender is dropped.
///
/// `fire` is called with the time of the most recent change each time the
/// debouncer decides a callback is due.
pub async fn run_debounce_channel<F>(
    config: DebounceConfig,
    mut raw_rx: UnboundedReceiver<FileChangeEvent>,
    mut fire: F,
) where
    F: FnMut(DateTime<Utc>),
{
    let mut debouncer = Debouncer::new(config);
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            change = raw_rx.recv() => {
                let Some(event) = change else {
                    break;
                };
                tracing::trace!("Raw change {:?} {}", event.kind, event.path.display());
                if debouncer.on_change(Instant::now(), event.timestamp) {
                    let mut interval =
                        tokio::time::interval_at(Instant::now() + config.tick, config.tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker = Some(interval);
                }
            }
            _ = next_tick(&mut ticker) => {
                let tick = debouncer.on_tick(Instant::now());
                if let Some(at) = tick.fire {
                    fire(at);
                }
                if tick.timer_stopped {
                    ticker = None;
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
