//! Countdown timers and delayed dispatch.
//!
//! [`TimerManager`] owns every active countdown. Each timer runs as its own
//! task that ticks once per second and announces completion on a broadcast
//! channel. [`DelayedDispatcher`] runs a tool call once a delay has elapsed.

mod dispatch;

pub use dispatch::{DelayedDispatcher, ScheduledHandle};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::providers::CancelHandle;

const TICK: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

/// Lifecycle state of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    /// Still counting down.
    Running,
    /// Reached zero.
    Finished,
}

/// A snapshot of one timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStatus {
    /// Timer id.
    pub timer_id: String,
    /// Remaining time as `MM:SS`.
    pub remaining: String,
    /// Remaining time in seconds.
    pub remaining_seconds: u64,
    /// Initial duration in seconds.
    pub total_seconds: u64,
    /// Lifecycle state.
    pub state: TimerState,
}

/// Broadcast when a timer changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The timer reached zero without being cancelled or replaced.
    Finished {
        /// Timer id.
        timer_id: String,
        /// Initial duration in seconds.
        total_seconds: u64,
    },
}

#[derive(Debug)]
struct Countdown {
    remaining: u64,
    total: u64,
    state: TimerState,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    cancel: CancelHandle,
    countdown: Arc<Mutex<Countdown>>,
}

struct Inner {
    timers: Mutex<BTreeMap<String, Slot>>,
    events: broadcast::Sender<TimerEvent>,
    generation: AtomicU64,
}

/// Owner of the active countdown timers.
///
/// Cloning is cheap; clones share the same timers.
#[derive(Clone)]
pub struct TimerManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("active", &lock(&self.inner.timers).len())
            .finish_non_exhaustive()
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

impl TimerManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                timers: Mutex::new(BTreeMap::new()),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Receive future [`TimerEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.inner.events.subscribe()
    }

    /// Start a countdown of `total_seconds` under `timer_id`.
    ///
    /// A timer already registered under the same id is cancelled first and
    /// will never report completion. Must be called within a Tokio runtime.
    pub fn start(&self, timer_id: &str, total_seconds: u64) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancelHandle::new();
        let countdown = Arc::new(Mutex::new(Countdown {
            remaining: total_seconds,
            total: total_seconds,
            state: TimerState::Running,
        }));

        let previous = lock(&self.inner.timers).insert(
            timer_id.to_owned(),
            Slot {
                generation,
                cancel: cancel.clone(),
                countdown: Arc::clone(&countdown),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(timer_id, "Replaced running timer");
        }

        let inner = Arc::clone(&self.inner);
        let timer_id = timer_id.to_owned();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK).await;
                if cancel.is_cancelled() {
                    return;
                }
                let mut state = lock(&countdown);
                state.remaining = state.remaining.saturating_sub(1);
                if state.remaining == 0 {
                    break;
                }
            }

            // Held through the send so a cancel or restart cannot slip in
            // between the check and the event.
            let timers = lock(&inner.timers);
            let current = timers
                .get(&timer_id)
                .is_some_and(|slot| slot.generation == generation && !slot.cancel.is_cancelled());
            if !current {
                return;
            }
            lock(&countdown).state = TimerState::Finished;
            info!(timer_id = %timer_id, total_seconds, "Timer finished");
            // No receivers is fine.
            let _ = inner.events.send(TimerEvent::Finished {
                timer_id,
                total_seconds,
            });
            drop(timers);
        });
    }

    /// Cancel the timer `timer_id`; returns whether it existed.
    pub fn cancel(&self, timer_id: &str) -> bool {
        let removed = lock(&self.inner.timers).remove(timer_id);
        removed.is_some_and(|slot| {
            slot.cancel.cancel();
            info!(timer_id, "Timer cancelled");
            true
        })
    }

    /// Snapshot of the timer `timer_id`.
    #[must_use]
    pub fn status(&self, timer_id: &str) -> Option<TimerStatus> {
        let timers = lock(&self.inner.timers);
        timers.get(timer_id).map(|slot| snapshot(timer_id, slot))
    }

    /// Snapshots of every timer, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<TimerStatus> {
        lock(&self.inner.timers)
            .iter()
            .map(|(id, slot)| snapshot(id, slot))
            .collect()
    }
}

fn snapshot(timer_id: &str, slot: &Slot) -> TimerStatus {
    let countdown = lock(&slot.countdown);
    TimerStatus {
        timer_id: timer_id.to_owned(),
        remaining: clock(countdown.remaining),
        remaining_seconds: countdown.remaining,
        total_seconds: countdown.total,
        state: countdown.state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_clock_format() {
        assert_eq!(clock(0), "00:00");
        assert_eq!(clock(65), "01:05");
        assert_eq!(clock(3600), "60:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_finishes() {
        let timers = TimerManager::new();
        let mut events = timers.subscribe();
        timers.start("tea", 3);

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TimerEvent::Finished {
                timer_id: "tea".into(),
                total_seconds: 3
            }
        );
        let status = timers.status("tea").unwrap();
        assert_eq!(status.state, TimerState::Finished);
        assert_eq!(status.remaining, "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let timers = TimerManager::new();
        let mut events = timers.subscribe();
        timers.start("kitchen", 2);
        timers.start("kitchen", 5);

        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TimerEvent::Finished {
                timer_id: "kitchen".into(),
                total_seconds: 5
            }
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_isolated() {
        let timers = TimerManager::new();
        let mut events = timers.subscribe();
        timers.start("a", 2);
        timers.start("b", 3);

        assert!(timers.cancel("a"));
        assert!(!timers.cancel("a"));
        assert_eq!(timers.list().len(), 1);

        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TimerEvent::Finished {
                timer_id: "b".into(),
                total_seconds: 3
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_event_after_cancel_at_expiry() {
        let timers = TimerManager::new();
        let mut events = timers.subscribe();
        let ids: Vec<String> = (0..32).map(|i| format!("t{i}")).collect();
        for id in &ids {
            timers.start(id, 1);
        }

        tokio::time::sleep(Duration::from_millis(990)).await;
        for id in &ids {
            timers.cancel(id);
            while events.try_recv().is_ok() {}
        }

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
        assert!(timers.list().is_empty());
    }
}
