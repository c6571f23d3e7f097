//! Clocks and cancellable one-shot timers.
//!
//! Everything that debounces in this crate (history capture, autosave) goes
//! through [`Timers`]. Nothing runs on its own thread: the owner calls
//! [`Timers::take_due`] from its tick, the same way a UI event loop would.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Scheduled<T> {
    deadline: Instant,
    task: T,
}

/// One-shot timers keyed by [`TimerHandle`].
#[derive(Debug)]
pub struct Timers<T> {
    clock: Arc<dyn Clock>,
    next_id: u64,
    pending: IndexMap<TimerHandle, Scheduled<T>>,
}

impl<T> Timers<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: 1,
            pending: IndexMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let deadline = self.clock.now() + delay;
        self.pending.insert(handle, Scheduled { deadline, task });
        tracing::trace!(?handle, ?delay, "timer scheduled");
        handle
    }

    /// Returns whether a pending timer was actually removed. Cancelling a
    /// handle that already fired or was already cancelled is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.pending.shift_remove(&handle).is_some();
        if removed {
            tracing::trace!(?handle, "timer cancelled");
        }
        removed
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub fn deadline(&self, handle: TimerHandle) -> Option<Instant> {
        self.pending.get(&handle).map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time until the earliest pending deadline, `None` when nothing is armed.
    pub fn next_due_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending
            .values()
            .map(|entry| entry.deadline.saturating_duration_since(now))
            .min()
    }

    /// Removes every timer whose deadline has passed and hands back its task,
    /// earliest deadline first. Timers sharing a deadline keep scheduling order.
    pub fn take_due(&mut self) -> Vec<(TimerHandle, T)> {
        let now = self.clock.now();
        let due: Vec<TimerHandle> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(handle, _)| *handle)
            .collect();
        let mut fired: Vec<(TimerHandle, Scheduled<T>)> = due
            .into_iter()
            .filter_map(|handle| {
                self.pending
                    .shift_remove(&handle)
                    .map(|entry| (handle, entry))
            })
            .collect();
        fired.sort_by_key(|(handle, entry)| (entry.deadline, *handle));
        fired
            .into_iter()
            .map(|(handle, entry)| (handle, entry.task))
            .collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
