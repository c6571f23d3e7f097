use std::collections::VecDeque;
use std::time::Duration;

use crate::config::HistoryConfig;
use crate::scheduler::{TimerHandle, Timers};

use super::EditState;

/// Bounded undo/redo stacks over [`EditState`] snapshots.
///
/// The bottom of the undo stack is the state the session started from and is
/// never popped or evicted. The top of the undo stack always mirrors the
/// session's current state once pending captures have been flushed.
#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<EditState>,
    redo: VecDeque<EditState>,
    capacity: usize,
    capture_delay: Duration,
    pending_capture: Option<TimerHandle>,
}

impl UndoHistory {
    pub fn new(initial: EditState, config: &HistoryConfig) -> Self {
        Self::with_limits(initial, config.capacity, config.capture_debounce)
    }

    pub fn with_limits(initial: EditState, capacity: usize, capture_delay: Duration) -> Self {
        let mut undo = VecDeque::with_capacity(capacity.min(64));
        undo.push_back(initial);
        Self {
            undo,
            redo: VecDeque::new(),
            capacity: capacity.max(2),
            capture_delay,
            pending_capture: None,
        }
    }

    /// Starts over from `initial`, dropping both stacks and any pending capture.
    pub fn reset<T>(&mut self, initial: EditState, timers: &mut Timers<T>) {
        self.cancel_pending(timers);
        self.undo.clear();
        self.redo.clear();
        self.undo.push_back(initial);
    }

    /// Restarts the capture timer. Called on every edit.
    pub fn capture_debounced<T>(&mut self, timers: &mut Timers<T>, task: T) {
        self.cancel_pending(timers);
        self.pending_capture = Some(timers.schedule(self.capture_delay, task));
    }

    pub fn cancel_pending<T>(&mut self, timers: &mut Timers<T>) {
        if let Some(handle) = self.pending_capture.take() {
            timers.cancel(handle);
        }
    }

    pub fn has_pending_capture(&self) -> bool {
        self.pending_capture.is_some()
    }

    /// Handles a fired capture timer. Stale handles are ignored.
    pub fn on_capture_due(&mut self, handle: TimerHandle, current: &EditState) -> bool {
        if self.pending_capture != Some(handle) {
            return false;
        }
        self.pending_capture = None;
        self.capture(current)
    }

    /// Captures right away if a capture is still waiting on its timer.
    pub fn flush<T>(&mut self, timers: &mut Timers<T>, current: &EditState) -> bool {
        match self.pending_capture.take() {
            Some(handle) => {
                timers.cancel(handle);
                self.capture(current)
            }
            None => false,
        }
    }

    /// Pushes `current` unless its text matches the top of the undo stack.
    /// A successful push invalidates the redo stack.
    pub fn capture(&mut self, current: &EditState) -> bool {
        if self.undo.back().is_some_and(|top| top.same_text(current)) {
            return false;
        }
        self.push_undo(current.clone());
        self.redo.clear();
        true
    }

    /// Returns the state to restore, or `None` at the floor.
    pub fn undo<T>(&mut self, timers: &mut Timers<T>, current: &EditState) -> Option<EditState> {
        self.flush(timers, current);
        if self.undo.len() <= 1 {
            return None;
        }
        let popped = self.undo.pop_back()?;
        self.push_redo(popped);
        self.undo.back().cloned()
    }

    /// Returns the state to restore, or `None` when there is nothing to redo.
    pub fn redo<T>(&mut self, timers: &mut Timers<T>, current: &EditState) -> Option<EditState> {
        // an edit still waiting to be captured invalidates redo once flushed
        self.flush(timers, current);
        let next = self.redo.pop_back()?;
        self.push_undo(next.clone());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.len() > 1 || self.pending_capture.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn floor(&self) -> Option<&EditState> {
        self.undo.front()
    }

    pub fn top(&self) -> Option<&EditState> {
        self.undo.back()
    }

    fn push_undo(&mut self, state: EditState) {
        self.undo.push_back(state);
        if self.undo.len() > self.capacity {
            // oldest entry above the floor
            self.undo.remove(1);
        }
    }

    fn push_redo(&mut self, state: EditState) {
        self.redo.push_back(state);
        if self.redo.len() > self.capacity {
            self.redo.pop_front();
        }
    }
}
