//! Debounced persistence of an editing session.
//!
//! [`AutoSaver`] owns the debounce timer and the outcome bookkeeping; the
//! actual write goes through [`commit`], which the session calls both when
//! the timer fires and when it is torn down.

use std::time::Duration;

use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::editor::{EditState, PendingAttachments};
use crate::scheduler::{TimerHandle, Timers};
use crate::storage::{AttachmentKind, StorageResult, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSaveState {
    Idle,
    Debouncing,
    Committing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveStatus {
    Disabled,
    Idle {
        note_id: Option<i64>,
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveEvent {
    Saved {
        note_id: i64,
        timestamp: OffsetDateTime,
    },
    Failed {
        note_id: Option<i64>,
        message: String,
    },
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct AutoSaver {
    enabled: bool,
    debounce: Duration,
    state: AutoSaveState,
    pending: Option<TimerHandle>,
    pending_since: Option<OffsetDateTime>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
    commit_seq: u64,
}

/// Why a commit is running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommitTrigger {
    Debounced,
    Forced,
}

impl AutoSaver {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            debounce: config.debounce,
            state: AutoSaveState::Idle,
            pending: None,
            pending_since: None,
            last_saved_at: None,
            last_error: None,
            commit_seq: 0,
        }
    }

    pub fn state(&self) -> AutoSaveState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn commits(&self) -> u64 {
        self.commit_seq
    }

    pub fn status(&self, note_id: Option<i64>) -> AutoSaveStatus {
        if !self.enabled {
            return AutoSaveStatus::Disabled;
        }
        if let Some(failure) = &self.last_error {
            return AutoSaveStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if self.state == AutoSaveState::Debouncing {
            return AutoSaveStatus::Pending {
                since: self.pending_since.unwrap_or_else(OffsetDateTime::now_utc),
            };
        }
        AutoSaveStatus::Idle {
            note_id,
            last_saved_at: self.last_saved_at,
        }
    }

    /// Cancels the running debounce and, unless the session has nothing worth
    /// saving, starts a new one. Returns whether a timer is now pending.
    pub fn restart<T>(&mut self, timers: &mut Timers<T>, task: T, session_empty: bool) -> bool {
        self.cancel(timers);
        self.last_error = None;
        if !self.enabled || session_empty {
            self.pending_since = None;
            return false;
        }
        let handle = timers.schedule(self.debounce, task);
        tracing::debug!(?handle, debounce_ms = self.debounce.as_millis() as u64, "autosave scheduled");
        self.pending = Some(handle);
        self.pending_since.get_or_insert_with(OffsetDateTime::now_utc);
        self.state = AutoSaveState::Debouncing;
        true
    }

    pub fn cancel<T>(&mut self, timers: &mut Timers<T>) {
        if let Some(handle) = self.pending.take() {
            timers.cancel(handle);
        }
        if self.state == AutoSaveState::Debouncing {
            self.state = AutoSaveState::Idle;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Claims a fired timer. Returns `false` for handles that were superseded.
    pub fn on_timer_due(&mut self, handle: TimerHandle) -> bool {
        if self.pending != Some(handle) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Writes `state` and `pending` through `store` and records the outcome.
    /// `note_id` is updated as soon as the note row exists, even if an
    /// attachment insert fails afterwards.
    pub fn run<S: Store + ?Sized>(
        &mut self,
        store: &S,
        trigger: CommitTrigger,
        note_id: &mut Option<i64>,
        state: &EditState,
        pending: &mut PendingAttachments,
    ) -> AutoSaveEvent {
        self.state = AutoSaveState::Committing;
        self.commit_seq += 1;
        let seq = self.commit_seq;
        let result = commit(store, note_id, state, pending);
        self.state = AutoSaveState::Idle;
        self.pending_since = None;
        let timestamp = OffsetDateTime::now_utc();
        match result {
            Ok(id) => {
                tracing::info!(seq, note_id = id, ?trigger, "note saved");
                self.last_saved_at = Some(timestamp);
                self.last_error = None;
                AutoSaveEvent::Saved {
                    note_id: id,
                    timestamp,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(seq, note_id = ?*note_id, ?trigger, error = %message, "autosave failed");
                self.last_error = Some(AutoSaveFailure {
                    message: message.clone(),
                    occurred_at: timestamp,
                });
                AutoSaveEvent::Failed {
                    note_id: *note_id,
                    message,
                }
            }
        }
    }
}

/// Inserts or updates the note row, then writes pending attachments kind by
/// kind. Each attachment leaves `pending` only after its insert succeeded;
/// the first failure stops the commit.
pub fn commit<S: Store + ?Sized>(
    store: &S,
    note_id: &mut Option<i64>,
    state: &EditState,
    pending: &mut PendingAttachments,
) -> StorageResult<i64> {
    let id = match *note_id {
        Some(id) => {
            store.update_note(id, &state.title, &state.content)?;
            id
        }
        None => {
            let id = store.insert_note(&state.title, &state.content)?;
            *note_id = Some(id);
            id
        }
    };

    for kind in AttachmentKind::ALL {
        let batch = pending.of_kind(kind).to_vec();
        for item in batch {
            store.insert_attachment(id, &item.attachment)?;
            pending.remove(kind, item.id);
        }
    }
    Ok(id)
}
