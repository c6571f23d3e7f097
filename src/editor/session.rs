use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::autosave::{AutoSaveEvent, AutoSaveState, AutoSaveStatus, AutoSaver, CommitTrigger};
use crate::config::AppConfig;
use crate::markup::{self, TableSize};
use crate::scheduler::{Clock, Timers};
use crate::storage::{AttachmentKind, AttachmentRecord, NewAttachment, Store};

use super::history::UndoHistory;
use super::pending::PendingAttachments;
use super::recording::{AudioCapture, Begin, Recorder};
use super::{EditState, Selection, SessionError, SessionResult};

bitflags! {
    /// What a [`SessionEvent::Changed`] touched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Changes: u8 {
        const TITLE = 1 << 0;
        const CONTENT = 1 << 1;
        const SELECTION = 1 << 2;
        const ATTACHMENTS = 1 << 3;
        const RECORDING = 1 << 4;
        const HISTORY = 1 << 5;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Changed(Changes),
    AutoSave(AutoSaveEvent),
}

/// How [`EditSession::open`] found the note it was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    New,
    Loaded { note_id: i64 },
    /// The note was deleted before the session opened; the session starts
    /// empty and a commit creates a fresh note.
    NotFound { note_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTask {
    CaptureHistory,
    Autosave,
}

/// One editing interaction with a single note.
///
/// Nothing runs in the background: the owner calls [`EditSession::tick`]
/// from its event loop and the session fires whatever debounce came due.
/// [`EditSession::close`] forces a final commit.
pub struct EditSession<S: Store> {
    store: S,
    timers: Timers<SessionTask>,
    state: EditState,
    note_id: Option<i64>,
    outcome: HydrateOutcome,
    pending: PendingAttachments,
    persisted: IndexMap<AttachmentKind, Vec<AttachmentRecord>>,
    history: UndoHistory,
    autosave: AutoSaver,
    recorder: Recorder,
    listeners: Vec<Sender<SessionEvent>>,
}

impl<S: Store> EditSession<S> {
    /// Hydrates from `note_id`, or opens an empty session for a new note.
    pub fn open(
        store: S,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
        note_id: Option<i64>,
    ) -> SessionResult<Self> {
        let mut persisted = IndexMap::new();
        let (state, resolved, outcome) = match note_id {
            None => (EditState::default(), None, HydrateOutcome::New),
            Some(id) => match store.get_note(id)? {
                Some(note) => {
                    for kind in AttachmentKind::ALL {
                        persisted.insert(kind, store.list_attachments(id, kind)?);
                    }
                    (
                        EditState::new(note.title, note.content),
                        Some(id),
                        HydrateOutcome::Loaded { note_id: id },
                    )
                }
                None => {
                    tracing::warn!(note_id = id, "note vanished before the session opened");
                    (EditState::default(), None, HydrateOutcome::NotFound { note_id: id })
                }
            },
        };
        tracing::debug!(?outcome, "edit session opened");

        Ok(Self {
            store,
            timers: Timers::new(clock),
            history: UndoHistory::new(state.clone(), &config.history),
            state,
            note_id: resolved,
            outcome,
            pending: PendingAttachments::default(),
            persisted,
            autosave: AutoSaver::new(&config.auto_save),
            recorder: Recorder::default(),
            listeners: Vec::new(),
        })
    }

    pub fn with_capture(mut self, capture: Box<dyn AudioCapture>) -> Self {
        self.recorder.set_capture(capture);
        self
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    pub fn outcome(&self) -> HydrateOutcome {
        self.outcome
    }

    /// The id of the note being edited; `None` until the first commit of a
    /// new note.
    pub fn note_id(&self) -> Option<i64> {
        self.note_id
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn title(&self) -> &str {
        &self.state.title
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn selection(&self) -> Selection {
        self.state.selection
    }

    pub fn pending(&self) -> &PendingAttachments {
        &self.pending
    }

    pub fn persisted(&self, kind: AttachmentKind) -> &[AttachmentRecord] {
        self.persisted.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blank title and content with nothing pending. Never persisted.
    pub fn is_empty(&self) -> bool {
        self.state.is_blank() && self.pending.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.recorder.elapsed(self.timers.now())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_depths(&self) -> (usize, usize) {
        (self.history.undo_depth(), self.history.redo_depth())
    }

    pub fn autosave_state(&self) -> AutoSaveState {
        self.autosave.state()
    }

    pub fn autosave_status(&self) -> AutoSaveStatus {
        self.autosave.status(self.note_id)
    }

    /// How long until the next debounce fires, if any is pending.
    pub fn next_due_in(&self) -> Option<Duration> {
        self.timers.next_due_in()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.state.title = title.into();
        self.after_edit(Changes::TITLE);
    }

    pub fn set_content(&mut self, content: impl Into<String>, selection: Selection) {
        let content = content.into();
        let selection = selection.clamped(&content);
        let mut changes = Changes::CONTENT;
        if selection != self.state.selection {
            changes |= Changes::SELECTION;
        }
        self.state.content = content;
        self.state.selection = selection;
        self.after_edit(changes);
    }

    /// Moves the cursor. History and autosave are left alone.
    pub fn set_selection(&mut self, selection: Selection) {
        let selection = selection.clamped(&self.state.content);
        if selection != self.state.selection {
            self.state.selection = selection;
            self.notify(Changes::SELECTION);
        }
    }

    pub fn add_attachment(&mut self, attachment: NewAttachment) -> Uuid {
        let kind = attachment.kind();
        let id = self.pending.push(attachment);
        tracing::debug!(%kind, %id, "attachment pending");
        self.restart_autosave();
        self.notify(Changes::ATTACHMENTS);
        id
    }

    pub fn toggle_bold(&mut self) {
        let (content, selection) = markup::toggle_bold(&self.state.content, self.state.selection);
        self.set_content(content, selection);
    }

    pub fn toggle_underline(&mut self) {
        let (content, selection) =
            markup::toggle_underline(&self.state.content, self.state.selection);
        self.set_content(content, selection);
    }

    /// Inserts an empty table at the cursor. Dimensions are raw user input.
    pub fn insert_table(&mut self, rows: &str, cols: &str) {
        let size = TableSize::parse(rows, cols);
        let (content, selection) =
            markup::insert_table(&self.state.content, self.state.selection, size);
        self.set_content(content, selection);
    }

    pub fn begin_recording(&mut self) -> SessionResult<()> {
        match self.recorder.begin(self.timers.now())? {
            Begin::AlreadyRecording => Err(SessionError::AlreadyRecording),
            Begin::Started => {
                self.notify(Changes::RECORDING);
                Ok(())
            }
        }
    }

    /// Stops the recording. A recording with measurable length becomes a
    /// pending audio attachment whose id is returned.
    pub fn end_recording(&mut self) -> SessionResult<Option<Uuid>> {
        if !self.recorder.is_recording() {
            return Err(SessionError::NotRecording);
        }
        let finished = self.recorder.finish(self.timers.now());
        self.notify(Changes::RECORDING);
        Ok(finished?.map(|attachment| self.add_attachment(attachment)))
    }

    pub fn cancel_recording(&mut self) -> SessionResult<()> {
        if !self.recorder.cancel() {
            return Err(SessionError::NotRecording);
        }
        self.notify(Changes::RECORDING);
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(&mut self.timers, &self.state) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(&mut self.timers, &self.state) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    /// Fires every debounce that has come due. Returns the outcomes of any
    /// commits that ran.
    pub fn tick(&mut self) -> Vec<AutoSaveEvent> {
        let mut events = Vec::new();
        for (handle, task) in self.timers.take_due() {
            match task {
                SessionTask::CaptureHistory => {
                    if self.history.on_capture_due(handle, &self.state) {
                        self.notify(Changes::HISTORY);
                    }
                }
                SessionTask::Autosave => {
                    if self.autosave.on_timer_due(handle) && !self.is_empty() {
                        events.push(self.commit(CommitTrigger::Debounced));
                    }
                }
            }
        }
        events
    }

    /// Commits right away, cancelling any pending debounce. Empty sessions
    /// are not written.
    pub fn commit_now(&mut self) -> Option<AutoSaveEvent> {
        self.autosave.cancel(&mut self.timers);
        if self.is_empty() {
            return None;
        }
        Some(self.commit(CommitTrigger::Forced))
    }

    /// The host is going away for a while: keep any recording and save.
    pub fn on_background(&mut self) -> Option<AutoSaveEvent> {
        self.finish_recording_quietly();
        self.commit_now()
    }

    /// Tears the session down, forcing a final commit of anything non-empty.
    pub fn close(mut self) -> Option<AutoSaveEvent> {
        self.history.cancel_pending(&mut self.timers);
        self.autosave.cancel(&mut self.timers);
        self.finish_recording_quietly();
        let event = if self.is_empty() {
            None
        } else {
            Some(self.commit(CommitTrigger::Forced))
        };
        self.recorder.release();
        self.timers.clear();
        tracing::debug!(note_id = ?self.note_id, "edit session closed");
        event
    }

    fn finish_recording_quietly(&mut self) {
        if !self.recorder.is_recording() {
            return;
        }
        if let Err(err) = self.end_recording() {
            tracing::warn!(error = %err, "recording could not be finalised");
        }
    }

    fn after_edit(&mut self, changes: Changes) {
        self.history
            .capture_debounced(&mut self.timers, SessionTask::CaptureHistory);
        self.restart_autosave();
        self.notify(changes | Changes::HISTORY);
    }

    /// Applies a state from the history stacks. Unlike an edit this never
    /// schedules a history capture.
    fn restore(&mut self, restored: EditState) {
        let mut changes = Changes::HISTORY;
        if restored.title != self.state.title {
            changes |= Changes::TITLE;
        }
        if restored.content != self.state.content {
            changes |= Changes::CONTENT;
        }
        if restored.selection != self.state.selection {
            changes |= Changes::SELECTION;
        }
        self.state = restored;
        self.state.selection = self.state.selection.clamped(&self.state.content);
        self.restart_autosave();
        self.notify(changes);
    }

    fn restart_autosave(&mut self) {
        let empty = self.is_empty();
        self.autosave
            .restart(&mut self.timers, SessionTask::Autosave, empty);
    }

    fn commit(&mut self, trigger: CommitTrigger) -> AutoSaveEvent {
        let pending_before = self.pending.len();
        let event = self.autosave.run(
            &self.store,
            trigger,
            &mut self.note_id,
            &self.state,
            &mut self.pending,
        );
        if self.pending.len() != pending_before {
            self.reload_persisted();
            self.notify(Changes::ATTACHMENTS);
        }
        self.emit(SessionEvent::AutoSave(event.clone()));
        event
    }

    fn reload_persisted(&mut self) {
        let Some(note_id) = self.note_id else {
            return;
        };
        for kind in AttachmentKind::ALL {
            match self.store.list_attachments(note_id, kind) {
                Ok(records) => {
                    self.persisted.insert(kind, records);
                }
                Err(err) => {
                    tracing::warn!(note_id, %kind, error = %err, "could not reload attachments");
                }
            }
        }
    }

    fn notify(&mut self, changes: Changes) {
        self.emit(SessionEvent::Changed(changes));
    }

    fn emit(&mut self, event: SessionEvent) {
        if self.listeners.is_empty() {
            return;
        }
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
