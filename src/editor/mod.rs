//! Editing sessions: in-memory note state, undo/redo and recording.

mod errors;
mod history;
mod pending;
mod recording;
mod session;
mod snapshot;

pub use errors::{SessionError, SessionResult};
pub use history::UndoHistory;
pub use pending::{PendingAttachment, PendingAttachments};
pub use recording::{AudioCapture, CaptureError, CaptureTarget};
pub use session::{Changes, EditSession, HydrateOutcome, SessionEvent};
pub use snapshot::{EditState, Selection};
