pub mod autosave;
pub mod cli;
pub mod config;
pub mod editor;
pub mod markup;
pub mod scheduler;
pub mod search;
pub mod storage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use editor::{EditSession, EditState, HydrateOutcome, Selection, SessionError};
pub use storage::{AttachmentStore, NoteStore, StorageHandle};
