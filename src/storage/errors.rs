use std::io;

use thiserror::Error;

use super::AttachmentKind;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("note {0} not found")]
    NoteNotFound(i64),
    #[error("cannot attach {kind} to unknown note {note_id}")]
    OrphanAttachment { note_id: i64, kind: AttachmentKind },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
