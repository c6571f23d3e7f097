use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod attachments;
mod errors;
mod schema;

pub use attachments::{AttachmentKind, AttachmentPayload, AttachmentRecord, NewAttachment};
pub use errors::{StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl NoteRecord {
    pub fn created(&self) -> OffsetDateTime {
        millis_to_datetime(self.created_at)
    }

    pub fn updated(&self) -> OffsetDateTime {
        millis_to_datetime(self.updated_at)
    }
}

/// Note persistence contract used by editing sessions.
pub trait NoteStore {
    /// Emits the current list right away and again after every insert, update
    /// or delete. Ordered most recently updated first.
    fn subscribe_notes(&self) -> StorageResult<Receiver<Vec<NoteRecord>>>;
    fn list_notes(&self) -> StorageResult<Vec<NoteRecord>>;
    fn get_note(&self, note_id: i64) -> StorageResult<Option<NoteRecord>>;
    /// Stamps `created_at == updated_at` and returns the new id.
    fn insert_note(&self, title: &str, content: &str) -> StorageResult<i64>;
    /// Refreshes `updated_at`; `created_at` is left alone.
    fn update_note(&self, note_id: i64, title: &str, content: &str) -> StorageResult<()>;
    /// Removes the note and, through the schema, all of its attachments.
    fn delete_note(&self, note_id: i64) -> StorageResult<()>;
}

/// Attachments are write-once: there is no update, only delete and re-insert.
pub trait AttachmentStore {
    fn insert_attachment(&self, note_id: i64, attachment: &NewAttachment) -> StorageResult<i64>;
    fn list_attachments(
        &self,
        note_id: i64,
        kind: AttachmentKind,
    ) -> StorageResult<Vec<AttachmentRecord>>;
    fn delete_attachments(&self, note_id: i64, kind: AttachmentKind) -> StorageResult<usize>;
}

pub trait Store: NoteStore + AttachmentStore {}

impl<T: NoteStore + AttachmentStore> Store for T {}

type NoteListSender = Sender<Vec<NoteRecord>>;

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    watchers: Arc<Mutex<Vec<NoteListSender>>>,
}

impl StorageHandle {
    pub fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn subscriber_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Re-queries the list and pushes it to every live subscriber, dropping
    /// the ones whose receiver went away.
    fn publish_notes(&self) {
        let mut watchers = self.watchers.lock();
        if watchers.is_empty() {
            return;
        }
        let notes = match self.list_notes() {
            Ok(notes) => notes,
            Err(err) => {
                tracing::warn!(?err, "failed to refresh note list for subscribers");
                return;
            }
        };
        watchers.retain(|tx| tx.send(notes.clone()).is_ok());
    }
}

impl NoteStore for StorageHandle {
    fn subscribe_notes(&self) -> StorageResult<Receiver<Vec<NoteRecord>>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let current = self.list_notes()?;
        // the receiver is still in scope, so this send cannot fail
        let _ = tx.send(current);
        self.watchers.lock().push(tx);
        Ok(rx)
    }

    fn list_notes(&self) -> StorageResult<Vec<NoteRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content, created_at, updated_at
                 FROM notes
                 ORDER BY updated_at DESC, id DESC",
            )?;
            let notes = stmt
                .query_map([], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
    }

    fn get_note(&self, note_id: i64) -> StorageResult<Option<NoteRecord>> {
        self.with_connection(|conn| {
            let note = conn
                .query_row(
                    "SELECT id, title, content, created_at, updated_at
                     FROM notes
                     WHERE id = ?1",
                    params![note_id],
                    note_from_row,
                )
                .optional()?;
            Ok(note)
        })
    }

    fn insert_note(&self, title: &str, content: &str) -> StorageResult<i64> {
        let note_id = self.with_connection(|conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO notes (title, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![title, content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        tracing::debug!(note_id, "note inserted");
        self.publish_notes();
        Ok(note_id)
    }

    fn update_note(&self, note_id: i64, title: &str, content: &str) -> StorageResult<()> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE notes SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
                params![title, content, now_millis(), note_id],
            )?;
            if updated == 0 {
                return Err(StorageError::NoteNotFound(note_id));
            }
            Ok(())
        })?;
        tracing::debug!(note_id, "note updated");
        self.publish_notes();
        Ok(())
    }

    fn delete_note(&self, note_id: i64) -> StorageResult<()> {
        self.with_connection(|conn| {
            let deleted = conn.execute("DELETE FROM notes WHERE id = ?1", params![note_id])?;
            if deleted == 0 {
                return Err(StorageError::NoteNotFound(note_id));
            }
            Ok(())
        })?;
        tracing::debug!(note_id, "note deleted");
        self.publish_notes();
        Ok(())
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRecord> {
    Ok(NoteRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn millis_to_datetime(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> StorageResult<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "note database ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
        watchers: Arc::new(Mutex::new(Vec::new())),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> StorageResult<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::init_storage;
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn insert_stamps_matching_timestamps() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let id = storage.insert_note("Groceries", "")?;
        let note = storage.get_note(id)?.expect("note present");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "");
        assert_eq!(note.created_at, note.updated_at);
        Ok(())
    }

    #[test]
    fn update_keeps_created_at() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let id = storage.insert_note("Draft", "one")?;
        let before = storage.get_note(id)?.expect("note present");
        std::thread::sleep(std::time::Duration::from_millis(5));
        storage.update_note(id, "Draft", "two")?;
        let after = storage.get_note(id)?.expect("note present");
        assert_eq!(after.content, "two");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
        Ok(())
    }

    #[test]
    fn unknown_ids_are_absent_or_rejected() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert!(storage.get_note(404)?.is_none());
        assert_matches!(
            storage.update_note(404, "t", "c"),
            Err(StorageError::NoteNotFound(404))
        );
        assert_matches!(
            storage.delete_note(404),
            Err(StorageError::NoteNotFound(404))
        );
        Ok(())
    }

    #[test]
    fn list_is_most_recently_updated_first() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.insert_note("first", "")?;
        let second = storage.insert_note("second", "")?;
        std::thread::sleep(std::time::Duration::from_millis(5));
        storage.update_note(first, "first", "touched")?;

        let ids: Vec<i64> = storage.list_notes()?.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first, second]);
        Ok(())
    }

    #[test]
    fn subscribers_see_every_mutation() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let rx = storage.subscribe_notes()?;
        assert!(rx.try_recv()?.is_empty());

        let id = storage.insert_note("Inbox", "")?;
        assert_eq!(rx.try_recv()?.len(), 1);

        storage.update_note(id, "Inbox", "thoughts")?;
        assert_eq!(rx.try_recv()?[0].content, "thoughts");

        storage.delete_note(id)?;
        assert!(rx.try_recv()?.is_empty());
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn dropped_subscribers_are_pruned() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let rx = storage.subscribe_notes()?;
        assert_eq!(storage.subscriber_count(), 1);
        drop(rx);
        storage.insert_note("ping", "")?;
        assert_eq!(storage.subscriber_count(), 0);
        Ok(())
    }

    #[test]
    fn deleting_a_note_cascades_to_attachments() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let id = storage.insert_note("Trip", "photos")?;
        storage.insert_attachment(id, &NewAttachment::image("content://a"))?;
        storage.insert_attachment(id, &NewAttachment::audio("file://memo.m4a", "memo.m4a", 1200))?;
        storage.insert_attachment(
            id,
            &NewAttachment::file("content://doc", "plan.pdf", 2048, "application/pdf"),
        )?;

        storage.delete_note(id)?;

        for kind in AttachmentKind::ALL {
            assert!(storage.list_attachments(id, kind)?.is_empty(), "{kind} left behind");
        }
        Ok(())
    }
}
