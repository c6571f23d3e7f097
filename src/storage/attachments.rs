use rusqlite::{params, ErrorCode, Row};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use super::{AttachmentStore, StorageError, StorageHandle, StorageResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    File,
}

impl AttachmentKind {
    /// Commit order: images, then audio, then files.
    pub const ALL: [AttachmentKind; 3] = [
        AttachmentKind::Image,
        AttachmentKind::Audio,
        AttachmentKind::File,
    ];

    fn table(self) -> &'static str {
        match self {
            AttachmentKind::Image => "note_images",
            AttachmentKind::Audio => "note_audios",
            AttachmentKind::File => "note_files",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttachmentPayload {
    Image,
    Audio {
        file_name: String,
        duration_ms: u64,
    },
    File {
        file_name: String,
        size_bytes: u64,
        mime_type: String,
    },
}

impl AttachmentPayload {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            AttachmentPayload::Image => AttachmentKind::Image,
            AttachmentPayload::Audio { .. } => AttachmentKind::Audio,
            AttachmentPayload::File { .. } => AttachmentKind::File,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            AttachmentPayload::Image => None,
            AttachmentPayload::Audio { file_name, .. } | AttachmentPayload::File { file_name, .. } => {
                Some(file_name.as_str())
            }
        }
    }
}

/// An attachment that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub uri: String,
    pub payload: AttachmentPayload,
}

impl NewAttachment {
    pub fn image(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            payload: AttachmentPayload::Image,
        }
    }

    pub fn audio(uri: impl Into<String>, file_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            uri: uri.into(),
            payload: AttachmentPayload::Audio {
                file_name: file_name.into(),
                duration_ms,
            },
        }
    }

    pub fn file(
        uri: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            payload: AttachmentPayload::File {
                file_name: file_name.into(),
                size_bytes,
                mime_type: mime_type.into(),
            },
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRecord {
    pub id: i64,
    pub note_id: i64,
    pub uri: String,
    #[serde(flatten)]
    pub payload: AttachmentPayload,
}

impl AttachmentRecord {
    pub fn kind(&self) -> AttachmentKind {
        self.payload.kind()
    }
}

impl AttachmentStore for StorageHandle {
    fn insert_attachment(&self, note_id: i64, attachment: &NewAttachment) -> StorageResult<i64> {
        let kind = attachment.kind();
        let inserted = self.with_connection(|conn| {
            let result = match &attachment.payload {
                AttachmentPayload::Image => conn.execute(
                    "INSERT INTO note_images (note_id, uri) VALUES (?1, ?2)",
                    params![note_id, attachment.uri],
                ),
                AttachmentPayload::Audio {
                    file_name,
                    duration_ms,
                } => conn.execute(
                    "INSERT INTO note_audios (note_id, uri, file_name, duration_ms)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![note_id, attachment.uri, file_name, *duration_ms as i64],
                ),
                AttachmentPayload::File {
                    file_name,
                    size_bytes,
                    mime_type,
                } => conn.execute(
                    "INSERT INTO note_files (note_id, uri, file_name, size_bytes, mime_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        note_id,
                        attachment.uri,
                        file_name,
                        *size_bytes as i64,
                        mime_type
                    ],
                ),
            };
            match result {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StorageError::OrphanAttachment { note_id, kind })
                }
                Err(err) => Err(err.into()),
            }
        })?;
        tracing::debug!(note_id, %kind, attachment_id = inserted, "attachment inserted");
        Ok(inserted)
    }

    fn list_attachments(
        &self,
        note_id: i64,
        kind: AttachmentKind,
    ) -> StorageResult<Vec<AttachmentRecord>> {
        self.with_connection(|conn| {
            let sql = match kind {
                AttachmentKind::Image => {
                    "SELECT id, note_id, uri FROM note_images WHERE note_id = ?1 ORDER BY id"
                }
                AttachmentKind::Audio => {
                    "SELECT id, note_id, uri, file_name, duration_ms
                     FROM note_audios WHERE note_id = ?1 ORDER BY id"
                }
                AttachmentKind::File => {
                    "SELECT id, note_id, uri, file_name, size_bytes, mime_type
                     FROM note_files WHERE note_id = ?1 ORDER BY id"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            let records = stmt
                .query_map(params![note_id], |row| attachment_from_row(kind, row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    fn delete_attachments(&self, note_id: i64, kind: AttachmentKind) -> StorageResult<usize> {
        self.with_connection(|conn| {
            let sql = format!("DELETE FROM {} WHERE note_id = ?1", kind.table());
            let removed = conn.execute(&sql, params![note_id])?;
            Ok(removed)
        })
    }
}

fn attachment_from_row(kind: AttachmentKind, row: &Row<'_>) -> rusqlite::Result<AttachmentRecord> {
    let payload = match kind {
        AttachmentKind::Image => AttachmentPayload::Image,
        AttachmentKind::Audio => AttachmentPayload::Audio {
            file_name: row.get(3)?,
            duration_ms: row.get::<_, i64>(4)?.max(0) as u64,
        },
        AttachmentKind::File => AttachmentPayload::File {
            file_name: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
            mime_type: row.get(5)?,
        },
    };
    Ok(AttachmentRecord {
        id: row.get(0)?,
        note_id: row.get(1)?,
        uri: row.get(2)?,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::init_storage;
    use crate::storage::NoteStore;
    use assert_matches::assert_matches;

    #[test]
    fn round_trips_kind_specific_fields() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let note_id = storage.insert_note("Lecture", "")?;
        storage.insert_attachment(note_id, &NewAttachment::audio("file://rec.m4a", "rec.m4a", 61_000))?;
        storage.insert_attachment(
            note_id,
            &NewAttachment::file("content://slides", "slides.pdf", 4096, "application/pdf"),
        )?;

        let audios = storage.list_attachments(note_id, AttachmentKind::Audio)?;
        assert_eq!(audios.len(), 1);
        assert_eq!(audios[0].note_id, note_id);
        assert_matches!(
            &audios[0].payload,
            AttachmentPayload::Audio { file_name, duration_ms: 61_000 } if file_name == "rec.m4a"
        );

        let files = storage.list_attachments(note_id, AttachmentKind::File)?;
        assert_matches!(
            &files[0].payload,
            AttachmentPayload::File { size_bytes: 4096, mime_type, .. } if mime_type == "application/pdf"
        );
        assert!(storage.list_attachments(note_id, AttachmentKind::Image)?.is_empty());
        Ok(())
    }

    #[test]
    fn delete_all_is_scoped_to_one_kind() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let note_id = storage.insert_note("Album", "")?;
        storage.insert_attachment(note_id, &NewAttachment::image("content://1"))?;
        storage.insert_attachment(note_id, &NewAttachment::image("content://2"))?;
        storage.insert_attachment(note_id, &NewAttachment::file("content://3", "a.txt", 1, "text/plain"))?;

        assert_eq!(storage.delete_attachments(note_id, AttachmentKind::Image)?, 2);
        assert!(storage.list_attachments(note_id, AttachmentKind::Image)?.is_empty());
        assert_eq!(storage.list_attachments(note_id, AttachmentKind::File)?.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_attachments_without_a_note() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let result = storage.insert_attachment(99, &NewAttachment::image("content://stray"));
        assert_matches!(
            result,
            Err(StorageError::OrphanAttachment { note_id: 99, kind: AttachmentKind::Image })
        );
        Ok(())
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("IMAGE".parse::<AttachmentKind>().ok(), Some(AttachmentKind::Image));
        assert_eq!(AttachmentKind::Audio.to_string(), "audio");
        assert!("video".parse::<AttachmentKind>().is_err());
    }
}
