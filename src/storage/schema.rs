use rusqlite::Connection;

use super::StorageResult;

pub fn apply(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS notes_updated_idx ON notes(updated_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS note_images (
            id INTEGER PRIMARY KEY,
            note_id INTEGER NOT NULL,
            uri TEXT NOT NULL,
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS note_audios (
            id INTEGER PRIMARY KEY,
            note_id INTEGER NOT NULL,
            uri TEXT NOT NULL,
            file_name TEXT NOT NULL,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS note_files (
            id INTEGER PRIMARY KEY,
            note_id INTEGER NOT NULL,
            uri TEXT NOT NULL,
            file_name TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS note_images_note_idx ON note_images(note_id);
        CREATE INDEX IF NOT EXISTS note_audios_note_idx ON note_audios(note_id);
        CREATE INDEX IF NOT EXISTS note_files_note_idx ON note_files(note_id);
        "#,
    )?;
    Ok(())
}
