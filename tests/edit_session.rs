use std::sync::Arc;

use archnote::autosave::AutoSaveEvent;
use archnote::config::{AppConfig, ConfigPaths, StorageOptions};
use archnote::markup::{self, Block};
use archnote::scheduler::ManualClock;
use archnote::storage::{self, AttachmentKind, NewAttachment};
use archnote::{AttachmentStore, EditSession, HydrateOutcome, NoteStore, Selection, StorageHandle};
use assert_matches::assert_matches;
use tempfile::TempDir;

fn setup() -> anyhow::Result<(TempDir, StorageHandle)> {
    let temp = TempDir::new()?;
    let base = temp.path();
    let paths = ConfigPaths {
        config_dir: base.join("config"),
        config_file: base.join("config/config.toml"),
        data_dir: base.join("data"),
        database_path: base.join("data/notes.db"),
        cache_dir: base.join("cache"),
        log_dir: base.join("logs"),
        state_dir: base.join("state"),
    };
    paths.ensure_directories()?;
    let storage = storage::init(&paths, &StorageOptions::default())?;
    Ok((temp, storage))
}

#[test]
fn note_list_follows_a_whole_session() -> anyhow::Result<()> {
    let (_temp, storage) = setup()?;
    let notes = storage.subscribe_notes()?;
    assert!(notes.try_recv()?.is_empty());

    let clock = ManualClock::new();
    let mut session = EditSession::open(
        storage.clone(),
        Arc::new(clock.clone()),
        &AppConfig::default(),
        None,
    )?;
    session.set_title("Groceries");
    clock.advance_ms(2_000);
    assert_matches!(session.tick().as_slice(), [AutoSaveEvent::Saved { .. }]);
    let listed = notes.try_recv()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Groceries");

    session.set_content("milk", Selection::caret(4));
    session.add_attachment(NewAttachment::image("uri://a"));
    session.add_attachment(NewAttachment::image("uri://b"));
    let id = session.note_id().expect("id assigned by the first commit");
    assert_matches!(session.close(), Some(AutoSaveEvent::Saved { note_id, .. }) if note_id == id);

    assert_eq!(notes.try_recv()?[0].content, "milk");
    let images = storage.list_attachments(id, AttachmentKind::Image)?;
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|image| image.note_id == id));
    assert_eq!(storage.list_notes()?.len(), 1);
    Ok(())
}

#[test]
fn reopening_hydrates_and_undo_stops_at_the_saved_state() -> anyhow::Result<()> {
    let (_temp, storage) = setup()?;
    let id = storage.insert_note("Recipe", "flour")?;
    storage.insert_attachment(id, &NewAttachment::audio("file://steps.m4a", "steps.m4a", 4_000))?;

    let clock = ManualClock::new();
    let mut session = EditSession::open(
        storage.clone(),
        Arc::new(clock.clone()),
        &AppConfig::default(),
        Some(id),
    )?;
    assert_eq!(session.outcome(), HydrateOutcome::Loaded { note_id: id });
    assert_eq!(session.persisted(AttachmentKind::Audio).len(), 1);

    for step in ["flour, sugar", "flour, sugar, eggs", "flour, sugar, eggs, butter"] {
        session.set_content(step, Selection::end_of(step));
        clock.advance_ms(400);
        session.tick();
    }
    while session.undo() {}
    assert_eq!((session.title(), session.content()), ("Recipe", "flour"));

    while session.redo() {}
    assert_eq!(session.content(), "flour, sugar, eggs, butter");
    session.close();

    let saved = storage.get_note(id)?.expect("note kept");
    assert_eq!(saved.content, "flour, sugar, eggs, butter");
    assert_eq!(storage.list_attachments(id, AttachmentKind::Audio)?.len(), 1);
    Ok(())
}

#[test]
fn table_content_round_trips_through_the_store() -> anyhow::Result<()> {
    let (_temp, storage) = setup()?;
    let clock = ManualClock::new();
    let mut session = EditSession::open(
        storage.clone(),
        Arc::new(clock),
        &AppConfig::default(),
        None,
    )?;
    session.set_content("Budget", Selection::caret(6));
    session.insert_table("two", "3");
    let id = match session.close() {
        Some(AutoSaveEvent::Saved { note_id, .. }) => note_id,
        other => panic!("expected a save, got {other:?}"),
    };

    let content = storage.get_note(id)?.expect("saved").content;
    let blocks = markup::parse(&content);
    assert_matches!(&blocks[1], Block::Table(table) if table.columns() == 3 && table.rows.len() == 2);
    Ok(())
}
