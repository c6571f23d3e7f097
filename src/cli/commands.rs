use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::autosave::AutoSaveEvent;
use crate::config::AppConfig;
use crate::editor::{EditSession, HydrateOutcome, Selection};
use crate::markup;
use crate::scheduler::SystemClock;
use crate::search::{filter_notes, group_by_updated, parse_query};
use crate::storage::{
    AttachmentKind, AttachmentRecord, AttachmentStore, NewAttachment, NoteRecord, NoteStore,
    StorageHandle,
};

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Filter terms (supports title: and updated:YYYY-MM-DD[..YYYY-MM-DD])
    #[arg()]
    pub query: Vec<String>,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Note identifier
    pub note_id: i64,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
    /// Print the content as written, markup included
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg(long)]
    pub title: Option<String>,
    /// Note content. If omitted, read from stdin when it is not a terminal.
    #[arg(long)]
    pub content: Option<String>,
    /// Attach an image by locator (repeatable)
    #[arg(long = "image", value_name = "URI")]
    pub images: Vec<String>,
    /// Attach a local file (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub note_id: i64,
    /// Replace the title
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the content
    #[arg(long)]
    pub content: Option<String>,
    /// Append a line to the content
    #[arg(long)]
    pub append: Option<String>,
    /// Attach an image by locator (repeatable)
    #[arg(long = "image", value_name = "URI")]
    pub images: Vec<String>,
    /// Attach a local file (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,
    /// Remove every saved attachment of a kind (image, audio, file)
    #[arg(long = "detach", value_name = "KIND")]
    pub detach: Vec<AttachmentKind>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub note_id: i64,
}

#[derive(Debug, Serialize)]
struct NoteDetail<'a> {
    #[serde(flatten)]
    note: &'a NoteRecord,
    attachments: Vec<AttachmentRecord>,
}

pub fn list_notes(config: &AppConfig, storage: &StorageHandle, args: &ListArgs) -> Result<String> {
    let notes = storage.list_notes().context("loading notes")?;
    let query = parse_query(&args.query.join(" "));
    let hits = filter_notes(&notes, &query);

    if args.json {
        let mut json = serde_json::to_string_pretty(&hits).context("serialising notes")?;
        json.push('\n');
        return Ok(json);
    }
    if hits.is_empty() {
        let message = if query.is_empty() {
            "No notes yet.\n"
        } else {
            "No matches found.\n"
        };
        return Ok(message.to_string());
    }

    let groups = group_by_updated(&hits, &config.browse.date_format)
        .with_context(|| format!("invalid browse.date_format {:?}", config.browse.date_format))?;
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(&mut out, "{}", group.label);
        for note in group.notes {
            let title = if note.title.trim().is_empty() {
                "<untitled>"
            } else {
                note.title.as_str()
            };
            let _ = writeln!(&mut out, "  #{:<4} {title}", note.id);
            let preview = markup::preview(&note.content, config.browse.preview_chars);
            if !preview.is_empty() {
                let _ = writeln!(&mut out, "        {preview}");
            }
        }
    }
    Ok(out)
}

pub fn show_note(storage: &StorageHandle, args: &ShowArgs) -> Result<String> {
    let Some(note) = storage.get_note(args.note_id).context("loading note")? else {
        bail!("note #{} not found", args.note_id);
    };
    let mut attachments = Vec::new();
    for kind in AttachmentKind::ALL {
        attachments.extend(
            storage
                .list_attachments(note.id, kind)
                .with_context(|| format!("loading {kind} attachments"))?,
        );
    }

    if args.json {
        let detail = NoteDetail {
            note: &note,
            attachments,
        };
        let mut json = serde_json::to_string_pretty(&detail).context("serialising note")?;
        json.push('\n');
        return Ok(json);
    }

    let mut out = String::new();
    let _ = writeln!(&mut out, "#{}  {}", note.id, note.title);
    let _ = writeln!(
        &mut out,
        "created {}  updated {}",
        format_timestamp(&note, false),
        format_timestamp(&note, true)
    );
    out.push('\n');
    if args.raw {
        out.push_str(&note.content);
    } else {
        out.push_str(&markup::render_plain(&markup::parse(&note.content)));
    }
    out.push('\n');
    if !attachments.is_empty() {
        out.push('\n');
        for attachment in &attachments {
            let label = attachment.payload.file_name().unwrap_or(&attachment.uri);
            let _ = writeln!(&mut out, "[{}] {label}", attachment.kind());
        }
    }
    Ok(out)
}

pub fn new_note(config: &AppConfig, storage: StorageHandle, args: NewArgs) -> Result<String> {
    let content = match args.content {
        Some(content) => content,
        None => read_stdin()?.unwrap_or_default(),
    };
    let mut session = EditSession::open(storage, Arc::new(SystemClock), config, None)?;
    if let Some(title) = args.title {
        session.set_title(title.trim());
    }
    session.set_content(content.trim_end(), Selection::default());
    for attachment in collect_attachments(&args.images, &args.files)? {
        session.add_attachment(attachment);
    }

    match session.close() {
        Some(AutoSaveEvent::Saved { note_id, .. }) => Ok(format!("Created note #{note_id}\n")),
        Some(AutoSaveEvent::Failed { message, .. }) => bail!("saving note failed: {message}"),
        None => bail!("nothing to save: title, content and attachments are all empty"),
    }
}

pub fn edit_note(config: &AppConfig, storage: StorageHandle, args: EditArgs) -> Result<String> {
    storage
        .get_note(args.note_id)?
        .with_context(|| format!("note #{} not found", args.note_id))?;
    let attachments = collect_attachments(&args.images, &args.files)?;

    for kind in &args.detach {
        let removed = storage
            .delete_attachments(args.note_id, *kind)
            .with_context(|| format!("removing {kind} attachments"))?;
        tracing::info!(note_id = args.note_id, %kind, removed, "attachments detached");
    }

    let mut session = EditSession::open(storage, Arc::new(SystemClock), config, Some(args.note_id))?;
    if let HydrateOutcome::NotFound { note_id } = session.outcome() {
        bail!("note #{note_id} not found");
    }
    if let Some(title) = args.title {
        session.set_title(title);
    }
    if let Some(content) = args.content {
        session.set_content(content, Selection::default());
    }
    if let Some(line) = args.append {
        let mut content = session.content().to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        let end = Selection::end_of(&content);
        session.set_content(content, end);
    }
    for attachment in attachments {
        session.add_attachment(attachment);
    }

    match session.close() {
        Some(AutoSaveEvent::Saved { note_id, .. }) => Ok(format!("Updated note #{note_id}\n")),
        Some(AutoSaveEvent::Failed { message, .. }) => bail!("saving note failed: {message}"),
        None => bail!("refusing to save an empty note; use `archnote delete` instead"),
    }
}

pub fn delete_note(storage: &StorageHandle, args: &DeleteArgs) -> Result<String> {
    storage
        .delete_note(args.note_id)
        .with_context(|| format!("deleting note #{}", args.note_id))?;
    Ok(format!("Deleted note #{}\n", args.note_id))
}

/// Resolves every attachment before anything is written.
fn collect_attachments(images: &[String], files: &[String]) -> Result<Vec<NewAttachment>> {
    let mut attachments: Vec<NewAttachment> =
        images.iter().map(|uri| NewAttachment::image(uri.as_str())).collect();
    for path in files {
        attachments.push(file_attachment(Path::new(path))?);
    }
    Ok(attachments)
}

fn file_attachment(path: &Path) -> Result<NewAttachment> {
    let metadata =
        fs::metadata(path).with_context(|| format!("reading file {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    let absolute = fs::canonicalize(path)
        .with_context(|| format!("resolving file {}", path.display()))?;
    let file_name = absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(NewAttachment::file(
        format!("file://{}", absolute.display()),
        file_name,
        metadata.len(),
        mime_for(path),
    ))
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt" | "md") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("m4a") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn format_timestamp(note: &NoteRecord, updated: bool) -> String {
    let (millis, at) = if updated {
        (note.updated_at, note.updated())
    } else {
        (note.created_at, note.created())
    };
    at.format(&Rfc3339).unwrap_or_else(|_| millis.to_string())
}
