use indexmap::IndexMap;
use uuid::Uuid;

use crate::storage::{AttachmentKind, NewAttachment};

/// An attachment picked or recorded during the session but not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub id: Uuid,
    pub attachment: NewAttachment,
}

/// Pending attachments grouped by kind, each group in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PendingAttachments {
    by_kind: IndexMap<AttachmentKind, Vec<PendingAttachment>>,
}

impl PendingAttachments {
    pub fn push(&mut self, attachment: NewAttachment) -> Uuid {
        let id = Uuid::new_v4();
        self.by_kind
            .entry(attachment.kind())
            .or_default()
            .push(PendingAttachment { id, attachment });
        id
    }

    pub fn of_kind(&self, kind: AttachmentKind) -> &[PendingAttachment] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes exactly the item with `id`, leaving anything added since alone.
    pub fn remove(&mut self, kind: AttachmentKind, id: Uuid) -> Option<PendingAttachment> {
        let items = self.by_kind.get_mut(&kind)?;
        let index = items.iter().position(|item| item.id == id)?;
        Some(items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }

    /// All items in commit order: images, audio, then files.
    pub fn iter(&self) -> impl Iterator<Item = &PendingAttachment> + '_ {
        AttachmentKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of_kind(kind).iter())
    }
}
