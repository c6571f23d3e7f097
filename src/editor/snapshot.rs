use unicode_segmentation::UnicodeSegmentation;

/// Byte range into the content. Always `start <= end` once clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(anchor: usize, focus: usize) -> Self {
        Self {
            start: anchor.min(focus),
            end: anchor.max(focus),
        }
    }

    pub fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn end_of(text: &str) -> Self {
        Self::caret(text.len())
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Orders the ends and snaps both onto grapheme boundaries inside `text`.
    pub fn clamped(self, text: &str) -> Self {
        let ordered = Self::new(self.start, self.end);
        Self {
            start: snap_to_grapheme(text, ordered.start),
            end: snap_to_grapheme(text, ordered.end),
        }
    }
}

fn snap_to_grapheme(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    text.grapheme_indices(true)
        .map(|(index, _)| index)
        .take_while(|index| *index <= pos)
        .last()
        .unwrap_or(0)
}

/// What the history stacks remember: both text fields plus where the cursor was.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditState {
    pub title: String,
    pub content: String,
    pub selection: Selection,
}

impl EditState {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let selection = Selection::end_of(&content);
        Self {
            title: title.into(),
            content,
            selection,
        }
    }

    /// Text identity; the selection does not count.
    pub fn same_text(&self, other: &EditState) -> bool {
        self.title == other.title && self.content == other.content
    }

    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_text_and_orders_ends() {
        assert_eq!(Selection::new(9, 2).clamped("abc"), Selection { start: 2, end: 3 });
        assert_eq!(Selection::caret(100).clamped("abc"), Selection::caret(3));
    }

    #[test]
    fn snaps_inside_a_grapheme_back_to_its_start() {
        let text = "ae\u{301}z";
        // byte 2 sits inside "e" + combining acute
        assert_eq!(Selection::caret(2).clamped(text), Selection::caret(1));
        let emoji = "😀x";
        assert_eq!(Selection::caret(3).clamped(emoji), Selection::caret(0));
    }

    #[test]
    fn text_identity_ignores_selection() {
        let mut a = EditState::new("t", "body");
        let b = a.clone();
        a.selection = Selection::caret(0);
        assert!(a.same_text(&b));
        assert_ne!(a, b);
    }
}
