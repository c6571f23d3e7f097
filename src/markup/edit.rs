use crate::editor::Selection;

const BOLD_OPEN: &str = "**";
const BOLD_CLOSE: &str = "**";
const UNDERLINE_OPEN: &str = "<u>";
const UNDERLINE_CLOSE: &str = "</u>";

pub fn toggle_bold(text: &str, selection: Selection) -> (String, Selection) {
    toggle_wrap(text, selection, BOLD_OPEN, BOLD_CLOSE)
}

pub fn toggle_underline(text: &str, selection: Selection) -> (String, Selection) {
    toggle_wrap(text, selection, UNDERLINE_OPEN, UNDERLINE_CLOSE)
}

/// Wraps the selection in markers, or removes them when the selection is
/// already wrapped (markers inside or just outside it). A collapsed selection
/// gets an empty marker pair with the caret in between.
fn toggle_wrap(text: &str, selection: Selection, open: &str, close: &str) -> (String, Selection) {
    let Selection { start, end } = selection.clamped(text);
    let selected = &text[start..end];

    if selected.len() >= open.len() + close.len()
        && selected.starts_with(open)
        && selected.ends_with(close)
    {
        let inner = &selected[open.len()..selected.len() - close.len()];
        let updated = format!("{}{inner}{}", &text[..start], &text[end..]);
        return (updated, Selection::new(start, start + inner.len()));
    }

    if text[..start].ends_with(open) && text[end..].starts_with(close) {
        let outer_start = start - open.len();
        let updated = format!(
            "{}{selected}{}",
            &text[..outer_start],
            &text[end + close.len()..]
        );
        return (
            updated,
            Selection::new(outer_start, outer_start + selected.len()),
        );
    }

    let updated = format!("{}{open}{selected}{close}{}", &text[..start], &text[end..]);
    if start == end {
        let caret = start + open.len();
        (updated, Selection::caret(caret))
    } else {
        let wrapped_end = start + open.len() + selected.len() + close.len();
        (updated, Selection::new(start, wrapped_end))
    }
}

/// Table dimensions taken from free-form user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSize {
    pub rows: usize,
    pub cols: usize,
}

impl TableSize {
    pub const DEFAULT_ROWS: usize = 2;
    pub const DEFAULT_COLS: usize = 2;
    pub const MAX_ROWS: usize = 20;
    // fewer than two columns would not have the three pipes a table needs
    pub const MIN_COLS: usize = 2;
    pub const MAX_COLS: usize = 8;

    /// Non-numeric input falls back to the defaults; numbers are clamped.
    pub fn parse(rows: &str, cols: &str) -> Self {
        Self {
            rows: clamp_input(rows, Self::DEFAULT_ROWS, 1, Self::MAX_ROWS),
            cols: clamp_input(cols, Self::DEFAULT_COLS, Self::MIN_COLS, Self::MAX_COLS),
        }
    }

    fn render(&self) -> String {
        let header: Vec<String> = (1..=self.cols).map(|n| format!(" Column {n} ")).collect();
        let separator = vec![" --- "; self.cols];
        let empty = vec!["   "; self.cols];
        let mut lines = Vec::with_capacity(self.rows + 2);
        lines.push(format!("|{}|", header.join("|")));
        lines.push(format!("|{}|", separator.join("|")));
        for _ in 0..self.rows {
            lines.push(format!("|{}|", empty.join("|")));
        }
        lines.join("\n")
    }
}

fn clamp_input(raw: &str, default: usize, min: usize, max: usize) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(value) => value.clamp(min as i64, max as i64) as usize,
        Err(_) => default,
    }
}

/// Replaces the selection with an empty table on its own lines. The caret
/// ends up right after the table.
pub fn insert_table(text: &str, selection: Selection, size: TableSize) -> (String, Selection) {
    let Selection { start, end } = selection.clamped(text);
    let before = &text[..start];
    let after = &text[end..];
    let mut block = String::new();
    if !before.is_empty() && !before.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&size.render());
    let caret = start + block.len();
    if !after.is_empty() && !after.starts_with('\n') {
        block.push('\n');
    }
    (format!("{before}{block}{after}"), Selection::caret(caret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse, Block};

    #[test]
    fn bold_wraps_selection_and_selects_result() {
        let (text, sel) = toggle_bold("make this loud", Selection::new(5, 9));
        assert_eq!(text, "make **this** loud");
        assert_eq!(&text[sel.start..sel.end], "**this**");
    }

    #[test]
    fn bold_unwraps_when_selection_includes_markers() {
        let (text, sel) = toggle_bold("make **this** loud", Selection::new(5, 13));
        assert_eq!(text, "make this loud");
        assert_eq!(&text[sel.start..sel.end], "this");
    }

    #[test]
    fn underline_unwraps_when_markers_surround_selection() {
        let (text, sel) = toggle_underline("a <u>b</u> c", Selection::new(5, 6));
        assert_eq!(text, "a b c");
        assert_eq!(sel, Selection::new(2, 3));
    }

    #[test]
    fn collapsed_selection_inserts_empty_pair() {
        let (text, sel) = toggle_underline("ab", Selection::caret(1));
        assert_eq!(text, "a<u></u>b");
        assert_eq!(sel, Selection::caret(4));

        let (again, caret) = toggle_bold("x", Selection::caret(1));
        assert_eq!(again, "x****");
        assert_eq!(caret, Selection::caret(3));
        let (undone, _) = toggle_bold(&again, caret);
        assert_eq!(undone, "x");
    }

    #[test]
    fn table_size_defaults_and_clamps() {
        assert_eq!(TableSize::parse("abc", ""), TableSize { rows: 2, cols: 2 });
        assert_eq!(TableSize::parse("0", "1"), TableSize { rows: 1, cols: 2 });
        assert_eq!(TableSize::parse("999", " 5 "), TableSize { rows: 20, cols: 5 });
        assert_eq!(TableSize::parse("-3", "100"), TableSize { rows: 1, cols: 8 });
    }

    #[test]
    fn inserted_table_parses_back_as_a_table() {
        let (text, caret) = insert_table("intro\noutro", Selection::caret(5), TableSize::parse("3", "4"));
        assert!(text.starts_with("intro\n| Column 1 |"));
        assert!(text.ends_with("|\noutro"));
        assert_eq!(&text[caret.start..], "\noutro");

        let blocks = parse(&text);
        assert_eq!(blocks.len(), 3);
        let Block::Table(table) = &blocks[1] else {
            panic!("expected a table, got {blocks:?}");
        };
        assert_eq!(table.columns(), 4);
        assert_eq!(table.rows.len(), 3);
    }
}
