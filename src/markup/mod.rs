//! The small markup dialect notes are written in.
//!
//! `**text**` is bold, `<u>text</u>` is underlined, and a run of lines that
//! each start and end with `|` (three pipes or more) is a table candidate.
//! Anything that does not parse cleanly is kept as plain text.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_width::UnicodeWidthStr;

mod edit;

pub use edit::{insert_table, toggle_bold, toggle_underline, TableSize};

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold pattern"));
static UNDERLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<u>(.*?)</u>").expect("valid underline pattern"));

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpanStyle: u8 {
        const BOLD = 0b01;
        const UNDERLINE = 0b10;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn columns(&self) -> usize {
        self.header.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// One line of inline text. An empty line has no spans.
    Line(Vec<Span>),
    Table(Table),
}

pub fn parse(content: &str) -> Vec<Block> {
    let lines: Vec<&str> = content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let mut blocks = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        if !is_table_line(lines[index]) {
            blocks.push(Block::Line(parse_inline(lines[index])));
            index += 1;
            continue;
        }
        let start = index;
        while index < lines.len() && is_table_line(lines[index]) {
            index += 1;
        }
        let run = &lines[start..index];
        match parse_table(run) {
            Some(table) => blocks.push(Block::Table(table)),
            None => blocks.extend(run.iter().map(|line| Block::Line(parse_inline(line)))),
        }
    }
    blocks
}

pub fn parse_inline(line: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    collect_spans(line, SpanStyle::empty(), &mut spans);
    spans
}

fn collect_spans(text: &str, style: SpanStyle, out: &mut Vec<Span>) {
    let mut rest = text;
    loop {
        let next = earliest(BOLD.captures(rest), UNDERLINE.captures(rest));
        let Some((caps, flag)) = next else {
            push_span(out, rest, style);
            return;
        };
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            push_span(out, rest, style);
            return;
        };
        push_span(out, &rest[..whole.start()], style);
        collect_spans(inner.as_str(), style | flag, out);
        rest = &rest[whole.end()..];
    }
}

fn earliest<'t>(
    bold: Option<Captures<'t>>,
    underline: Option<Captures<'t>>,
) -> Option<(Captures<'t>, SpanStyle)> {
    let start = |caps: &Captures<'_>| caps.get(0).map(|m| m.start()).unwrap_or(usize::MAX);
    match (bold, underline) {
        (Some(b), Some(u)) if start(&u) < start(&b) => Some((u, SpanStyle::UNDERLINE)),
        (Some(b), _) => Some((b, SpanStyle::BOLD)),
        (None, Some(u)) => Some((u, SpanStyle::UNDERLINE)),
        (None, None) => None,
    }
}

fn push_span(out: &mut Vec<Span>, text: &str, style: SpanStyle) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut() {
        if last.style == style {
            last.text.push_str(text);
            return;
        }
    }
    out.push(Span {
        text: text.to_string(),
        style,
    });
}

/// The pipes must sit in the first and last columns; indented lines are text.
fn is_table_line(line: &str) -> bool {
    line.len() >= 2
        && line.starts_with('|')
        && line.ends_with('|')
        && line.matches('|').count() >= 3
}

fn is_separator_line(line: &str) -> bool {
    line.contains('-')
        && line
            .chars()
            .all(|ch| matches!(ch, '-' | ':' | '|') || ch.is_whitespace())
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = &trimmed[1..trimmed.len() - 1];
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn parse_table(lines: &[&str]) -> Option<Table> {
    let (first, rest) = lines.split_first()?;
    let header = split_cells(first);
    let body = match rest.first() {
        Some(second) if is_separator_line(second) => &rest[1..],
        _ => rest,
    };
    let rows: Vec<Vec<String>> = body.iter().map(|line| split_cells(line)).collect();
    if rows.is_empty() || rows.iter().any(|row| row.len() != header.len()) {
        return None;
    }
    Some(Table { header, rows })
}

/// Markers stripped, tables laid out in aligned columns.
pub fn render_plain(blocks: &[Block]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            Block::Line(spans) => out.push(spans.iter().map(|s| s.text.as_str()).collect()),
            Block::Table(table) => out.extend(render_table(table)),
        }
    }
    out.join("\n")
}

/// Single-line, marker-free preview capped at `max_chars` characters.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = parse(content)
        .iter()
        .map(|block| match block {
            Block::Line(spans) => spans.iter().map(|s| s.text.as_str()).collect::<String>(),
            Block::Table(table) => table.header.join(" "),
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut chars = flat.chars();
    let mut preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}

fn render_table(table: &Table) -> Vec<String> {
    let mut widths: Vec<usize> = table.header.iter().map(|cell| cell.width()).collect();
    for row in &table.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }
    let format_row = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.width());
                format!(" {cell}{} ", " ".repeat(pad))
            })
            .collect();
        format!("|{}|", padded.join("|"))
    };
    let rule = format!(
        "|{}|",
        widths
            .iter()
            .map(|width| "-".repeat(width + 2))
            .collect::<Vec<_>>()
            .join("|")
    );
    let mut lines = Vec::with_capacity(table.rows.len() + 2);
    lines.push(format_row(&table.header));
    lines.push(rule);
    lines.extend(table.rows.iter().map(|row| format_row(row)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, style: SpanStyle) -> Span {
        Span {
            text: text.to_string(),
            style,
        }
    }

    #[test]
    fn table_with_separator_skips_it() {
        let blocks = parse("|A|B|\n|-|-|\n|1|2|");
        assert_eq!(
            blocks,
            vec![Block::Table(Table {
                header: vec!["A".into(), "B".into()],
                rows: vec![vec!["1".into(), "2".into()]],
            })]
        );
    }

    #[test]
    fn table_without_separator_uses_first_line_as_header() {
        let blocks = parse("| name | qty |\n| eggs | 12 |\n| milk | 1 |");
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table, got {blocks:?}");
        };
        assert_eq!(table.header, vec!["name", "qty"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["milk", "1"]);
    }

    #[test]
    fn mismatched_columns_fall_back_to_text() {
        let blocks = parse("|A|B|\n|1|");
        assert_eq!(
            blocks,
            vec![
                Block::Line(vec![span("|A|B|", SpanStyle::empty())]),
                Block::Line(vec![span("|1|", SpanStyle::empty())]),
            ]
        );

        let ragged = parse("|A|B|\n|1|2|3|");
        assert!(ragged.iter().all(|block| matches!(block, Block::Line(_))));
    }

    #[test]
    fn row_of_empty_cells_is_data_not_a_separator() {
        let blocks = parse("|A|B|\n| | |\n|1|2|");
        assert_eq!(
            blocks,
            vec![Block::Table(Table {
                header: vec!["A".into(), "B".into()],
                rows: vec![
                    vec![String::new(), String::new()],
                    vec!["1".into(), "2".into()],
                ],
            })]
        );
    }

    #[test]
    fn indented_pipes_stay_text() {
        let blocks = parse("  |A|B|\n  |1|2|");
        assert!(blocks.iter().all(|block| matches!(block, Block::Line(_))));
        let trailing = parse("|A|B|\n|1|2| ");
        assert!(matches!(trailing.as_slice(), [Block::Line(_), Block::Line(_)]));
    }

    #[test]
    fn header_alone_is_not_a_table() {
        assert!(matches!(parse("|A|B|\n|---|---|")[0], Block::Line(_)));
    }

    #[test]
    fn table_runs_are_split_by_text_lines() {
        let blocks = parse("intro\n|a|b|\n|1|2|\noutro");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[1], Block::Table(_)));
    }

    #[test]
    fn inline_styles_nest() {
        let spans = parse_inline("plain **bold <u>both</u>** <u>under</u>");
        assert_eq!(
            spans,
            vec![
                span("plain ", SpanStyle::empty()),
                span("bold ", SpanStyle::BOLD),
                span("both", SpanStyle::BOLD | SpanStyle::UNDERLINE),
                span(" ", SpanStyle::empty()),
                span("under", SpanStyle::UNDERLINE),
            ]
        );
    }

    #[test]
    fn unmatched_markers_stay_literal() {
        assert_eq!(
            parse_inline("2 ** 3 and <u>open"),
            vec![span("2 ** 3 and <u>open", SpanStyle::empty())]
        );
        assert_eq!(parse_inline("****"), vec![span("****", SpanStyle::empty())]);
    }

    #[test]
    fn renders_tables_aligned() {
        let rendered = render_plain(&parse("**Shopping**\n|item|n|\n|-|-|\n|apples|3|"));
        insta::assert_snapshot!(rendered, @r###"
        Shopping
        | item   | n |
        |--------|---|
        | apples | 3 |
        "###);
    }

    #[test]
    fn preview_strips_markup_and_truncates() {
        assert_eq!(preview("**Hello** <u>world</u>\n\nagain", 100), "Hello world again");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
