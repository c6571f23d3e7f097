//! Filtering and grouping for the note list.

use std::cmp::{max, min};

use once_cell::sync::Lazy;
use time::error::InvalidFormatDescription;
use time::format_description::{self, FormatItem};
use time::{Date, Duration, Time};

use crate::storage::NoteRecord;

/// Half-open range of epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeFilter {
    pub from: Option<i64>,
    pub to: Option<i64>, // exclusive
}

impl RangeFilter {
    pub fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn contains(&self, millis: i64) -> bool {
        self.from.map_or(true, |from| millis >= from) && self.to.map_or(true, |to| millis < to)
    }

    pub fn merge(&mut self, other: RangeFilter) {
        if let Some(from) = other.from {
            self.from = Some(match self.from {
                Some(existing) => max(existing, from),
                None => from,
            });
        }
        if let Some(to) = other.to {
            self.to = Some(match self.to {
                Some(existing) => min(existing, to),
                None => to,
            });
        }
    }
}

/// Every term must appear, case-insensitively, in the title or content.
/// `title:` terms only look at the title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub title_terms: Vec<String>,
    pub updated: RangeFilter,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.title_terms.is_empty() && !self.updated.has_range()
    }

    pub fn matches(&self, note: &NoteRecord) -> bool {
        if !self.updated.contains(note.updated_at) {
            return false;
        }
        let title = note.title.to_lowercase();
        let content = note.content.to_lowercase();
        self.title_terms.iter().all(|term| title.contains(term))
            && self
                .terms
                .iter()
                .all(|term| title.contains(term) || content.contains(term))
    }
}

pub fn parse_query(input: &str) -> SearchQuery {
    let mut query = SearchQuery::default();
    for raw in input.split_whitespace() {
        if let Some(term) = raw.strip_prefix("title:") {
            if !term.is_empty() {
                query.title_terms.push(term.to_lowercase());
            }
            continue;
        }
        if let Some(range) = raw.strip_prefix("updated:") {
            query.updated.merge(parse_date_range(range));
            continue;
        }
        query.terms.push(raw.to_lowercase());
    }
    query
}

/// Keeps the list order of `notes`.
pub fn filter_notes<'a>(notes: &'a [NoteRecord], query: &SearchQuery) -> Vec<&'a NoteRecord> {
    notes.iter().filter(|note| query.matches(note)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup<'a> {
    pub date: Date,
    pub label: String,
    pub notes: Vec<&'a NoteRecord>,
}

/// Groups consecutive notes sharing an update day (UTC). Fed a list ordered
/// by recency this yields one group per day, newest first.
pub fn group_by_updated<'a>(
    notes: &[&'a NoteRecord],
    date_format: &str,
) -> Result<Vec<DateGroup<'a>>, InvalidFormatDescription> {
    let format = format_description::parse(date_format)?;
    let mut groups: Vec<DateGroup<'a>> = Vec::new();
    for &note in notes {
        let date = note.updated().date();
        match groups.last_mut() {
            Some(group) if group.date == date => group.notes.push(note),
            _ => {
                let label = date
                    .format(format.as_slice())
                    .unwrap_or_else(|_| date.to_string());
                groups.push(DateGroup {
                    date,
                    label,
                    notes: vec![note],
                });
            }
        }
    }
    Ok(groups)
}

fn parse_date_range(input: &str) -> RangeFilter {
    let mut range = RangeFilter::default();
    let parts: Vec<&str> = input.split("..").collect();
    match parts.as_slice() {
        [single] => {
            if let Some((from, to)) = parse_single_date(single) {
                range.from = Some(from);
                range.to = Some(to);
            }
        }
        [from, to] => {
            if let Some((start, _)) = parse_single_date(from) {
                range.from = Some(start);
            }
            if let Some((_, end)) = parse_single_date(to) {
                range.to = Some(end);
            }
        }
        _ => {}
    }
    range
}

fn parse_single_date(input: &str) -> Option<(i64, i64)> {
    static FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
        format_description::parse("[year]-[month]-[day]").expect("valid date format description")
    });
    if input.is_empty() {
        return None;
    }
    let date = Date::parse(input, &*FORMAT).ok()?;
    let millis = |day: Date| {
        (day.with_time(Time::MIDNIGHT).assume_utc().unix_timestamp_nanos() / 1_000_000) as i64
    };
    let next = date.checked_add(Duration::days(1))?;
    Some((millis(date), millis(next)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01T10:00:00Z and 2024-03-02T09:00:00Z
    const MARCH_1: i64 = 1_709_287_200_000;
    const MARCH_2: i64 = 1_709_370_000_000;

    fn note(id: i64, title: &str, content: &str, updated_at: i64) -> NoteRecord {
        NoteRecord {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn terms_match_title_or_content_ignoring_case() {
        let notes = vec![
            note(1, "Groceries", "milk, eggs", MARCH_2),
            note(2, "Ideas", "Buy a MILK frother", MARCH_1),
            note(3, "Plans", "trip", MARCH_1),
        ];
        let hits: Vec<i64> = filter_notes(&notes, &parse_query("milk"))
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(hits, vec![1, 2]);

        let hits = filter_notes(&notes, &parse_query("title:GROC"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        assert!(filter_notes(&notes, &parse_query("milk trip")).is_empty());
        assert_eq!(filter_notes(&notes, &parse_query("   ")).len(), 3);
    }

    #[test]
    fn updated_ranges_are_inclusive_days() {
        let query = parse_query("updated:2024-03-02");
        assert!(query.updated.has_range());
        assert!(query.matches(&note(1, "a", "", MARCH_2)));
        assert!(!query.matches(&note(2, "b", "", MARCH_1)));

        let open_ended = parse_query("updated:..2024-03-01");
        assert!(open_ended.matches(&note(3, "c", "", MARCH_1)));
        assert!(!open_ended.matches(&note(4, "d", "", MARCH_2)));
    }

    #[test]
    fn groups_follow_list_order() -> anyhow::Result<()> {
        let notes = vec![
            note(3, "late", "", MARCH_2),
            note(2, "early", "", MARCH_1 + 1_000),
            note(1, "earliest", "", MARCH_1),
        ];
        let refs: Vec<&NoteRecord> = notes.iter().collect();
        let groups = group_by_updated(&refs, "[day].[month].[year]")?;
        let summary: Vec<(String, usize)> = groups
            .iter()
            .map(|group| (group.label.clone(), group.notes.len()))
            .collect();
        assert_eq!(
            summary,
            vec![("02.03.2024".to_string(), 1), ("01.03.2024".to_string(), 2)]
        );
        assert!(group_by_updated(&refs, "[nonsense").is_err());
        Ok(())
    }
}
