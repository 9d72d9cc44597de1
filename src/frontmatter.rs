//! Defines [`Metadata`], the structured front matter of a post, and the logic
//! for splitting a raw document into metadata and body ([`split`]) as well as
//! the defaulting rules applied on top of parsed front matter
//! ([`apply_defaults`]).
//!
//! Front matter is an optional YAML block at the very start of a document:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [rust, web]
//! ---
//! # Body starts here
//! ```

use crate::history::Commit;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use serde_yaml::Value as Yaml;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const FENCE: &str = "---";

/// The metadata key holding a post's title.
pub const TITLE: &str = "title";
/// The metadata key holding an explicit, sortable post date.
pub const DATE: &str = "date";
/// The metadata key holding a post's tags.
pub const TAGS: &str = "tags";
/// The metadata key holding a post's creation time.
pub const CREATED: &str = "created";
/// The metadata key holding a post's last-modified time.
pub const UPDATED: &str = "updated";

/// A single metadata value.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    /// A scalar. Numbers and booleans from the front matter are stored in
    /// their textual form.
    Text(String),

    /// A list of scalars.
    List(Vec<String>),

    /// A point in time. Only produced by defaulting from version history.
    Timestamp(DateTime<FixedOffset>),
}

impl MetaValue {
    /// Interprets the value as a point in time, if possible. Text values are
    /// accepted in the YAML timestamp forms: a date alone (midnight), or a
    /// date and time separated by `T` or a space, with optional seconds,
    /// fraction and offset. Times without an offset are UTC.
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            MetaValue::Timestamp(ts) => Some(*ts),
            MetaValue::Text(s) => parse_timestamp(s.trim()),
            MetaValue::List(_) => None,
        }
    }

    /// The value as text. Lists are joined with `, `.
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetaValue {
    /// Displays a [`MetaValue`] the way templates see it.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::List(items) => f.write_str(&items.join(", ")),
            MetaValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

// The date-time layouts of YAML timestamps, once any offset is split off.
// `%.f` also matches an absent fraction.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts);
    }
    let (naive, offset) = split_offset(s)?;
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive, format) {
            return offset.from_local_datetime(&naive).single();
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

// Splits a trailing `Z`, `±HH`, `±HHMM` or `±HH:MM` from `s`. Without one the
// offset is UTC. The sign is only searched for after the date part.
fn split_offset(s: &str) -> Option<(&str, FixedOffset)> {
    let utc = FixedOffset::east_opt(0)?;
    if let Some(rest) = s.strip_suffix(['Z', 'z']) {
        return Some((rest.trim_end(), utc));
    }
    let sign_at = match s.get(10..).and_then(|time| time.rfind(['+', '-'])) {
        Some(i) => i + 10,
        None => return Some((s, utc)),
    };
    let sign = match &s[sign_at..sign_at + 1] {
        "-" => -1,
        _ => 1,
    };
    let digits: String = s[sign_at + 1..].chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    Some((s[..sign_at].trim_end(), offset))
}

/// An insertion-ordered mapping of metadata keys to values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`, replacing an existing value in place (so the
    /// key keeps its original position) or appending a new entry.
    pub fn insert(&mut self, key: impl Into<String>, value: MetaValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `title` value as text, or the empty string.
    pub fn title(&self) -> String {
        self.get(TITLE).map(MetaValue::as_text).unwrap_or_default()
    }

    /// The post's tags. A scalar `tags` value is treated as a single tag.
    pub fn tags(&self) -> Vec<String> {
        match self.get(TAGS) {
            Some(MetaValue::List(tags)) => tags.clone(),
            Some(MetaValue::Text(tag)) if !tag.is_empty() => vec![tag.clone()],
            _ => Vec::new(),
        }
    }
}

/// A sortable projection of an optional [`MetaValue`]. Missing values sort
/// first (and therefore last in a descending listing), then values that
/// don't read as a point in time (lexicographically), then timestamps
/// (chronologically).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Missing,
    Text(String),
    Time(DateTime<FixedOffset>),
}

impl From<Option<&MetaValue>> for SortValue {
    fn from(value: Option<&MetaValue>) -> SortValue {
        match value {
            None => SortValue::Missing,
            Some(value) => match value.as_timestamp() {
                Some(ts) => SortValue::Time(ts),
                None => SortValue::Text(value.as_text()),
            },
        }
    }
}

/// The creation and last-update dates of a file according to its version
/// history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryDates {
    pub created: DateTime<FixedOffset>,
    pub updated: DateTime<FixedOffset>,
}

impl HistoryDates {
    /// Derives dates from a newest-first commit list: `created` is the oldest
    /// commit and `updated` the newest. Returns `None` for an empty history.
    pub fn from_commits(commits: &[Commit]) -> Option<HistoryDates> {
        let newest = commits.iter().map(|c| c.timestamp).max()?;
        let oldest = commits.iter().map(|c| c.timestamp).min()?;
        Some(HistoryDates {
            created: oldest,
            updated: newest,
        })
    }
}

/// Fills in `title`, `created` and `updated` where the front matter left them
/// out. Dates are only defaulted when `history` is available.
pub fn apply_defaults(
    mut metadata: Metadata,
    fallback_title: &str,
    history: Option<HistoryDates>,
) -> Metadata {
    if !metadata.contains_key(TITLE) {
        metadata.insert(TITLE, MetaValue::Text(fallback_title.to_owned()));
    }
    if let Some(history) = history {
        if !metadata.contains_key(CREATED) {
            metadata.insert(CREATED, MetaValue::Timestamp(history.created));
        }
        if !metadata.contains_key(UPDATED) {
            metadata.insert(UPDATED, MetaValue::Timestamp(history.updated));
        }
    }
    metadata
}

/// Splits `document` into its front matter and body. Documents without a
/// front matter block (which must start on the very first line) are
/// returned whole alongside empty metadata.
pub fn split(document: &str) -> Result<(Metadata, &str)> {
    match find_block(document) {
        None => Ok((Metadata::new(), document)),
        Some((block, body_start)) => Ok((parse_block(block)?, &document[body_start..])),
    }
}

fn is_fence(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r'])
        .trim_end_matches([' ', '\t'])
        == FENCE
}

// Returns the YAML block and the byte offset at which the body starts.
fn find_block(document: &str) -> Option<(&str, usize)> {
    let mut lines = document.split_inclusive('\n');
    let first = lines.next()?;
    if !is_fence(first) || !first.ends_with('\n') {
        return None;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if is_fence(line) {
            return Some((&document[block_start..offset], offset + line.len()));
        }
        offset += line.len();
    }
    None
}

fn parse_block(block: &str) -> Result<Metadata> {
    let yaml: Yaml = serde_yaml::from_str(block).map_err(|err| {
        let (line, column) = err
            .location()
            .map(|l| (l.line() + 1, l.column()))
            .unwrap_or((1, 0));
        Error::Syntax {
            line,
            column,
            message: without_locations(&err.to_string()),
        }
    })?;

    let mapping = match yaml {
        Yaml::Null => return Ok(Metadata::new()),
        Yaml::Mapping(mapping) => mapping,
        _ => return Err(Error::NotAMapping),
    };

    let mut metadata = Metadata::new();
    for (key, value) in mapping {
        let key = scalar(&key).ok_or(Error::UnsupportedKey)?;
        let value = match value {
            Yaml::Null => continue,
            Yaml::Sequence(items) => MetaValue::List(
                items
                    .iter()
                    .map(|item| {
                        scalar(item).ok_or_else(|| Error::UnsupportedValue(key.clone()))
                    })
                    .collect::<Result<Vec<String>>>()?,
            ),
            value => MetaValue::Text(
                scalar(&value).ok_or_else(|| Error::UnsupportedValue(key.clone()))?,
            ),
        };
        metadata.insert(key, value);
    }
    Ok(metadata)
}

// serde_yaml appends block-relative positions to its messages; the error
// reports a document-relative one instead.
fn without_locations(message: &str) -> String {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    LOCATION
        .get_or_init(|| Regex::new(r" at line \d+ column \d+").expect("location pattern is valid"))
        .replace_all(message, "")
        .into_owned()
}

fn scalar(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The result of parsing front matter.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a malformed front matter block.
#[derive(Debug, Error)]
pub enum Error {
    /// The block is not valid YAML. Line numbers count from the start of the
    /// document (the opening fence is line 1).
    #[error("invalid front matter at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The block is valid YAML but not a mapping.
    #[error("front matter must be a mapping of keys to values")]
    NotAMapping,

    /// A key is not a scalar.
    #[error("front matter keys must be scalars")]
    UnsupportedKey,

    /// A value is neither a scalar nor a list of scalars.
    #[error("front matter value for `{0}` must be a scalar or a list of scalars")]
    UnsupportedValue(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn text(s: &str) -> MetaValue {
        MetaValue::Text(s.to_owned())
    }

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_split_with_front_matter() -> Result<()> {
        let (metadata, body) =
            split("---\ntitle: Hello\ntags: [rust, web]\ndraft: true\n---\n# Hi\n")?;
        assert_eq!(Some(&text("Hello")), metadata.get(TITLE));
        assert_eq!(vec!["rust".to_owned(), "web".to_owned()], metadata.tags());
        assert_eq!(Some(&text("true")), metadata.get("draft"));
        assert_eq!("# Hi\n", body);
        Ok(())
    }

    #[test]
    fn test_split_preserves_key_order() -> Result<()> {
        let (metadata, _) = split("---\nzeta: 1\nalpha: 2\nmid: 3\n---\n")?;
        let keys: Vec<&str> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(vec!["zeta", "alpha", "mid"], keys);
        Ok(())
    }

    #[test]
    fn test_split_without_front_matter() -> Result<()> {
        let document = "# Just a heading\n\n---\nnot: front matter\n---\n";
        let (metadata, body) = split(document)?;
        assert!(metadata.is_empty());
        assert_eq!(document, body);
        Ok(())
    }

    #[test]
    fn test_split_requires_fence_on_first_line() -> Result<()> {
        let document = "\n---\ntitle: Late\n---\nbody";
        let (metadata, body) = split(document)?;
        assert!(metadata.is_empty());
        assert_eq!(document, body);
        Ok(())
    }

    #[test]
    fn test_split_unterminated_block_is_body() -> Result<()> {
        let document = "---\ntitle: Never closed\n";
        let (metadata, body) = split(document)?;
        assert!(metadata.is_empty());
        assert_eq!(document, body);
        Ok(())
    }

    #[test]
    fn test_split_tolerates_trailing_whitespace_and_crlf() -> Result<()> {
        let (metadata, body) = split("--- \r\ntitle: Windows\r\n---\t\r\nbody\r\n")?;
        assert_eq!("Windows", metadata.title());
        assert_eq!("body\r\n", body);
        Ok(())
    }

    #[test]
    fn test_split_closing_fence_at_end_of_document() -> Result<()> {
        let (metadata, body) = split("---\ntitle: Only\n---")?;
        assert_eq!("Only", metadata.title());
        assert_eq!("", body);
        Ok(())
    }

    #[test]
    fn test_split_empty_block() -> Result<()> {
        let (metadata, body) = split("---\n---\nbody")?;
        assert!(metadata.is_empty());
        assert_eq!("body", body);
        Ok(())
    }

    #[test]
    fn test_split_drops_null_values() -> Result<()> {
        let (metadata, _) = split("---\ntitle:\n---\n")?;
        assert!(!metadata.contains_key(TITLE));
        Ok(())
    }

    #[test]
    fn test_split_malformed() {
        match split("---\ntitle: [unclosed\n---\nbody") {
            Err(err @ Error::Syntax { .. }) => {
                let message = err.to_string();
                assert!(message.starts_with("invalid front matter at line "), "{}", message);
                assert_eq!(1, message.matches(" line ").count(), "{}", message);
            }
            other => panic!("wanted a syntax error; found {:?}", other),
        }
        match split("---\ntitle: [unclosed\n---\nbody") {
            Err(Error::Syntax { line, .. }) => assert!(line >= 2),
            other => panic!("wanted a syntax error; found {:?}", other),
        }
        assert!(matches!(
            split("---\n- a\n- b\n---\n"),
            Err(Error::NotAMapping)
        ));
        assert!(matches!(
            split("---\nauthor:\n  name: Ada\n---\n"),
            Err(Error::UnsupportedValue(key)) if key == "author"
        ));
    }

    #[test]
    fn test_apply_defaults() {
        let history = HistoryDates {
            created: ts("2023-01-01T00:00:00Z"),
            updated: ts("2024-01-01T00:00:00Z"),
        };
        let metadata = apply_defaults(Metadata::new(), "a", Some(history));
        assert_eq!("a", metadata.title());
        assert_eq!(
            Some(&MetaValue::Timestamp(history.created)),
            metadata.get(CREATED)
        );
        assert_eq!(
            Some(&MetaValue::Timestamp(history.updated)),
            metadata.get(UPDATED)
        );
    }

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut parsed = Metadata::new();
        parsed.insert(TITLE, text("Explicit"));
        parsed.insert(CREATED, text("2020-05-05"));
        let history = HistoryDates {
            created: ts("2023-01-01T00:00:00Z"),
            updated: ts("2024-01-01T00:00:00Z"),
        };
        let metadata = apply_defaults(parsed, "fallback", Some(history));
        assert_eq!("Explicit", metadata.title());
        assert_eq!(Some(&text("2020-05-05")), metadata.get(CREATED));
        assert_eq!(
            Some(&MetaValue::Timestamp(history.updated)),
            metadata.get(UPDATED)
        );
    }

    #[test]
    fn test_apply_defaults_without_history() {
        let metadata = apply_defaults(Metadata::new(), "a", None);
        assert!(!metadata.contains_key(CREATED));
        assert!(!metadata.contains_key(UPDATED));
    }

    #[test]
    fn test_history_dates_from_commits() {
        let commit = |timestamp: &str| Commit {
            id: String::new(),
            author: String::new(),
            email: String::new(),
            timestamp: ts(timestamp),
            message: String::new(),
        };
        let commits = [
            commit("2024-03-01T00:00:00Z"),
            commit("2024-02-01T00:00:00Z"),
            commit("2024-01-01T00:00:00Z"),
        ];
        let dates = HistoryDates::from_commits(&commits).unwrap();
        assert_eq!(ts("2024-01-01T00:00:00Z"), dates.created);
        assert_eq!(ts("2024-03-01T00:00:00Z"), dates.updated);
        assert!(HistoryDates::from_commits(&[]).is_none());
    }

    fn sort_value(s: &str) -> SortValue {
        SortValue::from(Some(&text(s)))
    }

    #[test]
    fn test_sort_value_order() {
        let a = text("2024-01-02");
        let b = MetaValue::Timestamp(ts("2024-01-01T12:00:00Z"));
        assert!(SortValue::from(Some(&a)) > SortValue::from(Some(&b)));
        assert!(SortValue::Missing < SortValue::from(Some(&a)));
        assert!(sort_value("A") < sort_value("B"));
        // text never outranks a real date
        assert!(sort_value("someday") < sort_value("1970-01-02"));
        assert!(SortValue::Missing < sort_value("someday"));
    }

    #[test]
    fn test_yaml_timestamp_forms() {
        let cases = [
            ("2020-01-01", "2020-01-01T00:00:00Z"),
            ("2020-01-01T10:00:00", "2020-01-01T10:00:00Z"),
            ("2022-06-01 10:00", "2022-06-01T10:00:00Z"),
            ("2022-06-01T10:00", "2022-06-01T10:00:00Z"),
            ("2001-12-14T21:59:43.10-05:00", "2001-12-14T21:59:43.10-05:00"),
            ("2001-12-14 21:59:43.10 -5", "2001-12-14T21:59:43.10-05:00"),
            ("2001-12-15 02:59:43.10", "2001-12-15T02:59:43.10Z"),
            ("2001-12-15 02:59:43Z", "2001-12-15T02:59:43Z"),
            ("2024-03-01 08:30:00 +0130", "2024-03-01T08:30:00+01:30"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                Some(ts(expected)),
                text(input).as_timestamp(),
                "parsing {}",
                input
            );
        }
        assert_eq!(None, text("next tuesday").as_timestamp());
        assert_eq!(None, text("2024-13-01").as_timestamp());
    }

    #[test]
    fn test_mixed_timestamp_forms_sort_chronologically() {
        let old = sort_value("2020-01-01T10:00:00");
        let mid = sort_value("2022-06-01 10:00");
        let new = sort_value("2024-01-01");
        assert!(old < mid && mid < new);
    }
}
