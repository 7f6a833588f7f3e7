//! Captured mood records and their two encodings
//!
//! A [`Record`] has two canonical forms:
//!
//! - a queue line, `date,time,category`, written with minimal CSV quoting so
//!   that plain records stay byte-identical to the device's historical
//!   `mood_log.csv` while a category containing a comma or quote still
//!   round-trips
//! - a query string, `date=..&time=..&mood=..`, with every value
//!   percent-encoded for the collector endpoint

use chrono::NaiveDateTime;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};

use crate::error::{Error, Result};

/// The moods on the device, in button order.
pub const DEFAULT_MOODS: [&str; 6] = [
    "Excited XD",
    "Happy :D",
    "Peace :)",
    "Tired -_-",
    "Anxious X(",
    "Angry -_-^",
];

/// Date format used for the `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format used for the `time` field.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    date: String,
    time: String,
    category: String,
}

impl Record {
    /// Build a record from already formatted fields.
    ///
    /// Never fails. Line breaks inside a field are folded into spaces so that
    /// every record occupies exactly one queue line.
    pub fn new(date: impl Into<String>, time: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            date: single_line(date.into()),
            time: single_line(time.into()),
            category: single_line(category.into()),
        }
    }

    /// Build a record stamped with the given wall-clock time.
    pub fn at(timestamp: NaiveDateTime, category: impl Into<String>) -> Self {
        Self::new(
            timestamp.format(DATE_FORMAT).to_string(),
            timestamp.format(TIME_FORMAT).to_string(),
            category,
        )
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Transport-safe query string for this record.
    ///
    /// Every byte outside the RFC 3986 unreserved set is percent-encoded,
    /// which covers the space, colon, caret and parenthesis found in the
    /// default moods.
    pub fn to_query_string(&self) -> String {
        format!(
            "date={}&time={}&mood={}",
            urlencoding::encode(&self.date),
            urlencoding::encode(&self.time),
            urlencoding::encode(&self.category)
        )
    }

    /// Full request URL for delivering this record to `endpoint`.
    pub fn request_url(&self, endpoint: &str) -> String {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}{}", endpoint, separator, self.to_query_string())
    }

    /// Encode as one newline-terminated queue line.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::with_capacity(64));
        writer.write_record([&self.date, &self.time, &self.category])?;
        writer.into_inner().map_err(|e| Error::Io(e.into_error()))
    }

    fn from_fields(fields: &StringRecord) -> Option<Self> {
        if fields.len() < 3 {
            return None;
        }
        // Lines written before quoting was introduced may carry an unquoted
        // comma inside the category; everything after the time is the category.
        let category = fields.iter().skip(2).collect::<Vec<_>>().join(",");
        Some(Self::new(&fields[0], &fields[1], category))
    }
}

/// Build a record from its three fields.
pub fn encode(date: &str, time: &str, category: &str) -> Record {
    Record::new(date, time, category)
}

/// Parse every complete record from committed queue bytes.
///
/// Each line is parsed on its own. Blank lines are ignored and lines with
/// fewer than three fields are skipped with a warning.
pub(crate) fn parse_lines(bytes: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {
                tracing::warn!(row = index + 1, "Skipping malformed queue line");
            }
            Err(e) => {
                tracing::warn!(row = index + 1, error = %e, "Skipping unreadable queue line");
            }
        }
    }
    records
}

fn parse_line(line: &[u8]) -> csv::Result<Option<Record>> {
    // Lines written by `to_line` always have balanced quotes. An odd count
    // means a legacy line with a literal quote in the category.
    let balanced = line.iter().filter(|b| **b == b'"').count() % 2 == 0;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(balanced)
        .from_reader(line);

    match reader.records().next() {
        Some(fields) => Ok(Record::from_fields(&fields?)),
        None => Ok(None),
    }
}

/// Resolve user input to a known mood: either a 1-based button index or an
/// exact label.
pub fn resolve_mood<'a>(input: &str, moods: &'a [String]) -> Option<&'a str> {
    let input = input.trim();
    if let Ok(index) = input.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| moods.get(i)).map(String::as_str);
    }
    moods.iter().find(|m| m.as_str() == input).map(String::as_str)
}

fn single_line(value: String) -> String {
    if value.contains(['\n', '\r']) {
        value.replace(['\n', '\r'], " ")
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn moods() -> Vec<String> {
        DEFAULT_MOODS.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_query_string_escapes_mood_punctuation() {
        let record = encode("2024-01-01", "09:05:00", "Anxious X(");
        assert_eq!(
            record.to_query_string(),
            "date=2024-01-01&time=09%3A05%3A00&mood=Anxious%20X%28"
        );

        let record = encode("2024-01-01", "09:05:00", "Angry -_-^");
        assert!(record.to_query_string().ends_with("mood=Angry%20-_-%5E"));
    }

    #[test]
    fn test_query_string_escapes_reserved_characters() {
        let record = encode("2024-01-01", "09:00:00", "a&b=c?d#e/f+g");
        let query = record.to_query_string();
        let mood = query.split("mood=").nth(1).unwrap();
        for reserved in ['&', '=', '?', '#', '/', '+', ' '] {
            assert!(!mood.contains(reserved), "{reserved} leaked into {mood}");
        }
    }

    #[test]
    fn test_request_url_separator() {
        let record = encode("2024-01-01", "09:00:00", "Happy :D");
        assert!(record
            .request_url("https://example.com/exec")
            .starts_with("https://example.com/exec?date="));
        assert!(record
            .request_url("https://example.com/exec?key=1")
            .starts_with("https://example.com/exec?key=1&date="));
    }

    #[test]
    fn test_line_matches_legacy_format() {
        let record = encode("2024-01-01", "09:00:00", "Happy :D");
        assert_eq!(record.to_line().unwrap(), b"2024-01-01,09:00:00,Happy :D\n");
    }

    #[test]
    fn test_comma_in_category_is_quoted() {
        let record = encode("2024-01-01", "09:00:00", "Meh, fine");
        let line = record.to_line().unwrap();
        assert_eq!(line, b"2024-01-01,09:00:00,\"Meh, fine\"\n");
        assert_eq!(parse_lines(&line), vec![record]);
    }

    #[test]
    fn test_legacy_unquoted_comma_is_recovered() {
        let records = parse_lines(b"2024-01-01,09:00:00,Meh, fine\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category(), "Meh, fine");
    }

    #[test]
    fn test_legacy_unmatched_quote_stays_on_its_line() {
        let records = parse_lines(b"2024-01-01,09:00:00,\"Meh\n2024-01-01,09:05:00,Happy :D\n");
        assert_eq!(
            records,
            vec![
                encode("2024-01-01", "09:00:00", "\"Meh"),
                encode("2024-01-01", "09:05:00", "Happy :D"),
            ]
        );
    }

    #[test]
    fn test_parse_skips_blank_and_short_lines() {
        let records = parse_lines(b"2024-01-01,09:00:00,Happy :D\n\nbroken\n2024-01-02,10:00:00,Tired -_-\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].date(), "2024-01-02");
    }

    #[test]
    fn test_parse_accepts_crlf() {
        let records = parse_lines(b"0000-00-00,00:00:00,Peace :)\r\n");
        assert_eq!(records, vec![encode("0000-00-00", "00:00:00", "Peace :)")]);
    }

    #[test]
    fn test_line_breaks_are_folded() {
        let record = encode("2024-01-01", "09:00:00", "two\nlines");
        assert_eq!(record.category(), "two lines");
    }

    #[test]
    fn test_record_at_formats_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(8, 4, 9)
            .unwrap();
        let record = Record::at(ts, "Happy :D");
        assert_eq!(record.date(), "2024-03-07");
        assert_eq!(record.time(), "08:04:09");
    }

    #[test]
    fn test_resolve_mood() {
        let moods = moods();
        assert_eq!(resolve_mood("1", &moods), Some("Excited XD"));
        assert_eq!(resolve_mood("6", &moods), Some("Angry -_-^"));
        assert_eq!(resolve_mood("Happy :D", &moods), Some("Happy :D"));
        assert_eq!(resolve_mood("0", &moods), None);
        assert_eq!(resolve_mood("7", &moods), None);
        assert_eq!(resolve_mood("happy", &moods), None);
    }
}
