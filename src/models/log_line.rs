use chrono::{DateTime, SecondsFormat, Utc};

/// Stands in for line breaks inside a record so each record stays on one physical line.
pub const LINE_SEPARATOR: char = '\u{2028}';

/// A single twtxt record: `<RFC3339 timestamp>\t<text>\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl LogLine {
    /// Builds a line, folding any line breaks in `text` into [`LINE_SEPARATOR`].
    pub fn new(timestamp: DateTime<Utc>, text: &str) -> Self {
        Self {
            timestamp,
            text: single_line(text),
        }
    }

    /// The exact bytes written to disk, trailing newline included.
    pub fn to_record(&self) -> String {
        format!(
            "{}\t{}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.text
        )
    }

    #[cfg(test)]
    pub fn parse(record: &str) -> Option<Self> {
        let record = record.strip_suffix('\n').unwrap_or(record);
        let (timestamp, text) = record.split_once('\t')?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?;
        Some(Self {
            timestamp: timestamp.with_timezone(&Utc),
            text: text.to_string(),
        })
    }
}

fn single_line(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    text.chars()
        .map(|c| match c {
            '\n' | '\r' => LINE_SEPARATOR,
            '\t' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_is_tab_separated_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let line = LogLine::new(ts, "**Hello**");
        assert_eq!(line.to_record(), "2023-01-01T00:00:00Z\t**Hello**\n");
    }

    #[test]
    fn line_breaks_and_tabs_never_leak_into_record() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let line = LogLine::new(ts, "a\r\nb\nc\td");
        assert_eq!(line.text, "a\u{2028}b\u{2028}c d");
        assert_eq!(line.to_record().matches('\n').count(), 1);
        assert_eq!(line.to_record().matches('\t').count(), 1);
    }

    #[test]
    fn parse_reads_back_a_record() {
        let line = LogLine::parse("2023-01-01T02:00:00+02:00\thi there\n").unwrap();
        assert_eq!(line.timestamp, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(line.text, "hi there");
        assert!(LogLine::parse("no tab here").is_none());
    }
}
