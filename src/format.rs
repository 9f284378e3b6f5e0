use crate::record::{ErrorReport, LogRecord};
use crate::resource::ResourceSnapshotProvider;
use crate::size::format_size;
use chrono::Utc;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Renders records as `<S><MMDD> <HHMMSS>.<mmm> [<peak rss>] <message>`.
///
/// Lines carrying an error get one continuation line per line of the
/// error's text, each starting with the same prefix followed by `... `.
#[derive(Clone)]
pub struct LineFormatter {
    resources: Arc<dyn ResourceSnapshotProvider>,
}

impl LineFormatter {
    pub fn new(resources: Arc<dyn ResourceSnapshotProvider>) -> Self {
        Self { resources }
    }

    /// Render a record using the current peak RSS of the process.
    pub fn render(&self, record: &LogRecord) -> String {
        render_with_rss(record, self.resources.peak_rss_bytes())
    }
}

/// `I0305 070809.125 [2M] `: severity letter, UTC time, peak RSS.
pub fn prefix(record: &LogRecord, peak_rss_bytes: u64) -> String {
    let level = record.level.as_str();
    format!(
        "{}{}.{:03} [{}] ",
        &level[..1],
        record.timestamp.format("%m%d %H%M%S"),
        record.timestamp.timestamp_subsec_millis() % 1000,
        format_size(peak_rss_bytes),
    )
}

/// Render a record with a known peak RSS. No trailing newline.
pub fn render_with_rss(record: &LogRecord, peak_rss_bytes: u64) -> String {
    let prefix = prefix(record, peak_rss_bytes);

    let mut first = format!("{}{}", prefix, record.message);
    for (name, value) in &record.fields {
        first.push_str(&format!(" {}={}", name, value));
    }

    let mut lines = vec![first];
    if let Some(error) = &record.error {
        lines.extend(error.lines().into_iter().map(|l| format!("{}... {}", prefix, l)));
    }
    lines.join("\n")
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut record = LogRecord::new(Utc::now(), *event.metadata().level(), String::new());
        let mut visitor = FieldVisitor { record: &mut record };
        event.record(&mut visitor);

        writeln!(writer, "{}", self.render(&record))
    }
}

/// Collects an event's fields into a [`LogRecord`].
pub struct FieldVisitor<'a> {
    pub record: &'a mut LogRecord,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.record.message = value.to_string();
        } else {
            self.record.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn Error + 'static)) {
        self.record.error = Some(ErrorReport::from_dyn(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.record.message = format!("{:?}", value);
        } else {
            self.record.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing::Level;

    fn at_0305() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
            + chrono::Duration::milliseconds(125)
    }

    #[test]
    fn first_line_layout() {
        let record = LogRecord::new(at_0305(), Level::INFO, "logging to x.log");
        assert_eq!(
            render_with_rss(&record, 2 * 1024 * 1024),
            "I0305 070809.125 [2M] logging to x.log"
        );
    }

    #[test]
    fn millis_are_zero_padded() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(7);
        let record = LogRecord::new(ts, Level::WARN, "w");
        assert_eq!(prefix(&record, 0), "W1231 235959.007 [0] ");
    }

    #[test]
    fn severity_letters() {
        for (level, letter) in [
            (Level::ERROR, "E"),
            (Level::WARN, "W"),
            (Level::INFO, "I"),
            (Level::DEBUG, "D"),
            (Level::TRACE, "T"),
        ] {
            let record = LogRecord::new(at_0305(), level, "");
            assert!(prefix(&record, 0).starts_with(letter));
        }
    }

    #[test]
    fn error_lines_share_the_prefix() {
        let error = ErrorReport::new("ValueError", "bad input").with_frame("file.ext", 10, Some("run"));
        let record = LogRecord::new(at_0305(), Level::ERROR, "job failed").with_error(error);
        let rendered = render_with_rss(&record, 4096);
        let lines: Vec<&str> = rendered.lines().collect();

        let expected = "E0305 070809.125 [4K] ";
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with(expected)));
        assert_eq!(lines[1], format!("{}... ValueError: bad input", expected));
        assert_eq!(lines[2], format!("{}...   file.ext:10 in run", expected));
        assert!(!rendered.ends_with('\n'));
    }

    #[test]
    fn fields_follow_the_message() {
        let mut record = LogRecord::new(at_0305(), Level::INFO, "loaded");
        record.fields.push(("rows".into(), "12".into()));
        assert_eq!(render_with_rss(&record, 10), "I0305 070809.125 [10] loaded rows=12");
    }
}
