//! Flat row format of the backing file.
//!
//! One tab separated row per `(point, field)` pair:
//!
//! ```text
//! measurement \t tags \t field \t value \t timestamp
//! ```
//!
//! Parsed points never contain whitespace, so no escaping is needed.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use strata_common::Point;

/// A decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub measurement: String,
    pub tags: String,
    pub field: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Row {
    /// Decode a single row, without its trailing newline.
    pub fn parse(line: &str) -> Option<Row> {
        let mut cols = line.split('\t');
        let measurement = cols.next()?.to_string();
        let tags = cols.next()?.to_string();
        let field = cols.next()?.to_string();
        let value = cols.next()?.parse().ok()?;
        let timestamp = DateTime::parse_from_rfc3339(cols.next()?)
            .ok()?
            .with_timezone(&Utc);

        if cols.next().is_some() {
            return None;
        }

        Some(Row {
            measurement,
            tags,
            field,
            value,
            timestamp,
        })
    }
}

/// Encode every field of `point` as a row, newline terminated.
pub fn encode(point: &Point) -> String {
    let tags = point.tag_string();
    let timestamp = format_timestamp(&point.timestamp());

    let mut out = String::new();
    for (field, value) in point.fields() {
        out.push_str(point.measurement());
        out.push('\t');
        out.push_str(&tags);
        out.push('\t');
        out.push_str(field);
        out.push('\t');
        out.push_str(&format_value(*value));
        out.push('\t');
        out.push_str(&timestamp);
        out.push('\n');
    }
    out
}

/// Shortest decimal that round-trips. Exponent form only for magnitudes
/// of 1e21 and above or below 1e-6.
pub fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && (magnitude >= 1e21 || magnitude < 1e-6) {
        format!("{:e}", value)
    } else {
        value.to_string()
    }
}

/// RFC 3339 in UTC with nanosecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Read every row of a backing file.
pub async fn read_rows(path: impl AsRef<Path>) -> std::io::Result<Vec<Row>> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;

    contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            Row::parse(line).ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("corrupt row: {}", line),
                )
            })
        })
        .collect()
}
