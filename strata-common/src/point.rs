//! The in-memory form of one ingested sample.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a [`Point`] cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    #[error("missing measurement name")]
    MissingMeasurement,

    #[error("point has no fields")]
    NoFields,

    #[error("invalid tag key or value: {key}={value}")]
    InvalidTag { key: String, value: String },

    #[error("empty field name")]
    EmptyFieldName,
}

/// One measurement sample.
///
/// A `Point` always has a non-empty measurement and at least one field, and
/// none of its tags have an empty key or value. Tags and fields are kept in
/// key order so that serialization is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp_nanos: i64,
}

impl Point {
    /// Build a point, checking its invariants.
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, f64>,
        timestamp_nanos: i64,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::MissingMeasurement);
        }

        if let Some((key, value)) = tags.iter().find(|(k, v)| k.is_empty() || v.is_empty()) {
            return Err(PointError::InvalidTag {
                key: key.clone(),
                value: value.clone(),
            });
        }

        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        if fields.contains_key("") {
            return Err(PointError::EmptyFieldName);
        }

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp_nanos,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_nanos
    }

    /// The sample instant in UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    /// Tags rendered as `k=v` pairs joined by `,`; empty when there are none.
    pub fn tag_string(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Renders the point back into line protocol.
impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.measurement)?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", key, value)?;
        }

        let mut sep = ' ';
        for (key, value) in &self.fields {
            write!(f, "{}{}={}", sep, key, value)?;
            sep = ',';
        }

        write!(f, " {}", self.timestamp_nanos)
    }
}
