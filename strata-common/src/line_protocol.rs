//! Line protocol parser.
//!
//! Format: `measurement[,tag=value...] field=value[,field=value...] timestamp`
//!
//! Example: `cpu,host=server01,region=us-west value=0.64 1434055562000000000`
//!
//! Parsing is all-or-nothing: if any non-blank line is invalid, the whole
//! input is rejected and none of the points from earlier lines are returned.
//! Callers that want per-line tolerance must split the input themselves and
//! call [`parse_line`] on each line.

use std::collections::BTreeMap;
use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::point::{Point, PointError};

/// What went wrong on a single line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("invalid line format: expected 3 parts, got {0}")]
    LineFormat(usize),

    #[error("missing measurement name")]
    MissingMeasurement,

    #[error("malformed tag: {0}")]
    MalformedTag(String),

    #[error("invalid tag key or value: {0}")]
    InvalidTag(String),

    #[error("malformed field: {0}")]
    MalformedField(String),

    #[error("empty field name")]
    EmptyFieldName,

    #[error("invalid field value '{value}': {source}")]
    FieldValue {
        value: String,
        source: ParseFloatError,
    },

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        source: ParseIntError,
    },

    #[error(transparent)]
    Point(#[from] PointError),
}

/// A parse failure, with the 1-based line of the input it happened on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    line: usize,
    kind: ParseErrorKind,
}

impl ParseError {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

/// Parse a full request body into points, one per non-blank line.
pub fn parse(input: &str) -> Result<Vec<Point>, ParseError> {
    let mut points = Vec::new();

    for (idx, line) in input.split('\n').enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let point = parse_line(line).map_err(|kind| ParseError {
            line: idx + 1,
            kind,
        })?;
        points.push(point);
    }

    Ok(points)
}

/// Parse a single non-blank line.
pub fn parse_line(line: &str) -> Result<Point, ParseErrorKind> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(ParseErrorKind::LineFormat(parts.len()));
    }

    let (measurement, tags) = parse_measurement_tags(parts[0])?;
    let fields = parse_fields(parts[1])?;
    let timestamp = parts[2]
        .parse::<i64>()
        .map_err(|source| ParseErrorKind::Timestamp {
            value: parts[2].to_string(),
            source,
        })?;

    Ok(Point::new(measurement, tags, fields, timestamp)?)
}

fn parse_measurement_tags(s: &str) -> Result<(&str, BTreeMap<String, String>), ParseErrorKind> {
    let mut elements = s.split(',');

    let measurement = elements.next().unwrap_or_default();
    if measurement.is_empty() {
        return Err(ParseErrorKind::MissingMeasurement);
    }

    let mut tags = BTreeMap::new();
    for pair in elements {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ParseErrorKind::MalformedTag(pair.to_string()))?;

        if key.is_empty() || value.is_empty() {
            return Err(ParseErrorKind::InvalidTag(pair.to_string()));
        }

        tags.insert(key.to_string(), value.to_string());
    }

    Ok((measurement, tags))
}

fn parse_fields(s: &str) -> Result<BTreeMap<String, f64>, ParseErrorKind> {
    let mut fields = BTreeMap::new();

    for pair in s.split(',') {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| ParseErrorKind::MalformedField(pair.to_string()))?;

        if key.is_empty() {
            return Err(ParseErrorKind::EmptyFieldName);
        }

        // Integer values carry an `i` suffix; they are stored as floats.
        let numeric = raw.strip_suffix('i').unwrap_or(raw);
        let value = numeric
            .parse::<f64>()
            .map_err(|source| ParseErrorKind::FieldValue {
                value: raw.to_string(),
                source,
            })?;

        fields.insert(key.to_string(), value);
    }

    Ok(fields)
}
