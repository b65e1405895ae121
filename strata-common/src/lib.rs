//! Shared types for the Strata ingestion pipeline.
//!
//! This crate contains everything that does not touch I/O:
//! - [`Point`], the structured form of one measurement sample
//! - the line protocol parser that produces points from raw text
//! - the error taxonomy every layer reports failures through
//!
//! The server crate builds storage, HTTP and lifecycle management on top.

pub mod error;
pub mod line_protocol;
pub mod point;

pub use error::{Error, ErrorKind, Result};
pub use line_protocol::{parse, parse_line, ParseError, ParseErrorKind};
pub use point::{Point, PointError};
