//! Strata server - line protocol ingestion over HTTP
//!
//! Architecture:
//! - Axum HTTP server accepts line protocol on `POST /write`
//! - Bodies are parsed into points by `strata-common`
//! - Points are appended, one row per field, to a local file
//! - [`server::Server`] supervises the listener and owns the storage handle

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod storage;

pub use config::{Config, ConfigError, StorageConfig};
pub use lifecycle::{ConnectionCounter, Lifecycle, ServerStatus};
pub use metrics::{Metrics, MetricsRecorder, NoopRecorder};
pub use server::{CancelHandle, Server, ShutdownContext};
pub use storage::{FileStorage, PointWriter, StorageError};
