//! Durable point storage.
//!
//! [`PointWriter`] is the seam the HTTP layer writes through; [`FileStorage`]
//! is the append-only file implementation.

mod file;
mod rotate;
pub mod row;

use async_trait::async_trait;
use thiserror::Error;

use strata_common::Point;

pub use file::FileStorage;
pub use row::{read_rows, Row};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("storage is closed")]
    Closed,
}

impl From<StorageError> for strata_common::Error {
    fn from(err: StorageError) -> Self {
        strata_common::Error::storage(format!("storage write failed: {}", err)).with_source(err)
    }
}

/// Trait for persisting points to a backend
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Append one row per field of `point`. Returns once the rows are flushed.
    async fn write_point(&self, point: &Point) -> Result<(), StorageError>;

    /// Release the backend. Calling it again is a no-op.
    async fn close(&self) -> Result<(), StorageError>;
}
