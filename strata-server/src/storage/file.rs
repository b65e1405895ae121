//! Append-only file backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use strata_common::Point;

use super::{rotate, row, PointWriter, StorageError};
use crate::config::StorageConfig;

struct ActiveFile {
    file: File,
    size: u64,
}

impl ActiveFile {
    async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let size = file.metadata().await?.len();

        Ok(Self { file, size })
    }
}

/// File-based point writer.
///
/// Holds the only write handle to the backing file. Concurrent writers are
/// serialized by an async mutex, so the rows of one point are never
/// interleaved with rows of another.
pub struct FileStorage {
    config: StorageConfig,
    active: Mutex<Option<ActiveFile>>,
}

impl FileStorage {
    /// Open (creating if needed) the backing file.
    pub async fn open(config: StorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let active = ActiveFile::open(&config.path).await?;
        info!(
            "Opened storage file {} ({} bytes)",
            config.path.display(),
            active.size
        );

        Ok(Self {
            config,
            active: Mutex::new(Some(active)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Move the current file to the backup directory and start a new one.
    ///
    /// The old handle stays in `slot` until the new file is open. If the live
    /// file is already gone (an earlier rotation failed after the rename),
    /// only the new file is opened.
    async fn rotate(
        &self,
        slot: &mut Option<ActiveFile>,
    ) -> Result<Option<PathBuf>, StorageError> {
        if let Some(active) = slot.as_mut() {
            active.file.flush().await?;
        }

        let archived = if tokio::fs::try_exists(&self.config.path).await? {
            Some(rotate::archive(&self.config).await?)
        } else {
            warn!(
                "Storage file {} is missing, starting a new one",
                self.config.path.display()
            );
            None
        };

        let fresh = ActiveFile::open(&self.config.path).await?;
        *slot = Some(fresh);

        Ok(archived)
    }
}

#[async_trait]
impl PointWriter for FileStorage {
    async fn write_point(&self, point: &Point) -> Result<(), StorageError> {
        let rows = row::encode(point);
        let len = rows.len() as u64;

        let mut slot = self.active.lock().await;
        let current = slot.as_ref().ok_or(StorageError::Closed)?.size;

        if rotate::needed(self.config.max_file_size, current, len) {
            if let Some(archived) = self.rotate(&mut slot).await? {
                info!("Rotated storage file to {}", archived.display());
            }
        }

        let active = slot.as_mut().ok_or(StorageError::Closed)?;
        active.file.write_all(rows.as_bytes()).await?;
        active.file.flush().await?;
        active.size += len;

        debug!(
            "Wrote {} rows for {} to {}",
            point.fields().len(),
            point.measurement(),
            self.config.path.display()
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        let Some(mut active) = self.active.lock().await.take() else {
            debug!("Storage already closed");
            return Ok(());
        };

        if let Err(e) = active.file.sync_all().await {
            warn!("Failed to sync {}: {}", self.config.path.display(), e);
            return Err(e.into());
        }

        info!("Closed storage file {}", self.config.path.display());
        Ok(())
    }
}
