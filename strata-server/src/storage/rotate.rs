//! Size based rotation of the backing file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::StorageConfig;

/// Whether appending `incoming` bytes to a file of `current` bytes crosses
/// the limit. An empty file is never rotated, so oversized rows still land.
pub(super) fn needed(max_file_size: u64, current: u64, incoming: u64) -> bool {
    max_file_size > 0 && current > 0 && current.saturating_add(incoming) > max_file_size
}

/// Move the backing file into the backup directory, compressing it if
/// configured. Returns the final backup path.
pub(super) async fn archive(config: &StorageConfig) -> io::Result<PathBuf> {
    let dir = config.backup_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let target = dir.join(backup_name(&config.path, Utc::now()));
    tokio::fs::rename(&config.path, &target).await?;

    if config.compression {
        Ok(compress_or_keep(target).await)
    } else {
        Ok(target)
    }
}

/// The rename already happened, so a failed compression keeps the plain
/// backup instead of failing the rotation.
async fn compress_or_keep(target: PathBuf) -> PathBuf {
    match compress(&target).await {
        Ok(compressed) => compressed,
        Err(e) => {
            warn!(
                "Failed to compress backup {}, keeping it uncompressed: {}",
                target.display(),
                e
            );
            target
        }
    }
}

fn backup_name(path: &Path, now: DateTime<Utc>) -> OsString {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "points".to_string());

    let mut name = OsString::from(format!("{}-{}", stem, now.format("%Y%m%dT%H%M%S%.9fZ")));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

async fn compress(path: &Path) -> io::Result<PathBuf> {
    let data = tokio::fs::read(path).await?;
    let compressed = tokio::task::spawn_blocking(move || lz4_flex::compress_prepend_size(&data))
        .await
        .map_err(io::Error::other)?;

    let mut target = path.as_os_str().to_owned();
    target.push(".lz4");
    let target = PathBuf::from(target);

    if let Err(e) = tokio::fs::write(&target, compressed).await {
        let _ = tokio::fs::remove_file(&target).await;
        return Err(e);
    }
    tokio::fs::remove_file(path).await?;
    Ok(target)
}
