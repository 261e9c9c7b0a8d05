//! Positioned writes into pre-sized backing files.
//!
//! Every path that receives chunk data is guarded by a process-wide exclusive
//! lock, so the HTTP upload engine and the WebSocket streaming path can never
//! write the same file concurrently. The lock table is lazily populated and
//! keyed by the full path.

use dashmap::DashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("write stalled at {written}/{expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Process-wide mapping from path to exclusive write lock.
#[derive(Clone, Default)]
pub struct PathLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `path`, created on first use.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.entry(path.to_path_buf()).or_default().value().clone()
    }
}

/// Create the backing file at `path` with its full declared length. Chunk
/// writes afterwards never extend the file.
pub async fn allocate(locks: &PathLocks, path: &Path, size: u64) -> Result<(), DiskError> {
    let lock = locks.lock_for(path);
    let _guard = lock.lock().await;

    let file = File::create(path).await?;
    file.set_len(size).await?;
    file.sync_all().await?;
    Ok(())
}

/// Write `bytes` at `offset` in the already-allocated file at `path`,
/// then flush to durable storage. Errors are fatal for the chunk, not the
/// upload: the caller may retry the same chunk.
pub async fn write_chunk_at(
    locks: &PathLocks,
    path: &Path,
    bytes: &[u8],
    offset: u64,
) -> Result<(), DiskError> {
    let lock = locks.lock_for(path);
    let _guard = lock.lock().await;

    let mut file = OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut written = 0;
    while written < bytes.len() {
        let n = file.write(&bytes[written..]).await?;
        if n == 0 {
            return Err(DiskError::ShortWrite {
                expected: bytes.len(),
                written,
            });
        }
        written += n;
    }

    file.sync_all().await?;
    Ok(())
}
