//! Resumable-upload manifests — the durable sidecar record of chunk state.
//!
//! One manifest per in-flight upload, stored next to the backing file as
//! `<sessionID>_<fileName>.json`. The manifest is the sole record that
//! survives a process restart; it is rewritten after every committed chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// State of a single fixed-offset slice of the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub index: u64,
    pub size: u64,
    /// MD5 of the chunk bytes, hex, set when the chunk commits.
    #[serde(default)]
    pub hash: String,
    pub completed: bool,
    pub offset: u64,
}

/// Persisted configuration and progress of one resumable upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadManifest {
    pub file_name: String,
    pub file_size: u64,
    /// Whole-file hash declared by the uploader. Empty string = none.
    #[serde(default)]
    pub file_hash: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
    /// Decimal-string chunk index → chunk state.
    pub chunks: BTreeMap<String, ChunkInfo>,
    pub backing_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),
    #[error("manifest corrupt at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UploadManifest {
    /// Build a fresh manifest with every chunk incomplete. The last chunk
    /// carries the remainder; all others are exactly `chunk_size`.
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        file_hash: impl Into<String>,
        chunk_size: u64,
        backing_path: impl Into<PathBuf>,
    ) -> Self {
        let total_chunks = file_size.div_ceil(chunk_size);
        let mut chunks = BTreeMap::new();
        for index in 0..total_chunks {
            let size = if index == total_chunks - 1 {
                file_size - index * chunk_size
            } else {
                chunk_size
            };
            chunks.insert(
                index.to_string(),
                ChunkInfo {
                    index,
                    size,
                    hash: String::new(),
                    completed: false,
                    offset: index * chunk_size,
                },
            );
        }

        let now = Utc::now();
        Self {
            file_name: file_name.into(),
            file_size,
            file_hash: file_hash.into(),
            chunk_size,
            total_chunks,
            chunks,
            backing_path: backing_path.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chunk(&self, index: u64) -> Option<&ChunkInfo> {
        self.chunks.get(&index.to_string())
    }

    /// Mark a chunk committed and bump `updated_at`.
    pub fn mark_completed(&mut self, index: u64, hash: String) {
        if let Some(chunk) = self.chunks.get_mut(&index.to_string()) {
            chunk.hash = hash;
            chunk.completed = true;
        }
        self.updated_at = Utc::now();
    }

    pub fn completed_count(&self) -> u64 {
        self.chunks.values().filter(|c| c.completed).count() as u64
    }

    /// Indices not yet committed, ascending.
    pub fn missing_chunks(&self) -> Vec<u64> {
        let mut missing: Vec<u64> = self
            .chunks
            .values()
            .filter(|c| !c.completed)
            .map(|c| c.index)
            .collect();
        missing.sort_unstable();
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.total_chunks
    }

    /// Completion percentage in [0, 100]. Zero chunks reports zero.
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.completed_count() as f64 / self.total_chunks as f64 * 100.0
    }
}

/// The sidecar path for a given backing file: `<backing>.json`.
pub fn sidecar_path(backing_path: &Path) -> PathBuf {
    let mut name = backing_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Serialize to pretty JSON and atomically replace the file at `path`.
/// Callers hold the upload's exclusive lock.
pub async fn save(path: &Path, manifest: &UploadManifest) -> Result<(), ManifestError> {
    let data = serde_json::to_vec_pretty(manifest).map_err(|source| ManifestError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
    }
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Read and deserialize the manifest at `path`.
pub async fn load(path: &Path) -> Result<UploadManifest, ManifestError> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ManifestError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&data).map_err(|source| ManifestError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}
