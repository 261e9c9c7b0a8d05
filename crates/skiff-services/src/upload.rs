//! Resumable chunked upload engine.
//!
//! Lifecycle per `(sessionID, fileName)` pair: `start` allocates the manifest
//! and the pre-sized backing file, concurrent `chunk` calls commit slices
//! under the per-upload lock, and the call that completes the last missing
//! index registers the file into the session and broadcasts it before its
//! response is produced. `complete` is the client's fallback when that last
//! response was lost in transit.

use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

use skiff_core::config::StorageConfig;
use skiff_core::hash::{self, HashError};
use skiff_core::manifest::{self, ManifestError, UploadManifest};
use skiff_core::ids;

use crate::disk::{self, DiskError, PathLocks};
use crate::session::{FileMeta, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no upload in progress for {file_name}")]
    NotFound { file_name: String },
    #[error("chunk index {index} out of range")]
    OutOfRange { index: u64 },
    #[error("chunk size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("file size {size} exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("{missing} chunks are not yet uploaded")]
    Incomplete { missing: u64 },
    #[error("file integrity verification failed: {0}")]
    IntegrityFailed(#[source] HashError),
    #[error(transparent)]
    Manifest(ManifestError),
    #[error(transparent)]
    Disk(#[from] DiskError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ManifestError> for UploadError {
    fn from(e: ManifestError) -> Self {
        UploadError::Manifest(e)
    }
}

/// Map a manifest lookup failure to the upload-level `NotFound`.
fn manifest_not_found(e: ManifestError, file_name: &str) -> UploadError {
    match e {
        ManifestError::NotFound(_) => UploadError::NotFound {
            file_name: file_name.to_string(),
        },
        other => UploadError::Manifest(other),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReceipt {
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub missing_chunks: Vec<u64>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub chunk_index: u64,
    /// Whether the whole upload is now complete, not just this chunk.
    pub completed: bool,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub completed_chunks: u64,
    pub missing_chunks: Vec<u64>,
    pub progress: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    pub file_name: String,
    pub file_size: u64,
}

/// The engine is stateless between calls: all durable progress lives in the
/// manifest sidecars, which is what makes uploads survive a process restart.
#[derive(Clone)]
pub struct UploadEngine {
    sessions: SessionStore,
    locks: PathLocks,
    chunk_size: u64,
    max_file_size: u64,
}

impl UploadEngine {
    pub fn new(sessions: SessionStore, locks: PathLocks, storage: &StorageConfig) -> Self {
        Self {
            sessions,
            locks,
            chunk_size: storage.chunk_size,
            max_file_size: storage.max_file_size,
        }
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn paths(&self, session_id: &str, file_name: &str) -> (PathBuf, PathBuf) {
        let backing = self.sessions.backing_path(session_id, file_name);
        let sidecar = manifest::sidecar_path(&backing);
        (backing, sidecar)
    }

    /// Begin (or resume) a resumable upload.
    pub async fn start(
        &self,
        session_id: &str,
        file_name: &str,
        file_size: u64,
        file_hash: &str,
    ) -> Result<StartReceipt, UploadError> {
        if file_size > self.max_file_size {
            return Err(UploadError::TooLarge {
                size: file_size,
                limit: self.max_file_size,
            });
        }

        // A file that already completed short-circuits with one synthetic
        // chunk, so a page refresh does not re-upload anything.
        let session = self.sessions.get_or_create(session_id);
        {
            let state = session.state.read().await;
            if let Some(existing) = state.received_files.get(file_name) {
                info!(session_id, file_name, "upload already complete");
                return Ok(StartReceipt {
                    upload_id: session_id.to_string(),
                    chunk_size: existing.size,
                    total_chunks: 1,
                    missing_chunks: Vec::new(),
                    completed: true,
                });
            }
        }

        let (backing, sidecar) = self.paths(session_id, file_name);
        let lock = self.locks.lock_for(&sidecar);
        let _guard = lock.lock().await;

        // An open manifest with the same declared size resumes where it left
        // off; anything else is rebuilt from scratch.
        match manifest::load(&sidecar).await {
            Ok(existing) if existing.file_size == file_size => {
                info!(
                    session_id,
                    file_name,
                    completed = existing.completed_count(),
                    total = existing.total_chunks,
                    "resuming open upload"
                );
                return Ok(StartReceipt {
                    upload_id: ids::new_upload_id(),
                    chunk_size: existing.chunk_size,
                    total_chunks: existing.total_chunks,
                    missing_chunks: existing.missing_chunks(),
                    completed: existing.is_complete() && existing.total_chunks > 0,
                });
            }
            Ok(_) | Err(ManifestError::NotFound(_)) | Err(ManifestError::Corrupt { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let fresh = UploadManifest::new(file_name, file_size, file_hash, self.chunk_size, &backing);
        manifest::save(&sidecar, &fresh).await?;
        disk::allocate(&self.locks, &backing, file_size).await?;

        info!(
            session_id,
            file_name,
            file_size,
            total_chunks = fresh.total_chunks,
            "resumable upload started"
        );
        Ok(StartReceipt {
            upload_id: ids::new_upload_id(),
            chunk_size: self.chunk_size,
            total_chunks: fresh.total_chunks,
            missing_chunks: fresh.missing_chunks(),
            completed: false,
        })
    }

    /// Commit one chunk. Re-sending a committed chunk is a no-op success,
    /// except for the chunk that finishes the file: its retry re-runs the
    /// finishing steps below, so a response lost in transit or a failed
    /// integrity check resolves the same way on every attempt.
    pub async fn chunk(
        &self,
        session_id: &str,
        file_name: &str,
        chunk_index: u64,
        bytes: &[u8],
    ) -> Result<ChunkReceipt, UploadError> {
        let (backing, sidecar) = self.paths(session_id, file_name);

        let (receipt, finishing, declared_hash, file_size) = {
            let lock = self.locks.lock_for(&sidecar);
            let _guard = lock.lock().await;

            let mut m = manifest::load(&sidecar)
                .await
                .map_err(|e| manifest_not_found(e, file_name))?;

            let chunk = m
                .chunk(chunk_index)
                .cloned()
                .ok_or(UploadError::OutOfRange { index: chunk_index })?;

            if chunk.completed {
                if !m.is_complete() {
                    return Ok(ChunkReceipt {
                        chunk_index,
                        completed: false,
                        progress: m.progress(),
                    });
                }
                // Fully assembled, but the manifest alone cannot prove the
                // file made it into the catalog: the completing response may
                // have been lost, or verification may have failed. Fall
                // through to the finishing steps instead of trusting it.
                (
                    ChunkReceipt {
                        chunk_index,
                        completed: true,
                        progress: m.progress(),
                    },
                    true,
                    m.file_hash.clone(),
                    m.file_size,
                )
            } else {
                if bytes.len() as u64 != chunk.size {
                    return Err(UploadError::SizeMismatch {
                        expected: chunk.size,
                        actual: bytes.len() as u64,
                    });
                }

                let chunk_hash = hash::md5_hex(bytes);
                disk::write_chunk_at(&self.locks, &backing, bytes, chunk.offset).await?;

                m.mark_completed(chunk_index, chunk_hash);
                manifest::save(&sidecar, &m).await?;

                let finished = m.is_complete();
                (
                    ChunkReceipt {
                        chunk_index,
                        completed: finished,
                        progress: m.progress(),
                    },
                    finished,
                    m.file_hash.clone(),
                    m.file_size,
                )
            }
        };

        if finishing {
            let registered = match self.sessions.get(session_id) {
                Some(session) => {
                    let state = session.state.read().await;
                    state.received_files.contains_key(file_name)
                }
                None => false,
            };
            if !registered {
                // A declared whole-file hash gates registration: a corrupted
                // assembly must never enter the catalog. The manifest stays
                // behind on mismatch, so a retry of this chunk and the
                // follow-up `complete` both report the same error.
                if !declared_hash.is_empty() {
                    hash::verify_file_hash(&backing, &declared_hash)
                        .await
                        .map_err(|e| match e {
                            HashError::Io(io) => UploadError::Io(io),
                            other => UploadError::IntegrityFailed(other),
                        })?;
                }
                // Registration and the `file` broadcast must land before
                // this chunk's response so a client seeing `completed=true`
                // can rely on its peers having been notified. The per-upload
                // lock is already released; only the session lock is taken
                // here.
                self.sessions
                    .register_and_announce(
                        session_id,
                        FileMeta {
                            name: file_name.to_string(),
                            size: file_size,
                            backing_path: backing,
                        },
                    )
                    .await;
                self.discard_manifest(&sidecar).await;
                info!(session_id, file_name, file_size, "upload complete");
            }
        }

        Ok(receipt)
    }

    /// Pure read of upload progress.
    pub async fn status(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> Result<StatusReport, UploadError> {
        // A registered file wins over any leftover manifest.
        if let Some(session) = self.sessions.get(session_id) {
            let state = session.state.read().await;
            if let Some(meta) = state.received_files.get(file_name) {
                let total_chunks = meta.size.div_ceil(self.chunk_size);
                return Ok(StatusReport {
                    upload_id: session_id.to_string(),
                    file_name: meta.name.clone(),
                    file_size: meta.size,
                    chunk_size: self.chunk_size,
                    total_chunks,
                    completed_chunks: total_chunks,
                    missing_chunks: Vec::new(),
                    progress: 100.0,
                    completed: true,
                });
            }
        }

        let (_, sidecar) = self.paths(session_id, file_name);
        let m = manifest::load(&sidecar)
            .await
            .map_err(|e| manifest_not_found(e, file_name))?;

        let completed_chunks = m.completed_count();
        Ok(StatusReport {
            upload_id: session_id.to_string(),
            file_name: m.file_name.clone(),
            file_size: m.file_size,
            chunk_size: m.chunk_size,
            total_chunks: m.total_chunks,
            completed_chunks,
            missing_chunks: m.missing_chunks(),
            progress: m.progress(),
            completed: completed_chunks == m.total_chunks,
        })
    }

    /// Force finalization: verify, register, reclaim the manifest. Exists so
    /// the uploader can recover when the completing chunk's response was lost.
    pub async fn complete(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> Result<CompletionReceipt, UploadError> {
        let session = self.sessions.get_or_create(session_id);
        {
            let state = session.state.read().await;
            if let Some(meta) = state.received_files.get(file_name) {
                return Ok(CompletionReceipt {
                    file_name: meta.name.clone(),
                    file_size: meta.size,
                });
            }
        }

        let (backing, sidecar) = self.paths(session_id, file_name);
        let file_size = {
            let lock = self.locks.lock_for(&sidecar);
            let _guard = lock.lock().await;

            let m = manifest::load(&sidecar)
                .await
                .map_err(|e| manifest_not_found(e, file_name))?;

            let missing = m.total_chunks - m.completed_count();
            if missing > 0 {
                return Err(UploadError::Incomplete { missing });
            }

            if !m.file_hash.is_empty() {
                hash::verify_file_hash(&backing, &m.file_hash)
                    .await
                    .map_err(|e| match e {
                        HashError::Io(io) => UploadError::Io(io),
                        other => UploadError::IntegrityFailed(other),
                    })?;
            }
            m.file_size
        };

        self.sessions
            .register_file(
                session_id,
                FileMeta {
                    name: file_name.to_string(),
                    size: file_size,
                    backing_path: backing,
                },
            )
            .await;
        self.discard_manifest(&sidecar).await;
        info!(session_id, file_name, file_size, "upload finalized");

        Ok(CompletionReceipt {
            file_name: file_name.to_string(),
            file_size,
        })
    }

    /// Best-effort: a missing manifest after completion is not an error; the
    /// janitor reclaims anything left behind.
    async fn discard_manifest(&self, sidecar: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(sidecar).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %sidecar.display(), error = %e, "failed to remove manifest");
            }
        }
    }
}
