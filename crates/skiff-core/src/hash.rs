//! Chunk and whole-file digests.
//!
//! Chunks are tagged with MD5 (cheap, per-chunk dedup record only). Whole-file
//! verification accepts MD5 or SHA-256 and tells them apart by the hex length
//! of the declared hash: 32 chars is MD5, 64 is SHA-256. The MD5 branch is a
//! compatibility affordance for old senders; current clients declare SHA-256.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUF_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("unsupported hash length {0} (expected 32 or 64 hex chars)")]
    UnsupportedLength(usize),
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    Mismatch { expected: String, actual: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Md5,
    Sha256,
}

impl HashAlgo {
    /// Pick the algorithm implied by a declared hex digest.
    pub fn for_hex_len(len: usize) -> Result<Self, HashError> {
        match len {
            32 => Ok(HashAlgo::Md5),
            64 => Ok(HashAlgo::Sha256),
            other => Err(HashError::UnsupportedLength(other)),
        }
    }
}

/// MD5 of an in-memory chunk, lowercase hex.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// SHA-256 of an in-memory buffer, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Recompute the digest of the file at `path` and compare it against
/// `expected` (case-insensitive hex). Streams the file; never loads it whole.
pub async fn verify_file_hash(path: &Path, expected: &str) -> Result<(), HashError> {
    let algo = HashAlgo::for_hex_len(expected.len())?;
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let actual = match algo {
        HashAlgo::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hex::encode(hasher.finalize())
        }
        HashAlgo::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hex::encode(hasher.finalize())
        }
    };

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(HashError::Mismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
