//! Temp-storage janitor — the safety net for anything the request paths and
//! session teardown leave behind.
//!
//! Two cadences run independently on one task: a frequent sweep for orphans
//! (files whose session prefix maps to no live session) and a slow sweep for
//! files that outlived the age threshold regardless of ownership.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use uuid::Uuid;

use skiff_core::config::JanitorConfig;

use crate::session::SessionStore;

pub struct Janitor {
    sessions: SessionStore,
    temp_dir: PathBuf,
    config: JanitorConfig,
}

/// Extract the `<sessionID>_` prefix from a temp file name, accepting only
/// canonical 36-character UUIDs so unrelated files are never touched.
pub fn session_prefix(file_name: &str) -> Option<&str> {
    let (head, _) = file_name.split_once('_')?;
    if head.len() == 36 && Uuid::parse_str(head).is_ok() {
        Some(head)
    } else {
        None
    }
}

impl Janitor {
    pub fn new(sessions: SessionStore, config: JanitorConfig) -> Self {
        let temp_dir = sessions.temp_dir().to_path_buf();
        Self {
            sessions,
            temp_dir,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let orphan_every = self.config.orphan_sweep_interval();
        let age_every = self.config.age_sweep_interval();
        let mut orphan_tick = interval_at(Instant::now() + orphan_every, orphan_every);
        let mut age_tick = interval_at(Instant::now() + age_every, age_every);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("janitor shutting down");
                    return;
                }
                _ = orphan_tick.tick() => {
                    self.sweep_orphans().await;
                }
                _ = age_tick.tick() => {
                    self.sweep_aged(self.config.max_age()).await;
                }
            }
        }
    }

    /// Unlink session-shaped files whose session no longer exists.
    pub async fn sweep_orphans(&self) {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.temp_dir.display(), error = %e, "cannot read temp dir");
                return;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(session_id) = session_prefix(&name) else {
                continue;
            };
            if self.sessions.contains(session_id) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(file = %name, session_id, "removed orphaned file");
                }
                Err(e) => tracing::warn!(file = %name, error = %e, "failed to remove orphan"),
            }
        }
        if removed > 0 {
            tracing::info!(removed, "orphan sweep finished");
        }
    }

    /// Unlink files whose mtime is older than `max_age`, whoever owns them.
    pub async fn sweep_aged(&self, max_age: Duration) {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.temp_dir.display(), error = %e, "cannot read temp dir");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let expired = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::info!(file = %entry.file_name().to_string_lossy(), "removed aged file")
                }
                Err(e) => tracing::warn!(
                    file = %entry.file_name().to_string_lossy(),
                    error = %e,
                    "failed to remove aged file"
                ),
            }
        }
    }
}
