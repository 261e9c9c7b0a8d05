//! Session registry — tracks live sessions, their clients, and their files.
//!
//! The registry itself is a `DashMap`; each session's mutable state sits
//! behind one `RwLock`. Lock order is registry → session, and large disk I/O
//! never happens while a session lock is held.

use dashmap::DashMap;
use skiff_core::frame::Frame;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound frames buffered per client before the connection is declared dead.
pub const CLIENT_QUEUE_CAPACITY: usize = 1024;

/// Files whose unlink fails during teardown get one more attempt after this.
const UNLINK_RETRY_DELAY: Duration = Duration::from_secs(5);

pub type ClientId = Uuid;

/// Sending half of one WebSocket client. The queue is bounded and never
/// blocked on: a full queue evicts the client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    sender: mpsc::Sender<String>,
}

impl ClientHandle {
    pub fn new(id: ClientId) -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(id, CLIENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Enqueue a pre-serialized frame. Returns false when the queue is full
    /// or the receiving task is gone.
    pub fn push_raw(&self, payload: String) -> bool {
        self.sender.try_send(payload).is_ok()
    }

    pub fn push_frame(&self, frame: &Frame) -> bool {
        match serde_json::to_string(frame) {
            Ok(payload) => self.push_raw(payload),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize frame");
                false
            }
        }
    }
}

/// Descriptor of a completed file in the session catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub backing_path: PathBuf,
}

/// In-flight receiver for the WebSocket `file_chunk` streaming path. The
/// backing file lives on disk under the shared per-path locks; only the
/// counters live here.
#[derive(Debug)]
pub struct ReceivingFile {
    pub name: String,
    pub declared_size: u64,
    pub total_chunks: u64,
    pub received_count: u64,
}

impl ReceivingFile {
    pub fn new(name: impl Into<String>, declared_size: u64, total_chunks: u64) -> Self {
        Self {
            name: name.into(),
            declared_size,
            total_chunks,
            received_count: 0,
        }
    }

    /// Chunks this transfer is expected to deliver. Legacy senders omit
    /// `totalChunks`; fall back to the declared size.
    pub fn expected_chunks(&self, chunk_size: u64) -> u64 {
        if self.total_chunks > 0 {
            self.total_chunks
        } else {
            self.declared_size.div_ceil(chunk_size)
        }
    }

    pub fn is_complete(&self, chunk_size: u64) -> bool {
        self.received_count > 0 && self.received_count == self.expected_chunks(chunk_size)
    }
}

/// Everything mutable about one session, guarded by the session's lock.
#[derive(Default)]
pub struct SessionState {
    clients: HashMap<ClientId, ClientHandle>,
    pub text_content: String,
    pub received_files: HashMap<String, FileMeta>,
    pub receiving: HashMap<String, ReceivingFile>,
    /// Most recently registered file, surfaced by the history endpoint.
    pub latest_file: Option<FileMeta>,
}

impl SessionState {
    pub fn add_client(&mut self, handle: ClientHandle) {
        self.clients.insert(handle.id(), handle);
    }

    pub fn remove_client(&mut self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Push a pre-serialized frame to every client. Clients whose queue is
    /// full (or whose writer task is gone) are evicted rather than waited on.
    pub fn broadcast_raw(&mut self, payload: &str) {
        let mut evicted = Vec::new();
        for (id, client) in &self.clients {
            if !client.push_raw(payload.to_string()) {
                evicted.push(*id);
            }
        }
        for id in evicted {
            self.clients.remove(&id);
            tracing::warn!(client = %id, "send queue full, evicting client");
        }
    }

    /// Serialize once, then fan out.
    pub fn broadcast(&mut self, frame: &Frame) {
        match serde_json::to_string(frame) {
            Ok(payload) => self.broadcast_raw(&payload),
            Err(e) => tracing::error!(error = %e, "failed to serialize broadcast frame"),
        }
    }

    pub fn broadcast_client_count(&mut self, session_id: &str) {
        let frame = Frame::clients(session_id, self.client_count());
        self.broadcast(&frame);
    }

    pub fn register_file(&mut self, meta: FileMeta) {
        self.latest_file = Some(meta.clone());
        self.received_files.insert(meta.name.clone(), meta);
    }
}

pub struct Session {
    pub id: String,
    pub state: RwLock<SessionState>,
}

/// The process-wide session table plus the temp directory it owns.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    temp_dir: PathBuf,
}

impl SessionStore {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Backing-file path for a session-owned file: `<temp>/<sessionID>_<name>`.
    pub fn backing_path(&self, session_id: &str, file_name: &str) -> PathBuf {
        self.temp_dir.join(format!("{session_id}_{file_name}"))
    }

    /// Look up a session, constructing an empty one if absent.
    pub fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Session {
                    id: session_id.to_string(),
                    state: RwLock::new(SessionState::default()),
                })
            })
            .value()
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Put a completed file into the session catalog without announcing it.
    pub async fn register_file(&self, session_id: &str, meta: FileMeta) {
        let session = self.get_or_create(session_id);
        let mut state = session.state.write().await;
        state.register_file(meta);
    }

    /// Register a completed file and broadcast its `file` frame to every
    /// member in one critical section, so a joining client either sees the
    /// file in its replay or receives this broadcast, never both or neither.
    pub async fn register_and_announce(&self, session_id: &str, meta: FileMeta) {
        let session = self.get_or_create(session_id);
        let mut state = session.state.write().await;
        let frame = Frame::file_available(
            session_id,
            &meta.name,
            meta.size,
            meta.backing_path.display().to_string(),
        );
        state.register_file(meta);
        state.broadcast(&frame);
    }

    /// Drop a client from its session. The remaining members get a fresh
    /// participant count; the last leaver triggers teardown of the session
    /// entry and every file it owns on disk.
    pub async fn remove_client(&self, session_id: &str, client_id: ClientId) {
        let Some(session) = self.get(session_id) else {
            return;
        };

        let last_leaver = {
            let mut state = session.state.write().await;
            if state.remove_client(client_id).is_none() {
                return;
            }
            let remaining = state.client_count();
            tracing::info!(session_id, remaining, "client disconnected");
            if remaining > 0 {
                state.broadcast_client_count(session_id);
                false
            } else {
                true
            }
        };

        if last_leaver {
            self.sessions.remove(session_id);
            self.teardown(session_id, &session).await;
        }
    }

    /// Reclaim every on-disk artifact owned by a dead session: receiving and
    /// received backing files, then a prefix sweep for stale manifests and
    /// uploads that never registered.
    async fn teardown(&self, session_id: &str, session: &Session) {
        let mut targets: Vec<PathBuf> = Vec::new();
        {
            let mut state = session.state.write().await;
            for name in state.receiving.keys() {
                targets.push(self.backing_path(session_id, name));
            }
            state.receiving.clear();
            for meta in state.received_files.values() {
                targets.push(meta.backing_path.clone());
            }
            state.received_files.clear();
            state.latest_file = None;
            state.text_content.clear();
        }

        let prefix = format!("{session_id}_");
        if let Ok(mut entries) = tokio::fs::read_dir(&self.temp_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    targets.push(entry.path());
                }
            }
        }
        targets.sort();
        targets.dedup();

        let mut failed = Vec::new();
        for path in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed session file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unlink failed");
                    failed.push(path);
                }
            }
        }
        tracing::info!(session_id, "session torn down");

        if !failed.is_empty() {
            tokio::spawn(async move {
                tokio::time::sleep(UNLINK_RETRY_DELAY).await;
                for path in failed {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => tracing::info!(path = %path.display(), "removed on retry"),
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "abandoning file")
                        }
                    }
                }
            });
        }
    }
}
