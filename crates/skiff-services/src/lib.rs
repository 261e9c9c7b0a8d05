//! skiff-services — the coordination core behind the HTTP/WS surface:
//! session registry, per-path disk writer, resumable upload engine, and
//! the temp-storage janitor.

pub mod disk;
pub mod janitor;
pub mod session;
pub mod upload;

pub use disk::{DiskError, PathLocks};
pub use janitor::Janitor;
pub use session::{
    ClientHandle, ClientId, FileMeta, ReceivingFile, Session, SessionState, SessionStore,
    CLIENT_QUEUE_CAPACITY,
};
pub use upload::{
    ChunkReceipt, CompletionReceipt, StartReceipt, StatusReport, UploadEngine, UploadError,
};
