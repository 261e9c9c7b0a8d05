//! WebSocket frame schema — JSON text frames shared by all clients.
//!
//! Every frame carries `type`, `sessionID`, and `timestamp`; the remaining
//! fields depend on the type. Incoming binary payloads (`file`, `file_chunk`)
//! transport bytes as JSON number arrays, which is what browser senders
//! produce from a `Uint8Array`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One wire frame, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub kind: FrameKind,
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameKind {
    /// Full text snapshot, last writer wins.
    Text { content: String },
    /// A completed file: incoming as a single-shot byte array, outgoing as an
    /// availability notice pointing at the download route.
    File {
        name: String,
        #[serde(default)]
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(
            rename = "backingPath",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        backing_path: Option<String>,
    },
    /// One slice of a streamed large file.
    FileChunk {
        name: String,
        #[serde(default)]
        size: u64,
        data: Value,
        #[serde(rename = "totalChunks", default)]
        total_chunks: u64,
        #[serde(rename = "currentChunk", default)]
        current_chunk: u64,
        #[serde(rename = "isLastChunk", default)]
        is_last_chunk: bool,
    },
    /// Participant count, rebroadcast after every membership change.
    Clients { clients: usize },
    /// Server-originated notice to a single client.
    System { content: String },
}

/// What outgoing `file` frames say instead of carrying bytes.
pub const FILE_AVAILABLE_NOTICE: &str = "file stored on server; fetch via the download link";

impl Frame {
    pub fn new(kind: FrameKind, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn text(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            FrameKind::Text {
                content: content.into(),
            },
            session_id,
        )
    }

    /// Announce a completed file without its bytes.
    pub fn file_available(
        session_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        backing_path: impl Into<String>,
    ) -> Self {
        Self::new(
            FrameKind::File {
                name: name.into(),
                size,
                data: Some(Value::String(FILE_AVAILABLE_NOTICE.to_string())),
                backing_path: Some(backing_path.into()),
            },
            session_id,
        )
    }

    pub fn clients(session_id: impl Into<String>, clients: usize) -> Self {
        Self::new(FrameKind::Clients { clients }, session_id)
    }

    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            FrameKind::System {
                content: content.into(),
            },
            session_id,
        )
    }
}

/// Decode a JSON number-array payload into bytes. Non-numeric entries and
/// values outside 0..=255 are rejected.
pub fn data_bytes(value: &Value) -> Option<Vec<u8>> {
    let array = value.as_array()?;
    let mut bytes = Vec::with_capacity(array.len());
    for entry in array {
        let n = entry.as_u64()?;
        if n > u8::MAX as u64 {
            return None;
        }
        bytes.push(n as u8);
    }
    Some(bytes)
}
