//! Opaque identifier generation.
//!
//! Session and upload IDs are v4 UUIDs in canonical hyphenated form. The
//! janitor relies on that shape to recognize session-owned temp files, so
//! generated IDs must stay 36 characters with four hyphens.

use uuid::Uuid;

/// Fresh session ID.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fresh upload ID. Informational only: the `(sessionID, fileName)` pair is
/// the authoritative upload key.
pub fn new_upload_id() -> String {
    Uuid::new_v4().to_string()
}
