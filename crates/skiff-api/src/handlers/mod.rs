//! HTTP handlers — thin glue over the session registry and upload engine.

pub mod download;
pub mod session;
pub mod upload;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use skiff_core::SkiffConfig;
use skiff_services::{SessionStore, UploadEngine, UploadError};

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionStore,
    pub engine: Arc<UploadEngine>,
    pub config: Arc<SkiffConfig>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// JSON error body; `incompleteChunks` only appears on premature `complete`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "incompleteChunks", skip_serializing_if = "Option::is_none")]
    pub incomplete_chunks: Option<u64>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            incomplete_chunks: None,
        }),
    )
}

/// Map engine errors onto the wire contract: absent state is 404, client
/// mistakes are 400, everything transient is 500.
pub(crate) fn upload_error(e: UploadError) -> ApiError {
    match e {
        UploadError::NotFound { .. } => error_body(StatusCode::NOT_FOUND, e.to_string()),
        UploadError::OutOfRange { .. }
        | UploadError::SizeMismatch { .. }
        | UploadError::TooLarge { .. }
        | UploadError::IntegrityFailed(_) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        UploadError::Incomplete { missing } => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: e.to_string(),
                incomplete_chunks: Some(missing),
            }),
        ),
        UploadError::Manifest(_) | UploadError::Disk(_) | UploadError::Io(_) => {
            tracing::error!(error = %e, "upload operation failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Reduce a caller-supplied file name to something safe to embed in the
/// session's `<sessionID>_<name>` on-disk layout: no path separators, no
/// leading dots, nothing outside the plain filename character set.
pub(crate) fn sanitize_filename(raw: &str) -> String {
    // Everything up to the last separator (either flavor) is discarded.
    let base = match raw.rfind(['/', '\\']) {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    };

    let mut name = String::with_capacity(base.len());
    for c in base.chars() {
        match c {
            '.' | '-' | '_' => name.push(c),
            c if c.is_alphanumeric() => name.push(c),
            _ => name.push('-'),
        }
    }

    // Dot-only and dot-led names would hide the file or escape the layout.
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "unnamed".to_string()
    } else {
        name.to_string()
    }
}

// Re-export handler functions for use in router setup.
pub use download::download_file;
pub use session::{create_session, session_history};
pub use upload::{upload_chunk, upload_complete, upload_start, upload_status};
