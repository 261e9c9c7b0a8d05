//! /api/session handlers — session creation and history replay over HTTP.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use skiff_core::ids;

use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// "text" or "file"; only echoed back in the join URL.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Optional caller-chosen session ID.
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub url: String,
}

/// Hand out a session ID. The session itself materializes lazily on the
/// first WebSocket join or upload that references it.
pub async fn create_session(
    Json(req): Json<CreateSessionRequest>,
) -> Json<CreateSessionResponse> {
    let session_id = if req.session_id.is_empty() {
        ids::new_session_id()
    } else {
        req.session_id
    };
    let url = format!("{}/{}", req.kind, session_id);
    Json(CreateSessionResponse { session_id, url })
}

#[derive(Debug, Serialize)]
pub struct FileInfoBody {
    pub name: String,
    pub size: u64,
    #[serde(rename = "backingPath")]
    pub backing_path: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(rename = "textContent", skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(rename = "fileInfo", skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfoBody>,
}

/// Current text snapshot plus the most recently completed file, if any.
pub async fn session_history(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let session = state.sessions.get_or_create(&session_id);
    let s = session.state.read().await;
    Json(HistoryResponse {
        text_content: (!s.text_content.is_empty()).then(|| s.text_content.clone()),
        file_info: s.latest_file.as_ref().map(|meta| FileInfoBody {
            name: meta.name.clone(),
            size: meta.size,
            backing_path: meta.backing_path.display().to_string(),
        }),
    })
}
