//! /api/upload handlers — the resumable upload wire surface.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use skiff_services::{ChunkReceipt, StartReceipt, StatusReport};

use super::{error_body, sanitize_filename, upload_error, ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub struct UploadStartRequest {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    #[serde(rename = "fileHash", default)]
    pub file_hash: String,
}

pub async fn upload_start(
    State(state): State<ApiState>,
    Json(req): Json<UploadStartRequest>,
) -> Result<Json<StartReceipt>, ApiError> {
    if req.session_id.is_empty() || req.file_name.is_empty() {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "missing required parameters",
        ));
    }
    let file_name = sanitize_filename(&req.file_name);
    state
        .engine
        .start(&req.session_id, &file_name, req.file_size, &req.file_hash)
        .await
        .map(Json)
        .map_err(upload_error)
}

pub async fn upload_chunk(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkReceipt>, ApiError> {
    let mut session_id = None;
    let mut file_name = None;
    let mut chunk_index = None;
    let mut upload_id = None;
    let mut chunk = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "sessionID" => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?,
                )
            }
            "fileName" => {
                file_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?,
                )
            }
            "chunkIndex" => {
                chunk_index = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?,
                )
            }
            "uploadID" => {
                upload_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?,
                )
            }
            "chunk" => {
                chunk = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?,
                )
            }
            _ => {}
        }
    }

    let (Some(session_id), Some(file_name), Some(chunk_index), Some(_upload_id), Some(chunk)) =
        (session_id, file_name, chunk_index, upload_id, chunk)
    else {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "missing required parameters",
        ));
    };

    let chunk_index: u64 = chunk_index
        .parse()
        .map_err(|_| error_body(StatusCode::BAD_REQUEST, "invalid chunk index"))?;
    let file_name = sanitize_filename(&file_name);

    state
        .engine
        .chunk(&session_id, &file_name, chunk_index, &chunk)
        .await
        .map(Json)
        .map_err(upload_error)
}

pub async fn upload_status(
    State(state): State<ApiState>,
    Path((session_id, file_name)): Path<(String, String)>,
) -> Result<Json<StatusReport>, ApiError> {
    state
        .engine
        .status(&session_id, &sanitize_filename(&file_name))
        .await
        .map(Json)
        .map_err(upload_error)
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub message: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

pub async fn upload_complete(
    State(state): State<ApiState>,
    Path((session_id, file_name)): Path<(String, String)>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let receipt = state
        .engine
        .complete(&session_id, &sanitize_filename(&file_name))
        .await
        .map_err(upload_error)?;
    Ok(Json(CompleteResponse {
        message: "file upload complete".to_string(),
        file_name: receipt.file_name,
        file_size: receipt.file_size,
    }))
}
