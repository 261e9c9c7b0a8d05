//! /download handler — streams a completed file out of the session catalog.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::{error_body, ApiError, ApiState};

pub async fn download_file(
    State(state): State<ApiState>,
    Path((session_id, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let meta = match state.sessions.get(&session_id) {
        Some(session) => session
            .state
            .read()
            .await
            .received_files
            .get(&file_name)
            .cloned(),
        None => None,
    };
    let Some(meta) = meta else {
        return Err(error_body(StatusCode::NOT_FOUND, "file not found"));
    };

    // The catalog can outrun the janitor by a beat; report a clean 404
    // rather than a broken stream.
    let file = File::open(&meta.backing_path)
        .await
        .map_err(|_| error_body(StatusCode::NOT_FOUND, "file not found"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename={file_name}")).map_err(|_| {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "invalid file name")
        })?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    tracing::info!(session_id, file = %file_name, size = meta.size, "streaming download");
    let stream = ReaderStream::new(file);
    Ok((headers, Body::from_stream(stream)).into_response())
}
