//! skiff integration test harness.
//!
//! Every test boots a real server on an ephemeral port with its own temp
//! directory, then drives it over plain HTTP (reqwest) and WebSocket
//! (tokio-tungstenite). Chunk size is shrunk so multi-chunk scenarios stay
//! small.

mod cleanup;
mod sessions;
mod ws_hub;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

// shared by the test modules via `use crate::*`
pub use serde_json::{json, Value};
pub use std::time::Duration;

use skiff_core::SkiffConfig;
use skiff_services::{PathLocks, SessionStore, UploadEngine};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const TEST_CHUNK_SIZE: u64 = 1024;

pub struct TestServer {
    pub base_url: String,
    pub ws_base: String,
    pub sessions: SessionStore,
    pub temp: TempDir,
}

pub async fn spawn_server() -> TestServer {
    let temp = TempDir::new().expect("create temp dir");
    let mut config = SkiffConfig::default();
    config.storage.temp_dir = temp.path().to_path_buf();
    config.storage.chunk_size = TEST_CHUNK_SIZE;
    config.storage.max_file_size = 64 * 1024 * 1024;
    let config = Arc::new(config);

    let sessions = SessionStore::new(temp.path());
    let engine = Arc::new(UploadEngine::new(
        sessions.clone(),
        PathLocks::new(),
        &config.storage,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(skiff_api::serve(listener, sessions.clone(), engine, config));

    TestServer {
        base_url: format!("http://{addr}"),
        ws_base: format!("ws://{addr}"),
        sessions,
        temp,
    }
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect_ws(server: &TestServer, session_id: &str) -> WsClient {
    let (stream, _) = connect_async(format!("{}/ws/{}", server.ws_base, session_id))
        .await
        .expect("ws connect");
    stream
}

/// Next text frame as JSON; panics after five seconds of silence.
pub async fn next_frame(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is JSON");
        }
    }
}

/// Skip frames until one of the wanted type arrives.
pub async fn frame_of_type(ws: &mut WsClient, wanted: &str) -> Value {
    for _ in 0..64 {
        let frame = next_frame(ws).await;
        if frame["type"] == wanted {
            return frame;
        }
    }
    panic!("no {wanted} frame arrived");
}

pub async fn send_frame(ws: &mut WsClient, frame: Value) {
    ws.send(Message::text(frame.to_string()))
        .await
        .expect("ws send");
}

// ── Upload helpers ────────────────────────────────────────────────────────────

pub async fn start_upload(
    client: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    file_name: &str,
    file_size: u64,
    file_hash: &str,
) -> Value {
    let resp = client
        .post(format!("{}/api/upload/start", server.base_url))
        .json(&json!({
            "sessionID": session_id,
            "fileName": file_name,
            "fileSize": file_size,
            "fileHash": file_hash,
        }))
        .send()
        .await
        .expect("start request");
    assert!(
        resp.status().is_success(),
        "upload start failed: {}",
        resp.status()
    );
    resp.json().await.expect("start response JSON")
}

pub async fn send_chunk(
    client: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    file_name: &str,
    index: u64,
    bytes: Vec<u8>,
) -> (reqwest::StatusCode, Value) {
    let form = reqwest::multipart::Form::new()
        .text("sessionID", session_id.to_string())
        .text("fileName", file_name.to_string())
        .text("chunkIndex", index.to_string())
        .text("uploadID", "test-upload".to_string())
        .part(
            "chunk",
            reqwest::multipart::Part::bytes(bytes).file_name("blob"),
        );
    let resp = client
        .post(format!("{}/api/upload/chunk", server.base_url))
        .multipart(form)
        .send()
        .await
        .expect("chunk request");
    let status = resp.status();
    let body = resp.json().await.expect("chunk response JSON");
    (status, body)
}

pub async fn upload_status(
    client: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    file_name: &str,
) -> (reqwest::StatusCode, Value) {
    let resp = client
        .get(format!(
            "{}/api/upload/status/{}/{}",
            server.base_url, session_id, file_name
        ))
        .send()
        .await
        .expect("status request");
    let status = resp.status();
    let body = resp.json().await.expect("status response JSON");
    (status, body)
}

pub async fn complete_upload(
    client: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    file_name: &str,
) -> (reqwest::StatusCode, Value) {
    let resp = client
        .post(format!(
            "{}/api/upload/complete/{}/{}",
            server.base_url, session_id, file_name
        ))
        .send()
        .await
        .expect("complete request");
    let status = resp.status();
    let body = resp.json().await.expect("complete response JSON");
    (status, body)
}

pub async fn download(
    client: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    file_name: &str,
) -> (reqwest::StatusCode, Vec<u8>) {
    let resp = client
        .get(format!(
            "{}/download/{}/{}",
            server.base_url, session_id, file_name
        ))
        .send()
        .await
        .expect("download request");
    let status = resp.status();
    let body = resp.bytes().await.expect("download body").to_vec();
    (status, body)
}

/// Deterministic test payload of the given length.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
