//! skiff-api — the HTTP surface and the WebSocket hub.

pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use skiff_core::SkiffConfig;
use skiff_services::{SessionStore, UploadEngine};

pub use handlers::ApiState;

/// Multipart framing overhead allowed on top of one chunk.
const CHUNK_BODY_SLACK: u64 = 1024 * 1024;

/// Build the application router around shared state.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let chunk_body_limit = (state.engine.chunk_size() + CHUNK_BODY_SLACK) as usize;

    Router::new()
        .route("/api/session", post(handlers::create_session))
        .route(
            "/api/session/{session_id}/history",
            get(handlers::session_history),
        )
        .route("/api/upload/start", post(handlers::upload_start))
        .route(
            "/api/upload/chunk",
            post(handlers::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route(
            "/api/upload/status/{session_id}/{file_name}",
            get(handlers::upload_status),
        )
        .route(
            "/api/upload/complete/{session_id}/{file_name}",
            post(handlers::upload_complete),
        )
        .route(
            "/download/{session_id}/{file_name}",
            get(handlers::download_file),
        )
        .route("/ws/{session_id}", get(ws::ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on the configured address until the listener dies.
pub async fn serve(
    listener: tokio::net::TcpListener,
    sessions: SessionStore,
    engine: Arc<UploadEngine>,
    config: Arc<SkiffConfig>,
) -> anyhow::Result<()> {
    let state = ApiState {
        sessions,
        engine,
        config,
    };
    let app = router(state);
    tracing::info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
