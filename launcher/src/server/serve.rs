//! HTTP server setup

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::LauncherError;
use crate::server::state::ServerState;

/// Shown when the launcher runs without bundled dashboard assets.
const PLACEHOLDER_PAGE: &str = "<!doctype html>\n<html>\n<head><title>MCP Launcher</title></head>\n<body>\n<h1>MCP Launcher</h1>\n<p>No dashboard assets were found. The WebSocket API is available at <code>/ws</code>.</p>\n</body>\n</html>\n";

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    version: String,
}

async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: crate::utils::version_info().version,
    })
}

async fn placeholder_handler() -> Html<&'static str> {
    Html(PLACEHOLDER_PAGE)
}

/// The dashboard router: the WebSocket endpoint, a status probe, and the
/// static frontend (or a placeholder page when no assets are bundled).
pub fn router(state: Arc<ServerState>, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/ws", get(crate::server::ws::ws_handler))
        .route("/api/status", get(status_handler));

    let app = match static_dir {
        Some(dir) if dir.is_dir() => app.fallback_service(ServeDir::new(dir)),
        _ => app.fallback(get(placeholder_handler)),
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), LauncherError>>, LauncherError> {
    let app = router(state, options.static_dir.as_deref());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting dashboard server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LauncherError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| LauncherError::ServerError(e.to_string()))
    });

    Ok(handle)
}
