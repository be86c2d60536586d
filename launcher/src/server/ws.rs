//! The WebSocket endpoint behind the dashboard.
//!
//! One connection per browser tab. Inbound frames are `{event, data}` JSON
//! text messages dispatched to the operation handlers; everything a handler
//! emits flows back through a single writer task, so frames for one
//! connection are delivered in emit order. In-flight deployments are
//! cancelled when the connection goes away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::server::state::ServerState;

/// One inbound dashboard frame.
#[derive(Debug, Deserialize)]
struct Inbound {
    event: String,
    #[serde(default)]
    data: Value,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let connection_id = crate::utils::generate_uuid();
    info!("Client connected: {}", connection_id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound) = EventSink::channel();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unencodable outbound frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!("WebSocket receive error on {}: {}", connection_id, e);
                break;
            }
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
                Ok(inbound) => {
                    dispatch(inbound, Arc::clone(&state), sink.clone(), cancel.clone())
                }
                Err(e) => warn!("Ignoring malformed frame: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    cancel.cancel();
    drop(sink);
    writer.abort();
    info!("Client disconnected: {}", connection_id);
}

/// Route one inbound frame to its handler on a fresh task, so a running
/// deployment never blocks the read loop.
fn dispatch(inbound: Inbound, state: Arc<ServerState>, sink: EventSink, cancel: CancellationToken) {
    tokio::spawn(async move {
        let Inbound { event, data } = inbound;
        match event.as_str() {
            "get-system-info" => crate::server::handlers::system::get_system_info(&sink).await,
            "list-directory" => crate::server::handlers::system::list_directory(&sink, data).await,
            "get-global-config" => {
                crate::server::handlers::config::get_global_config(&state, &sink).await
            }
            "save-credentials" => {
                crate::server::handlers::config::save_credentials(&state, &sink, data).await
            }
            "create-server" => {
                crate::server::handlers::config::create_server(&state, &sink, data).await
            }
            "update-server" => {
                crate::server::handlers::config::update_server(&state, &sink, data).await
            }
            "delete-server" => {
                crate::server::handlers::config::delete_server(&state, &sink, data).await
            }
            "validate-field" => crate::server::handlers::config::validate_field(&sink, data).await,
            "deploy-server" => {
                crate::server::handlers::deploy::deploy_server(&state, &sink, data, &cancel).await
            }
            "check-prerequisites" => {
                crate::server::handlers::deploy::check_prerequisites(&sink).await
            }
            "verify-service" => {
                crate::server::handlers::gcp::verify_service(&state, &sink, data).await
            }
            "get-service-metrics" => {
                crate::server::handlers::gcp::get_service_metrics(&state, &sink, data).await
            }
            "get-service-logs" => {
                crate::server::handlers::gcp::get_service_logs(&state, &sink, data).await
            }
            "get-service-metadata" => {
                crate::server::handlers::gcp::get_service_metadata(&state, &sink, data).await
            }
            "health-check" => crate::server::handlers::gcp::health_check(&state, &sink, data).await,
            "inspect-mcp" => crate::server::handlers::mcp::inspect(&sink, data).await,
            "invoke-mcp-tool" => crate::server::handlers::mcp::invoke_tool(&sink, data).await,
            "read-mcp-resource" => crate::server::handlers::mcp::read_resource(&sink, data).await,
            "get-mcp-prompt" => crate::server::handlers::mcp::get_prompt(&sink, data).await,
            other => debug!("Ignoring unknown event: {}", other),
        }
    });
}
