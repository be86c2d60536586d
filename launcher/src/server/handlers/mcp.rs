//! MCP inspector operations: capability listing, tool calls, resource
//! reads, and prompt retrieval against a deployed endpoint.
//!
//! Every response echoes the caller's `requestId` so the dashboard can
//! match answers to in-flight panels.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::events::EventSink;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InspectorPayload {
    url: String,
    headers: HashMap<String, String>,
    tool_name: String,
    uri: String,
    prompt_name: String,
    args: Option<Value>,
    request_id: Option<String>,
}

fn result_frame(request_id: &Option<String>, result: impl serde::Serialize) -> Value {
    serde_json::json!({ "requestId": request_id, "result": result })
}

fn error_frame(request_id: &Option<String>, message: String) -> Value {
    serde_json::json!({ "requestId": request_id, "message": message })
}

pub async fn inspect(sink: &EventSink, payload: Value) {
    let payload: InspectorPayload = serde_json::from_value(payload).unwrap_or_default();

    if payload.url.is_empty() {
        sink.emit(
            "mcp-inspection-error",
            error_frame(&payload.request_id, "MCP endpoint URL is required".to_string()),
        );
        return;
    }

    match crate::mcp::client::inspect_server(&payload.url, &payload.headers).await {
        Ok(result) => sink.emit(
            "mcp-inspection-result",
            result_frame(&payload.request_id, result),
        ),
        Err(e) => {
            warn!("MCP inspection of {} failed: {}", payload.url, e);
            sink.emit(
                "mcp-inspection-error",
                error_frame(&payload.request_id, e.to_string()),
            );
        }
    }
}

pub async fn invoke_tool(sink: &EventSink, payload: Value) {
    let payload: InspectorPayload = serde_json::from_value(payload).unwrap_or_default();

    if payload.url.is_empty() || payload.tool_name.is_empty() {
        sink.emit(
            "mcp-tool-invocation-error",
            error_frame(&payload.request_id, "URL and tool name are required".to_string()),
        );
        return;
    }

    let args = payload.args.clone().unwrap_or_else(|| serde_json::json!({}));
    match crate::mcp::client::invoke_tool(&payload.url, &payload.headers, &payload.tool_name, &args)
        .await
    {
        Ok(result) => sink.emit(
            "mcp-tool-invocation-result",
            result_frame(&payload.request_id, result),
        ),
        Err(e) => sink.emit(
            "mcp-tool-invocation-error",
            error_frame(&payload.request_id, e.to_string()),
        ),
    }
}

pub async fn read_resource(sink: &EventSink, payload: Value) {
    let payload: InspectorPayload = serde_json::from_value(payload).unwrap_or_default();

    if payload.url.is_empty() || payload.uri.is_empty() {
        sink.emit(
            "mcp-resource-read-error",
            error_frame(&payload.request_id, "URL and resource URI are required".to_string()),
        );
        return;
    }

    match crate::mcp::client::read_resource(&payload.url, &payload.headers, &payload.uri).await {
        Ok(result) => sink.emit(
            "mcp-resource-read-result",
            result_frame(&payload.request_id, result),
        ),
        Err(e) => sink.emit(
            "mcp-resource-read-error",
            error_frame(&payload.request_id, e.to_string()),
        ),
    }
}

pub async fn get_prompt(sink: &EventSink, payload: Value) {
    let payload: InspectorPayload = serde_json::from_value(payload).unwrap_or_default();

    if payload.url.is_empty() || payload.prompt_name.is_empty() {
        sink.emit(
            "mcp-prompt-error",
            error_frame(&payload.request_id, "URL and prompt name are required".to_string()),
        );
        return;
    }

    match crate::mcp::client::get_prompt(
        &payload.url,
        &payload.headers,
        &payload.prompt_name,
        payload.args.as_ref(),
    )
    .await
    {
        Ok(result) => sink.emit(
            "mcp-prompt-result",
            result_frame(&payload.request_id, result),
        ),
        Err(e) => sink.emit(
            "mcp-prompt-error",
            error_frame(&payload.request_id, e.to_string()),
        ),
    }
}
