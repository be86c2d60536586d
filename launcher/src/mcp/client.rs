//! Minimal MCP client over the streamable HTTP transport.
//!
//! Speaks JSON-RPC 2.0 against a deployed server's `/mcp` endpoint: one
//! initialize handshake (capturing the `Mcp-Session-Id` header), then
//! per-operation requests whose responses may arrive either as plain JSON or
//! as a short SSE stream. Connections are opened per operation and closed
//! with a DELETE when the server handed out a session.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LauncherError;

const PROTOCOL_VERSION: &str = "2025-03-26";
const CLIENT_NAME: &str = "mcp-launcher-inspector";
const SESSION_HEADER: &str = "Mcp-Session-Id";
const MCP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icons: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpResourceSummary {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icons: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpResourceTemplateSummary {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icons: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpPromptSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icons: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Everything learned about a server in one pass. Listing failures land in
/// `errors` instead of sinking the sections that did answer.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpInspection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSummary>,
    pub tools: Vec<McpToolSummary>,
    pub resources: Vec<McpResourceSummary>,
    pub resource_templates: Vec<McpResourceTemplateSummary>,
    pub prompts: Vec<McpPromptSummary>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<PromptMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

struct McpClient {
    http: reqwest::Client,
    endpoint: url::Url,
    headers: header::HeaderMap,
    session_id: Option<String>,
    next_id: u64,
    server_name: Option<String>,
    server_version: Option<String>,
    capabilities: Option<serde_json::Value>,
    instructions: Option<String>,
}

impl McpClient {
    async fn connect(raw_url: &str, headers: &HashMap<String, String>) -> Result<Self, LauncherError> {
        let endpoint = url::Url::parse(raw_url)
            .map_err(|_| LauncherError::McpError("Invalid MCP endpoint URL".to_string()))?;
        let headers = sanitize_headers(headers)?;
        let http = reqwest::Client::builder().timeout(MCP_TIMEOUT).build()?;

        let mut client = Self {
            http,
            endpoint,
            headers,
            session_id: None,
            next_id: 0,
            server_name: None,
            server_version: None,
            capabilities: None,
            instructions: None,
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<(), LauncherError> {
        self.next_id += 1;
        let id = self.next_id;
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            },
        });

        let response = self.post_rpc(&body).await?;
        self.session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let envelope = decode_response(response, id).await?;
        let result = unwrap_rpc(envelope)?;
        self.server_name = result
            .pointer("/serverInfo/name")
            .and_then(|name| name.as_str())
            .map(str::to_string);
        self.server_version = result
            .pointer("/serverInfo/version")
            .and_then(|version| version.as_str())
            .map(str::to_string);
        self.capabilities = result.get("capabilities").cloned();
        self.instructions = result
            .get("instructions")
            .and_then(|instructions| instructions.as_str())
            .map(str::to_string);

        self.notify_initialized().await;
        Ok(())
    }

    // Completes the handshake. Servers answer 202 with no body; a failure
    // here is not worth aborting an inspection over.
    async fn notify_initialized(&self) {
        let body = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        if let Err(err) = self.post_rpc(&body).await {
            debug!("initialized notification failed: {}", err);
        }
    }

    fn server_summary(&self) -> ServerSummary {
        ServerSummary {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
            transport: "streamable-http".to_string(),
            capabilities: self.capabilities.clone(),
            instructions: self.instructions.clone(),
        }
    }

    async fn rpc_request(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LauncherError> {
        self.next_id += 1;
        let id = self.next_id;
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self.post_rpc(&body).await?;
        let envelope = decode_response(response, id).await?;
        unwrap_rpc(envelope)
    }

    async fn post_rpc(&self, body: &serde_json::Value) -> Result<reqwest::Response, LauncherError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LauncherError::McpError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }
        Ok(response)
    }

    async fn list_tools(&mut self) -> Result<Vec<McpToolSummary>, LauncherError> {
        let result = self.rpc_request("tools/list", serde_json::json!({})).await?;
        parse_listing(result, "tools")
    }

    async fn list_resources(&mut self) -> Result<Vec<McpResourceSummary>, LauncherError> {
        let result = self
            .rpc_request("resources/list", serde_json::json!({}))
            .await?;
        parse_listing(result, "resources")
    }

    async fn list_resource_templates(
        &mut self,
    ) -> Result<Vec<McpResourceTemplateSummary>, LauncherError> {
        let result = self
            .rpc_request("resources/templates/list", serde_json::json!({}))
            .await?;
        parse_listing(result, "resourceTemplates")
    }

    async fn list_prompts(&mut self) -> Result<Vec<McpPromptSummary>, LauncherError> {
        let result = self
            .rpc_request("prompts/list", serde_json::json!({}))
            .await?;
        parse_listing(result, "prompts")
    }

    async fn close(&self) {
        let Some(session) = &self.session_id else {
            return;
        };
        let request = self
            .http
            .delete(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session);
        if let Err(err) = request.send().await {
            debug!("MCP session close failed: {}", err);
        }
    }
}

/// Connect, enumerate everything the server offers, and disconnect.
pub async fn inspect_server(
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<McpInspection, LauncherError> {
    let mut client = McpClient::connect(url, headers).await?;
    let mut inspection = McpInspection {
        server: Some(client.server_summary()),
        ..McpInspection::default()
    };

    match client.list_tools().await {
        Ok(tools) => inspection.tools = tools,
        Err(err) => inspection
            .errors
            .push(format!("tools/list failed: {}", describe(&err))),
    }
    match client.list_resources().await {
        Ok(resources) => inspection.resources = resources,
        Err(err) => inspection
            .errors
            .push(format!("resources/list failed: {}", describe(&err))),
    }
    match client.list_resource_templates().await {
        Ok(templates) => inspection.resource_templates = templates,
        Err(err) => inspection
            .errors
            .push(format!("resources/templates failed: {}", describe(&err))),
    }
    match client.list_prompts().await {
        Ok(prompts) => inspection.prompts = prompts,
        Err(err) => inspection
            .errors
            .push(format!("prompts/list failed: {}", describe(&err))),
    }

    client.close().await;
    Ok(inspection)
}

/// Call one tool. Tool-level failures are reported in the result rather than
/// as an error; only connection problems surface as `Err`.
pub async fn invoke_tool(
    url: &str,
    headers: &HashMap<String, String>,
    tool_name: &str,
    args: &serde_json::Value,
) -> Result<ToolInvocation, LauncherError> {
    let mut client = McpClient::connect(url, headers).await?;
    let invocation = match client
        .rpc_request(
            "tools/call",
            serde_json::json!({"name": tool_name, "arguments": args}),
        )
        .await
    {
        Ok(result) => ToolInvocation {
            tool_name: tool_name.to_string(),
            success: true,
            content: result.get("content").cloned(),
            result: Some(result),
            error: None,
        },
        Err(err) => ToolInvocation {
            tool_name: tool_name.to_string(),
            success: false,
            result: None,
            content: None,
            error: Some(describe(&err)),
        },
    };
    client.close().await;
    Ok(invocation)
}

/// Read one resource, surfacing the first content block's text.
pub async fn read_resource(
    url: &str,
    headers: &HashMap<String, String>,
    uri: &str,
) -> Result<ResourceContents, LauncherError> {
    let mut client = McpClient::connect(url, headers).await?;
    let contents = match client
        .rpc_request("resources/read", serde_json::json!({"uri": uri}))
        .await
    {
        Ok(result) => {
            let first = result.get("contents").and_then(|contents| contents.get(0));
            ResourceContents {
                success: true,
                content: Some(
                    first
                        .and_then(|block| block.get("text"))
                        .and_then(|text| text.as_str())
                        .unwrap_or("")
                        .to_string(),
                ),
                mime_type: Some(
                    first
                        .and_then(|block| block.get("mimeType"))
                        .and_then(|mime| mime.as_str())
                        .unwrap_or("")
                        .to_string(),
                ),
                error: None,
            }
        }
        Err(err) => ResourceContents {
            success: false,
            content: None,
            mime_type: None,
            error: Some(describe(&err)),
        },
    };
    client.close().await;
    Ok(contents)
}

/// Evaluate a prompt template, flattening message content to text.
pub async fn get_prompt(
    url: &str,
    headers: &HashMap<String, String>,
    prompt_name: &str,
    args: Option<&serde_json::Value>,
) -> Result<PromptResponse, LauncherError> {
    let mut client = McpClient::connect(url, headers).await?;
    let arguments = args.cloned().unwrap_or_else(|| serde_json::json!({}));
    let response = match client
        .rpc_request(
            "prompts/get",
            serde_json::json!({"name": prompt_name, "arguments": arguments}),
        )
        .await
    {
        Ok(result) => {
            let messages = result
                .get("messages")
                .and_then(|messages| messages.as_array())
                .map(|items| items.iter().map(prompt_message).collect())
                .unwrap_or_default();
            PromptResponse {
                success: true,
                messages: Some(messages),
                description: result
                    .get("description")
                    .and_then(|description| description.as_str())
                    .map(str::to_string),
                error: None,
            }
        }
        Err(err) => PromptResponse {
            success: false,
            messages: None,
            description: None,
            error: Some(describe(&err)),
        },
    };
    client.close().await;
    Ok(response)
}

fn prompt_message(message: &serde_json::Value) -> PromptMessage {
    let role = message
        .get("role")
        .and_then(|role| role.as_str())
        .unwrap_or("")
        .to_string();
    let content = match message.get("content") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(content) => content
            .get("text")
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| content.to_string()),
        None => String::new(),
    };
    PromptMessage { role, content }
}

fn sanitize_headers(headers: &HashMap<String, String>) -> Result<header::HeaderMap, LauncherError> {
    let mut map = header::HeaderMap::new();
    for (key, value) in headers {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let name = header::HeaderName::try_from(key.as_str())
            .map_err(|_| LauncherError::McpError(format!("Invalid header name: {}", key)))?;
        let value = header::HeaderValue::try_from(value)
            .map_err(|_| LauncherError::McpError(format!("Invalid header value for {}", key)))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn decode_response(
    response: reqwest::Response,
    expect_id: u64,
) -> Result<serde_json::Value, LauncherError> {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = response.text().await?;
    decode_envelope(&content_type, &body, expect_id)
}

fn decode_envelope(
    content_type: &str,
    body: &str,
    expect_id: u64,
) -> Result<serde_json::Value, LauncherError> {
    if content_type.contains("text/event-stream") {
        for frame in sse_data_frames(body) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&frame) {
                if value.get("id").and_then(|id| id.as_u64()) == Some(expect_id) {
                    return Ok(value);
                }
            }
        }
        return Err(LauncherError::McpError(
            "No matching response in event stream".to_string(),
        ));
    }
    Ok(serde_json::from_str(body)?)
}

/// Collect `data:` payloads from an SSE body, joining multi-line data within
/// one event.
fn sse_data_frames(body: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut current = String::new();
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(data.trim_start());
        } else if line.is_empty() && !current.is_empty() {
            frames.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        frames.push(current);
    }
    frames
}

fn unwrap_rpc(envelope: serde_json::Value) -> Result<serde_json::Value, LauncherError> {
    if let Some(error) = envelope.get("error") {
        let message = error
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(LauncherError::McpError(message));
    }
    Ok(envelope
        .get("result")
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

fn parse_listing<T: serde::de::DeserializeOwned>(
    result: serde_json::Value,
    key: &str,
) -> Result<Vec<T>, LauncherError> {
    match result.get(key) {
        Some(items) => Ok(serde_json::from_value(items.clone())?),
        None => Ok(Vec::new()),
    }
}

fn describe(err: &LauncherError) -> String {
    match err {
        LauncherError::McpError(detail) => detail.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn invalid_endpoint_urls_are_rejected() {
        let err = inspect_server("not a url", &HashMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid MCP endpoint URL"));
    }

    #[test]
    fn header_sanitizing_trims_and_drops_empties() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "  Bearer tok  ".to_string());
        headers.insert("X-Empty".to_string(), "   ".to_string());

        let map = sanitize_headers(&headers).unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer tok");
        assert!(!map.contains_key("x-empty"));

        let mut bad = HashMap::new();
        bad.insert("bad header".to_string(), "v".to_string());
        assert!(sanitize_headers(&bad).is_err());
    }

    #[test]
    fn sse_bodies_yield_the_matching_response() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n",
            "\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n",
            "\n",
        );
        let envelope = decode_envelope("text/event-stream", body, 7).unwrap();
        assert_eq!(envelope["id"], 7);

        assert!(decode_envelope("text/event-stream", "event: ping\n\n", 7).is_err());
    }

    #[test]
    fn json_bodies_decode_directly() {
        let envelope = decode_envelope(
            "application/json",
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}",
            1,
        )
        .unwrap();
        assert_eq!(envelope["id"], 1);
    }

    #[test]
    fn rpc_errors_carry_the_server_message() {
        let err = unwrap_rpc(serde_json::json!({
            "jsonrpc": "2.0", "id": 2,
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap_err();
        assert_eq!(describe(&err), "method not found");

        let result = unwrap_rpc(serde_json::json!({"jsonrpc": "2.0", "id": 2, "result": {"ok": true}}))
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[test]
    fn tool_listings_deserialize_wire_shapes() {
        let tools: Vec<McpToolSummary> = parse_listing(
            serde_json::json!({
                "tools": [
                    {"name": "echo", "description": "Echo input", "inputSchema": {"type": "object"}},
                    {"name": "bare"}
                ]
            }),
            "tools",
        )
        .unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert!(tools[0].input_schema.is_some());
        assert!(tools[1].description.is_none());
    }

    #[test]
    fn prompt_messages_flatten_content() {
        let object = prompt_message(&serde_json::json!({
            "role": "user",
            "content": {"type": "text", "text": "hello"}
        }));
        assert_eq!(object.role, "user");
        assert_eq!(object.content, "hello");

        let plain = prompt_message(&serde_json::json!({"role": "assistant", "content": "raw"}));
        assert_eq!(plain.content, "raw");

        let missing = prompt_message(&serde_json::json!({"role": "user"}));
        assert_eq!(missing.content, "");
    }

    async fn fake_mcp(
        headers: axum::http::HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> axum::response::Response {
        let id = body.get("id").cloned().unwrap_or(serde_json::Value::Null);
        match body.get("method").and_then(|method| method.as_str()) {
            Some("initialize") => (
                [(SESSION_HEADER, "sess-123")],
                axum::Json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake-weather", "version": "0.2.0"},
                        "instructions": "Ask about the weather."
                    }
                })),
            )
                .into_response(),
            Some("notifications/initialized") => axum::http::StatusCode::ACCEPTED.into_response(),
            Some("tools/list") => {
                if headers
                    .get("mcp-session-id")
                    .and_then(|value| value.to_str().ok())
                    != Some("sess-123")
                {
                    return axum::Json(serde_json::json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": {"code": -32000, "message": "missing session"}
                    }))
                    .into_response();
                }
                let envelope = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"tools": [{"name": "get_forecast", "description": "Forecast", "inputSchema": {"type": "object"}}]}
                });
                (
                    [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                    format!("event: message\ndata: {}\n\n", envelope),
                )
                    .into_response()
            }
            Some("resources/list") => axum::Json(serde_json::json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32601, "message": "resources not supported"}
            }))
            .into_response(),
            Some("resources/templates/list") => axum::Json(serde_json::json!({
                "jsonrpc": "2.0", "id": id, "result": {"resourceTemplates": []}
            }))
            .into_response(),
            Some("prompts/list") => axum::Json(serde_json::json!({
                "jsonrpc": "2.0", "id": id, "result": {"prompts": []}
            }))
            .into_response(),
            Some("tools/call") => {
                let name = body.pointer("/params/name").and_then(|name| name.as_str());
                if name == Some("boom") {
                    axum::Json(serde_json::json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": {"code": -32000, "message": "tool exploded"}
                    }))
                    .into_response()
                } else {
                    axum::Json(serde_json::json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {"content": [{"type": "text", "text": "sunny"}]}
                    }))
                    .into_response()
                }
            }
            _ => axum::http::StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn start_fake_server() -> std::net::SocketAddr {
        let app = axum::Router::new().route(
            "/mcp",
            axum::routing::post(fake_mcp)
                .delete(|| async { axum::http::StatusCode::NO_CONTENT }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn inspects_a_live_streamable_http_server() {
        let addr = start_fake_server().await;
        let inspection = inspect_server(&format!("http://{}/mcp", addr), &HashMap::new())
            .await
            .unwrap();

        let server = inspection.server.unwrap();
        assert_eq!(server.name.as_deref(), Some("fake-weather"));
        assert_eq!(server.version.as_deref(), Some("0.2.0"));
        assert_eq!(server.transport, "streamable-http");
        assert_eq!(server.instructions.as_deref(), Some("Ask about the weather."));

        assert_eq!(inspection.tools.len(), 1);
        assert_eq!(inspection.tools[0].name, "get_forecast");
        assert!(inspection.resources.is_empty());
        assert!(inspection.prompts.is_empty());
        assert!(inspection
            .errors
            .iter()
            .any(|error| error.starts_with("resources/list failed:")));
    }

    #[tokio::test]
    async fn tool_invocations_report_success_and_failure() {
        let addr = start_fake_server().await;
        let url = format!("http://{}/mcp", addr);

        let ok = invoke_tool(&url, &HashMap::new(), "get_forecast", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.content.unwrap()[0]["text"], "sunny");

        let failed = invoke_tool(&url, &HashMap::new(), "boom", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("tool exploded"));
    }
}
