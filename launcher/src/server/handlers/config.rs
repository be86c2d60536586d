//! Configuration operations: credentials, server records, field validation.

use serde::Deserialize;
use serde_json::Value;

use crate::config::types::{GlobalConfig, McpServer, ServerStatus};
use crate::events::EventSink;
use crate::server::state::ServerState;
use crate::utils::generate_uuid;

/// Push the whole config to the dashboard, bundled with the form field
/// definitions so the frontend never hardcodes them.
pub(crate) fn emit_config_update(sink: &EventSink, config: &GlobalConfig) {
    sink.emit(
        "global-config-update",
        serde_json::json!({
            "config": config,
            "fieldDefinitions": crate::config::fields::field_definitions(),
        }),
    );
}

pub async fn get_global_config(state: &ServerState, sink: &EventSink) {
    let config = state.store.load().await;
    emit_config_update(sink, &config);
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CredentialsPayload {
    google_project_id: Option<String>,
    anthropic_key: Option<String>,
}

/// Merge provided credentials into the stored config. A key absent from the
/// payload is left untouched; a key present always overwrites.
pub async fn save_credentials(state: &ServerState, sink: &EventSink, payload: Value) {
    let creds: CredentialsPayload = serde_json::from_value(payload).unwrap_or_default();

    let mut config = state.store.load().await;
    if let Some(project_id) = creds.google_project_id {
        config.credentials.google_project_id = Some(project_id);
    }
    if let Some(key) = creds.anthropic_key {
        config.credentials.anthropic_key = Some(key);
    }

    let has_project = config
        .credentials
        .google_project_id
        .as_deref()
        .is_some_and(|v| !v.is_empty());
    let has_key = config
        .credentials
        .anthropic_key
        .as_deref()
        .is_some_and(|v| !v.is_empty());
    if has_project && has_key {
        config.onboarding_completed = true;
    }

    match state.store.save(&config).await {
        Ok(()) => sink.emit("config-saved", serde_json::json!({ "success": true })),
        Err(e) => sink.emit(
            "config-saved",
            serde_json::json!({ "success": false, "error": e.to_string() }),
        ),
    }
    emit_config_update(sink, &config);
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateServerPayload {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    source_path: Option<String>,
    status: Option<ServerStatus>,
    deployed_url: Option<String>,
    last_deployed_at: Option<String>,
    cloud_run_service_name: Option<String>,
    cloud_run_region: Option<String>,
}

pub async fn create_server(state: &ServerState, sink: &EventSink, payload: Value) {
    let payload: CreateServerPayload = serde_json::from_value(payload).unwrap_or_default();

    let Some(source_path) = payload.source_path.filter(|p| !p.is_empty()) else {
        sink.emit(
            "server-error",
            serde_json::json!({ "message": "Source path is required" }),
        );
        return;
    };

    let server = McpServer {
        id: payload
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_uuid),
        name: payload
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled Server".to_string()),
        description: payload.description.unwrap_or_default(),
        source_path,
        status: payload.status.unwrap_or(ServerStatus::Draft),
        deployed_url: payload.deployed_url,
        last_deployed_at: payload.last_deployed_at,
        cloud_run_service_name: payload.cloud_run_service_name,
        cloud_run_region: payload.cloud_run_region,
    };

    match state.store.upsert_server(server.clone()).await {
        Ok(config) => {
            sink.emit("server-created", &server);
            emit_config_update(sink, &config);
        }
        Err(e) => sink.emit(
            "server-error",
            serde_json::json!({ "message": e.to_string() }),
        ),
    }
}

pub async fn update_server(state: &ServerState, sink: &EventSink, payload: Value) {
    let has_id = payload
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        sink.emit(
            "server-error",
            serde_json::json!({ "message": "Server ID is required for updates" }),
        );
        return;
    }

    let server: McpServer = match serde_json::from_value(payload) {
        Ok(server) => server,
        Err(e) => {
            sink.emit(
                "server-error",
                serde_json::json!({ "message": format!("Invalid server record: {}", e) }),
            );
            return;
        }
    };

    match state.store.upsert_server(server).await {
        Ok(config) => emit_config_update(sink, &config),
        Err(e) => sink.emit(
            "server-error",
            serde_json::json!({ "message": e.to_string() }),
        ),
    }
}

/// Delete a server record. The payload is the record id as a bare string.
pub async fn delete_server(state: &ServerState, sink: &EventSink, payload: Value) {
    let id = payload.as_str().unwrap_or_default();
    match state.store.remove_server(id).await {
        Ok(config) => emit_config_update(sink, &config),
        Err(e) => sink.emit(
            "server-error",
            serde_json::json!({ "message": e.to_string() }),
        ),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidateFieldPayload {
    field: String,
    value: String,
}

pub async fn validate_field(sink: &EventSink, payload: Value) {
    let payload: ValidateFieldPayload = serde_json::from_value(payload).unwrap_or_default();
    let result = crate::config::fields::validate_field(&payload.field, &payload.value).await;

    let mut body = serde_json::json!({ "field": payload.field, "valid": result.valid });
    if let Some(message) = result.message {
        body["message"] = Value::String(message);
    }
    sink.emit("field-validated", body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CliAuditAgent;
    use crate::config::store::ConfigStore;
    use crate::events::Outbound;
    use crate::pipeline::orchestrator::PipelineCommands;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn state(dir: &std::path::Path) -> ServerState {
        ServerState::new(
            ConfigStore::at(dir),
            Arc::new(CliAuditAgent::default()),
            PipelineCommands::default(),
        )
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_get_global_config_bundles_field_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        get_global_config(&state, &sink).await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "global-config-update");
        assert!(frames[0].data["config"]["servers"].is_array());
        assert!(frames[0].data["fieldDefinitions"]["googleProjectId"].is_object());
    }

    #[tokio::test]
    async fn test_save_credentials_completes_onboarding_when_both_present() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        save_credentials(
            &state,
            &sink,
            serde_json::json!({ "googleProjectId": "proj-1", "anthropicKey": "sk-ant-x" }),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "config-saved");
        assert_eq!(frames[0].data["success"], true);
        assert_eq!(frames[1].event, "global-config-update");
        assert_eq!(frames[1].data["config"]["onboardingCompleted"], true);

        let reloaded = state.store.load().await;
        assert!(reloaded.onboarding_completed);
    }

    #[tokio::test]
    async fn test_save_credentials_keeps_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        save_credentials(&state, &sink, serde_json::json!({ "anthropicKey": "sk-ant-x" })).await;
        drain(&mut rx);
        save_credentials(&state, &sink, serde_json::json!({ "googleProjectId": "proj-1" })).await;

        let config = state.store.load().await;
        assert_eq!(config.credentials.anthropic_key.as_deref(), Some("sk-ant-x"));
        assert_eq!(config.credentials.google_project_id.as_deref(), Some("proj-1"));
        assert!(config.onboarding_completed);
    }

    #[tokio::test]
    async fn test_create_server_requires_source_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        create_server(&state, &sink, serde_json::json!({ "name": "No Path" })).await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "server-error");
        assert_eq!(frames[0].data["message"], "Source path is required");
        assert!(state.store.load().await.servers.is_empty());
    }

    #[tokio::test]
    async fn test_create_server_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        create_server(&state, &sink, serde_json::json!({ "sourcePath": "/srv/app" })).await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "server-created");
        assert_eq!(frames[0].data["name"], "Untitled Server");
        assert_eq!(frames[0].data["status"], "draft");
        assert!(!frames[0].data["id"].as_str().unwrap().is_empty());
        assert_eq!(frames[1].event, "global-config-update");
    }

    #[tokio::test]
    async fn test_update_server_requires_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        update_server(
            &state,
            &sink,
            serde_json::json!({ "name": "X", "sourcePath": "/srv" }),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "server-error");
        assert_eq!(frames[0].data["message"], "Server ID is required for updates");
    }

    #[tokio::test]
    async fn test_update_then_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let (sink, mut rx) = EventSink::channel();

        create_server(
            &state,
            &sink,
            serde_json::json!({ "id": "srv-1", "name": "One", "sourcePath": "/srv" }),
        )
        .await;
        drain(&mut rx);

        update_server(
            &state,
            &sink,
            serde_json::json!({ "id": "srv-1", "name": "Renamed", "sourcePath": "/srv" }),
        )
        .await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "global-config-update");
        assert_eq!(frames[0].data["config"]["servers"][0]["name"], "Renamed");

        delete_server(&state, &sink, serde_json::json!("srv-1")).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "global-config-update");
        assert!(frames[0].data["config"]["servers"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_field_reports_field_name() {
        let (sink, mut rx) = EventSink::channel();

        validate_field(
            &sink,
            serde_json::json!({ "field": "googleProjectId", "value": "Bad Project" }),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "field-validated");
        assert_eq!(frames[0].data["field"], "googleProjectId");
        assert_eq!(frames[0].data["valid"], false);
        assert!(frames[0].data["message"].is_string());
    }

    #[tokio::test]
    async fn test_validate_field_omits_message_when_clean() {
        let (sink, mut rx) = EventSink::channel();

        validate_field(
            &sink,
            serde_json::json!({ "field": "googleProjectId", "value": "my-project-123" }),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].data["valid"], true);
        assert!(frames[0].data.get("message").is_none());
    }
}
