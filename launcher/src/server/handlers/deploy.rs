//! Deployment operations: the audit/build/deploy pipeline and the
//! prerequisite probe behind the onboarding checklist.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::types::{McpServer, ServerStatus};
use crate::events::EventSink;
use crate::pipeline::orchestrator::{run_pipeline, AuditStage, DeployTarget, PipelineError};
use crate::server::handlers::config::emit_config_update;
use crate::server::state::ServerState;

const DEFAULT_SERVICE_NAME: &str = "mcp-server";
const DEFAULT_REGION: &str = "us-central1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeployPayload {
    server_id: String,
    deploy_only: bool,
}

fn deploy_error(sink: &EventSink, message: impl Into<String>) {
    sink.emit(
        "deploy-error",
        serde_json::json!({ "message": message.into() }),
    );
}

/// Run the full deployment for one server record, streaming progress to the
/// dashboard. One deployment per record at a time; a second request while
/// one is running is rejected.
pub async fn deploy_server(
    state: &Arc<ServerState>,
    sink: &EventSink,
    payload: Value,
    cancel: &CancellationToken,
) {
    let payload: DeployPayload = serde_json::from_value(payload).unwrap_or_default();

    let config = state.store.load().await;
    let Some(server) = config.find_server(&payload.server_id) else {
        deploy_error(sink, "Server not found");
        return;
    };
    let mut server = server.clone();

    let Some(project_id) = config
        .credentials
        .google_project_id
        .clone()
        .filter(|id| !id.is_empty())
    else {
        deploy_error(sink, "Missing Global Project ID");
        return;
    };

    let Some(_guard) = state.begin_deploy(&server.id) else {
        deploy_error(sink, "A deployment is already in progress for this server");
        return;
    };

    server.status = ServerStatus::Deploying;
    match state.store.upsert_server(server.clone()).await {
        Ok(updated) => emit_config_update(sink, &updated),
        Err(e) => warn!("Failed to record deploying status: {}", e),
    }

    info!("Deploy started for {} ({})", server.name, server.id);
    sink.info(format!("Starting deployment for {}...", server.name));

    let audit = if payload.deploy_only {
        sink.info("Deploy Only mode: Skipping agent audit...");
        None
    } else {
        let Some(key) = config
            .credentials
            .anthropic_key
            .clone()
            .filter(|k| !k.is_empty())
        else {
            deploy_error(sink, "Missing API Key (required for audit mode)");
            mark_unhealthy(state, &mut server).await;
            return;
        };
        Some(AuditStage {
            agent: Arc::clone(&state.agent),
            credential: key,
        })
    };

    let service_name = resolve_service_name(&server);
    let region = server
        .cloud_run_region
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let target = DeployTarget {
        project_id: project_id.clone(),
        source_dir: PathBuf::from(&server.source_path),
        service_name: service_name.clone(),
        region: region.clone(),
    };

    match run_pipeline(&target, &state.commands, audit.as_ref(), sink, cancel).await {
        Ok(url) => {
            finalize_success(state, sink, &mut server, &url, &service_name, &region).await;
        }
        Err(PipelineError::AmbiguousSuccess) => {
            // The deploy tool reported success without printing a URL; the
            // control plane still knows it.
            sink.warn("Deploy finished without a Service URL; querying Cloud Run...");
            let verification =
                crate::gcp::service::verify_service(&state.gcp, &project_id, &service_name, &region)
                    .await;
            match verification.url {
                Some(url) if verification.ready => {
                    finalize_success(state, sink, &mut server, &url, &service_name, &region).await;
                }
                _ => {
                    deploy_error(sink, PipelineError::AmbiguousSuccess.to_string());
                    mark_unhealthy(state, &mut server).await;
                }
            }
        }
        Err(e) => {
            deploy_error(sink, e.to_string());
            mark_unhealthy(state, &mut server).await;
        }
    }
}

pub async fn check_prerequisites(sink: &EventSink) {
    let report = crate::pipeline::prereqs::check_prerequisites().await;
    sink.emit("prerequisites-checked", report);
}

/// Explicit service name from the record, else a slug of its display name,
/// else a generic fallback.
fn resolve_service_name(server: &McpServer) -> String {
    if let Some(name) = server
        .cloud_run_service_name
        .clone()
        .filter(|n| !n.is_empty())
    {
        return name;
    }
    let slug = crate::utils::service_slug(&server.name);
    if slug.is_empty() {
        DEFAULT_SERVICE_NAME.to_string()
    } else {
        slug
    }
}

async fn finalize_success(
    state: &Arc<ServerState>,
    sink: &EventSink,
    server: &mut McpServer,
    url: &str,
    service_name: &str,
    region: &str,
) {
    let final_url = format!("{}/mcp", url);

    server.status = ServerStatus::Healthy;
    server.deployed_url = Some(final_url.clone());
    server.last_deployed_at = Some(crate::utils::iso_now());
    server.cloud_run_service_name = Some(service_name.to_string());
    server.cloud_run_region = Some(region.to_string());

    match state.store.upsert_server(server.clone()).await {
        Ok(updated) => emit_config_update(sink, &updated),
        Err(e) => sink.error(format!("Failed to persist deployment result: {}", e)),
    }

    sink.info("─".repeat(50));
    sink.success("Deployment completed successfully!");
    sink.success(format!("Service URL: {}", url));
    sink.success(format!("SSE Endpoint: {}", final_url));
    sink.emit("deploy-complete", serde_json::json!({ "url": final_url }));
}

/// Record a failed deployment. The dashboard already saw the deploy-error;
/// no config push here, matching the event flow the frontend expects.
async fn mark_unhealthy(state: &Arc<ServerState>, server: &mut McpServer) {
    server.status = ServerStatus::Unhealthy;
    if let Err(e) = state.store.upsert_server(server.clone()).await {
        warn!("Failed to record failed deploy for {}: {}", server.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CliAuditAgent;
    use crate::config::store::ConfigStore;
    use crate::events::Outbound;
    use crate::pipeline::orchestrator::PipelineCommands;
    use crate::pipeline::process::CommandSpec;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn stub_commands(deploy_script: &str) -> PipelineCommands {
        PipelineCommands {
            setup: CommandSpec::new("sh", &["-c", "true"]),
            deploy: CommandSpec::new("sh", &["-c", deploy_script]),
        }
    }

    fn state_with(dir: &std::path::Path, commands: PipelineCommands) -> Arc<ServerState> {
        Arc::new(ServerState::new(
            ConfigStore::at(dir),
            Arc::new(CliAuditAgent::default()),
            commands,
        ))
    }

    fn draft(id: &str, name: &str, source_path: &str) -> McpServer {
        McpServer {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            source_path: source_path.to_string(),
            status: ServerStatus::Draft,
            deployed_url: None,
            last_deployed_at: None,
            cloud_run_service_name: None,
            cloud_run_region: None,
        }
    }

    async fn seed_credentials(state: &ServerState, project: Option<&str>, key: Option<&str>) {
        let mut config = state.store.load().await;
        config.credentials.google_project_id = project.map(str::to_string);
        config.credentials.anthropic_key = key.map(str::to_string);
        state.store.save(&config).await.unwrap();
    }

    #[test]
    fn test_service_name_resolution() {
        let mut server = draft("a", "My Weather Server!", "/srv");
        assert_eq!(resolve_service_name(&server), "my-weather-server-");

        server.cloud_run_service_name = Some("explicit-name".to_string());
        assert_eq!(resolve_service_name(&server), "explicit-name");

        let unnamed = draft("b", "", "/srv");
        assert_eq!(resolve_service_name(&unnamed), "mcp-server");
    }

    #[tokio::test]
    async fn test_unknown_server_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), PipelineCommands::default());
        let (sink, mut rx) = EventSink::channel();

        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "missing" }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "deploy-error");
        assert_eq!(frames[0].data["message"], "Server not found");
    }

    #[tokio::test]
    async fn test_missing_project_id_rejected_before_status_change() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), PipelineCommands::default());
        let (sink, mut rx) = EventSink::channel();

        state.store.upsert_server(draft("srv-1", "One", "/srv")).await.unwrap();
        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "srv-1" }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "deploy-error");
        assert_eq!(frames[0].data["message"], "Missing Global Project ID");
        assert_eq!(
            state.store.load().await.find_server("srv-1").unwrap().status,
            ServerStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_audit_mode_requires_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), PipelineCommands::default());
        let (sink, mut rx) = EventSink::channel();

        state.store.upsert_server(draft("srv-1", "One", "/srv")).await.unwrap();
        seed_credentials(&state, Some("demo-project"), None).await;

        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "srv-1" }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        let error = frames.iter().find(|f| f.event == "deploy-error").unwrap();
        assert_eq!(error.data["message"], "Missing API Key (required for audit mode)");
        assert_eq!(
            state.store.load().await.find_server("srv-1").unwrap().status,
            ServerStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_deploy_only_success_records_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let state = state_with(
            dir.path(),
            stub_commands("echo 'Service URL: https://one-abc123-uc.a.run.app'"),
        );
        let (sink, mut rx) = EventSink::channel();

        state
            .store
            .upsert_server(draft("srv-1", "One", &source.path().display().to_string()))
            .await
            .unwrap();
        seed_credentials(&state, Some("demo-project"), None).await;

        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "srv-1", "deployOnly": true }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        let complete = frames.iter().find(|f| f.event == "deploy-complete").unwrap();
        assert_eq!(
            complete.data["url"],
            "https://one-abc123-uc.a.run.app/mcp"
        );

        let record = state.store.load().await.find_server("srv-1").unwrap().clone();
        assert_eq!(record.status, ServerStatus::Healthy);
        assert_eq!(
            record.deployed_url.as_deref(),
            Some("https://one-abc123-uc.a.run.app/mcp")
        );
        assert_eq!(record.cloud_run_service_name.as_deref(), Some("one"));
        assert_eq!(record.cloud_run_region.as_deref(), Some("us-central1"));
        assert!(record.last_deployed_at.is_some());
    }

    #[tokio::test]
    async fn test_stage_failure_marks_record_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), stub_commands("echo 'deploy blew up' >&2; exit 3"));
        let (sink, mut rx) = EventSink::channel();

        state
            .store
            .upsert_server(draft("srv-1", "One", &source.path().display().to_string()))
            .await
            .unwrap();
        seed_credentials(&state, Some("demo-project"), None).await;

        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "srv-1", "deployOnly": true }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        let error = frames.iter().find(|f| f.event == "deploy-error").unwrap();
        assert!(error.data["message"].as_str().unwrap().contains("Deploy failed"));
        assert_eq!(
            state.store.load().await.find_server("srv-1").unwrap().status,
            ServerStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_concurrent_deploy_for_same_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), PipelineCommands::default());
        let (sink, mut rx) = EventSink::channel();

        state.store.upsert_server(draft("srv-1", "One", "/srv")).await.unwrap();
        seed_credentials(&state, Some("demo-project"), Some("sk-ant-key")).await;

        let _held = state.begin_deploy("srv-1").unwrap();
        deploy_server(
            &state,
            &sink,
            serde_json::json!({ "serverId": "srv-1", "deployOnly": true }),
            &CancellationToken::new(),
        )
        .await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0].event, "deploy-error");
        assert_eq!(
            frames[0].data["message"],
            "A deployment is already in progress for this server"
        );
        assert_eq!(
            state.store.load().await.find_server("srv-1").unwrap().status,
            ServerStatus::Draft
        );
    }
}
