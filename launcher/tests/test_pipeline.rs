//! Deploy pipeline integration tests
//!
//! Drives the full pipeline with stub shell commands standing in for
//! `make`, covering URL capture, idempotent setup, stage failures and
//! cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mcp_launcher::audit::{AgentEvent, AuditAgent, AuditOutcome, AuditRequest};
use mcp_launcher::errors::LauncherError;
use mcp_launcher::events::{EventSink, Outbound};
use mcp_launcher::pipeline::orchestrator::{
    run_pipeline, AuditStage, DeployTarget, PipelineCommands, PipelineError,
};
use mcp_launcher::pipeline::process::CommandSpec;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

fn commands(setup: &str, deploy: &str) -> PipelineCommands {
    PipelineCommands {
        setup: sh(setup),
        deploy: sh(deploy),
    }
}

fn target(dir: &Path) -> DeployTarget {
    DeployTarget {
        project_id: "demo-project".to_string(),
        source_dir: dir.to_path_buf(),
        service_name: "demo".to_string(),
        region: "us-central1".to_string(),
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_deploy_only_run_captures_service_url() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mut rx) = EventSink::channel();

    let result = run_pipeline(
        &target(dir.path()),
        &commands(
            "echo 'Enabling GCP Services...'",
            "printf 'Building Container...\\nService URL: https://demo-abc123-uc.a.run.app\\n'",
        ),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), "https://demo-abc123-uc.a.run.app");

    let frames = drain(&mut rx);
    let steps: Vec<i64> = frames
        .iter()
        .filter(|f| f.event == "step-update")
        .map(|f| f.data["stepIndex"].as_i64().unwrap())
        .collect();
    // No audit stage, so the stepper starts at infra setup.
    assert_eq!(steps, vec![1, 2]);
    assert!(frames
        .iter()
        .any(|f| f.event == "log" && f.data["message"] == "Deploy completed successfully."));
}

#[tokio::test]
async fn test_url_captured_through_ansi_colors() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _rx) = EventSink::channel();

    let result = run_pipeline(
        &target(dir.path()),
        &commands(
            "true",
            "printf 'Service URL: \\033[1mhttps://colored-abc-uc.a.run.app\\033[0m\\n'",
        ),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), "https://colored-abc-uc.a.run.app");
}

#[tokio::test]
async fn test_setup_already_exists_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mut rx) = EventSink::channel();

    let result = run_pipeline(
        &target(dir.path()),
        &commands(
            "echo 'ERROR: repository mcp-repo already exists'; exit 1",
            "echo 'Service URL: https://tolerant-abc-uc.a.run.app'",
        ),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), "https://tolerant-abc-uc.a.run.app");
    assert!(drain(&mut rx)
        .iter()
        .any(|f| f.data["message"] == "Infrastructure already exists; continuing."));
}

#[tokio::test]
async fn test_setup_failure_halts_before_deploy() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("deploy-ran");
    let (sink, _rx) = EventSink::channel();

    let deploy = format!("touch {}", marker.display());
    let result = run_pipeline(
        &target(dir.path()),
        &commands("echo 'permission denied' >&2; exit 1", &deploy),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    match result {
        Err(PipelineError::Stage { detail, .. }) => assert!(detail.contains("permission denied")),
        other => panic!("expected setup failure, got {:?}", other.map(|_| ())),
    }
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_deploy_failure_carries_output_tail() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _rx) = EventSink::channel();

    let result = run_pipeline(
        &target(dir.path()),
        &commands("true", "echo 'docker build blew up' >&2; exit 3"),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    let err = result.err().unwrap();
    let message = err.to_string();
    assert!(message.starts_with("Deploy failed:"));
    assert!(message.contains("docker build blew up"));
}

#[tokio::test]
async fn test_success_without_url_is_ambiguous() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _rx) = EventSink::channel();

    let result = run_pipeline(
        &target(dir.path()),
        &commands("true", "echo 'Deployed, trust me.'"),
        None,
        &sink,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(PipelineError::AmbiguousSuccess)));
}

#[tokio::test]
async fn test_cancellation_stops_a_running_stage() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _rx) = EventSink::channel();
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let started = std::time::Instant::now();
    let result = run_pipeline(
        &target(dir.path()),
        &commands("true", "sleep 30"),
        None,
        &sink,
        &cancel,
    )
    .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Agent that replays a fixed event script without spawning anything.
struct ScriptedAgent {
    events: Vec<AgentEvent>,
    outcome: AuditOutcome,
}

#[async_trait]
impl AuditAgent for ScriptedAgent {
    async fn run(
        &self,
        _request: &AuditRequest,
        events: &mut (dyn FnMut(AgentEvent) + Send),
        _cancel: &CancellationToken,
    ) -> Result<AuditOutcome, LauncherError> {
        for event in &self.events {
            events(event.clone());
        }
        Ok(self.outcome.clone())
    }
}

#[tokio::test]
async fn test_audit_stage_narrates_then_pipeline_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mut rx) = EventSink::channel();

    let audit = AuditStage {
        agent: Arc::new(ScriptedAgent {
            events: vec![
                AgentEvent::ToolUse {
                    name: "Write".to_string(),
                    path: Some("Dockerfile".to_string()),
                },
                AgentEvent::Text {
                    text: "Detected transport: streamable-http".to_string(),
                },
            ],
            outcome: AuditOutcome {
                success: true,
                cancelled: false,
                error: None,
            },
        }),
        credential: "sk-ant-test".to_string(),
    };

    let result = run_pipeline(
        &target(dir.path()),
        &commands("true", "echo 'Service URL: https://audited-abc-uc.a.run.app'"),
        Some(&audit),
        &sink,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), "https://audited-abc-uc.a.run.app");

    let frames = drain(&mut rx);
    let messages: Vec<String> = frames
        .iter()
        .filter(|f| f.event == "log")
        .map(|f| f.data["message"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(messages.contains(&"Generating: Dockerfile".to_string()));
    assert!(messages.contains(&"Detected transport: streamable-http".to_string()));
    assert!(messages.contains(&"Audit & Generation Complete.".to_string()));

    // Audit runs as step 0 before the infra stages.
    let first_step = frames.iter().find(|f| f.event == "step-update").unwrap();
    assert_eq!(first_step.data["stepIndex"], 0);
}

#[tokio::test]
async fn test_failed_audit_halts_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("setup-ran");
    let (sink, _rx) = EventSink::channel();

    let audit = AuditStage {
        agent: Arc::new(ScriptedAgent {
            events: vec![],
            outcome: AuditOutcome {
                success: false,
                cancelled: false,
                error: Some("Agent exited with status 1".to_string()),
            },
        }),
        credential: "sk-ant-test".to_string(),
    };

    let setup = format!("touch {}", marker.display());
    let result = run_pipeline(
        &target(dir.path()),
        &commands(&setup, "true"),
        Some(&audit),
        &sink,
        &CancellationToken::new(),
    )
    .await;

    match result {
        Err(PipelineError::Stage { detail, .. }) => {
            assert_eq!(detail, "Agent exited with status 1")
        }
        other => panic!("expected audit failure, got {:?}", other.map(|_| ())),
    }
    assert!(!marker.exists());
}
