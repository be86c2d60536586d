//! Agent-driven audit and deployment-file generation.
//!
//! Stage one of a deploy hands the target directory to a coding agent CLI
//! that audits the MCP server source (entry point, host binding, transport),
//! fixes what it must, and writes the `.dockerignore`/`Dockerfile`/`Makefile`
//! the later stages run. The launcher treats the agent as an opaque event
//! source: it inspects tool-use events to narrate progress and checks a
//! separate success flag once the stream ends.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::LauncherError;
use crate::events::EventSink;
use crate::filesys::dir::Dir;

/// Agent CLI binary used when none is configured.
pub const DEFAULT_AGENT_COMMAND: &str = "claude";

/// Task line handed to the agent; the detail lives in the system prompt.
const AUDIT_TASK: &str =
    "Audit this folder, fix networking issues, and generate GCP deployment files.";

/// Tools the agent is allowed to use during an audit.
const ALLOWED_TOOLS: &str = "Read Write Edit Bash Glob Grep";

/// Inputs for one audit run.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub source_dir: PathBuf,
    pub project_id: String,
    pub credential: String,
}

/// Terminal state of one audit run. Stream end alone does not mean the
/// audit worked; `success` is tracked separately.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub success: bool,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// One parsed event from the agent's output stream.
///
/// The stream may grow new event types at any time; everything unknown
/// lands in `Other` and is ignored rather than breaking the run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    ToolUse { name: String, path: Option<String> },
    Text { text: String },
    Result { is_error: bool, error: Option<String> },
    Other,
}

/// An agent capable of running the audit stage.
#[async_trait]
pub trait AuditAgent: Send + Sync {
    /// Run the audit in `request.source_dir`, delivering parsed events to
    /// `events` as they arrive.
    async fn run(
        &self,
        request: &AuditRequest,
        events: &mut (dyn FnMut(AgentEvent) + Send),
        cancel: &CancellationToken,
    ) -> Result<AuditOutcome, LauncherError>;
}

/// Production agent: spawns the agent CLI in stream-json mode and parses
/// its NDJSON stdout.
#[derive(Debug, Clone)]
pub struct CliAuditAgent {
    pub command: String,
}

impl Default for CliAuditAgent {
    fn default() -> Self {
        Self {
            command: DEFAULT_AGENT_COMMAND.to_string(),
        }
    }
}

#[async_trait]
impl AuditAgent for CliAuditAgent {
    async fn run(
        &self,
        request: &AuditRequest,
        events: &mut (dyn FnMut(AgentEvent) + Send),
        cancel: &CancellationToken,
    ) -> Result<AuditOutcome, LauncherError> {
        let system_prompt = build_system_prompt(&request.project_id);

        let mut child = Command::new(&self.command)
            .args([
                "-p",
                AUDIT_TASK,
                "--append-system-prompt",
                &system_prompt,
                "--output-format",
                "stream-json",
                "--verbose",
                "--allowed-tools",
                ALLOWED_TOOLS,
            ])
            .current_dir(&request.source_dir)
            .env("ANTHROPIC_API_KEY", &request.credential)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LauncherError::AgentError(format!(
                    "Could not start agent CLI `{}`: {}",
                    self.command, e
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            LauncherError::AgentError("Agent stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            LauncherError::AgentError("Agent stderr was not captured".to_string())
        })?;

        // Drain stderr concurrently; keep the last lines as error context.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("agent stderr: {}", line);
                if tail.len() == 10 {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        });

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut result_error: Option<String> = None;
        let mut saw_error_result = false;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Cancelling running agent");
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill agent: {}", e);
                    }
                    let _ = child.wait().await;
                    stderr_task.abort();
                    return Ok(AuditOutcome {
                        success: false,
                        cancelled: true,
                        error: None,
                    });
                }
                line = stdout_lines.next_line() => line?,
            };

            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            for event in parse_agent_line(&line) {
                if let AgentEvent::Result { is_error, ref error } = event {
                    if is_error {
                        saw_error_result = true;
                        result_error = error.clone();
                    }
                }
                events(event);
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        let success = status.success() && !saw_error_result;
        let error = if success {
            None
        } else {
            Some(
                result_error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| {
                        if stderr_tail.is_empty() {
                            format!("Agent exited with status {}", status)
                        } else {
                            stderr_tail
                        }
                    }),
            )
        };

        Ok(AuditOutcome {
            success,
            cancelled: false,
            error,
        })
    }
}

/// Parse one NDJSON line into zero-or-more events.
///
/// Both the flat event shape (`{"type": "tool_use", ...}`) and the nested
/// assistant-message shape (`{"type": "assistant", "message": {"content":
/// [...]}}`) occur in the wild depending on CLI version.
pub fn parse_agent_line(line: &str) -> Vec<AgentEvent> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return vec![AgentEvent::Other];
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("tool_use") => vec![parse_tool_use(&value)],
        Some("text") => vec![parse_text(&value)],
        Some("assistant") => {
            let blocks = value
                .pointer("/message/content")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            let mut events = Vec::new();
            for block in &blocks {
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("tool_use") => events.push(parse_tool_use(block)),
                    Some("text") => events.push(parse_text(block)),
                    _ => {}
                }
            }
            if events.is_empty() {
                events.push(AgentEvent::Other);
            }
            events
        }
        Some("result") => {
            let is_error = value
                .get("is_error")
                .and_then(|e| e.as_bool())
                .unwrap_or(false);
            let error = value
                .get("result")
                .or_else(|| value.get("error"))
                .and_then(|e| e.as_str())
                .map(|e| e.to_string());
            vec![AgentEvent::Result { is_error, error }]
        }
        _ => vec![AgentEvent::Other],
    }
}

fn parse_tool_use(value: &serde_json::Value) -> AgentEvent {
    let name = value
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("unknown")
        .to_string();
    let path = value
        .get("input")
        .and_then(|i| i.get("path").or_else(|| i.get("file_path")))
        .and_then(|p| p.as_str())
        .map(|p| p.to_string());
    AgentEvent::ToolUse { name, path }
}

fn parse_text(value: &serde_json::Value) -> AgentEvent {
    let text = value
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();
    AgentEvent::Text { text }
}

/// Run the audit stage end to end, narrating progress into `sink`.
pub async fn run_audit_and_generation(
    agent: &dyn AuditAgent,
    request: &AuditRequest,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AuditOutcome {
    sink.info("Initializing Autonomous Cloud Architect...");

    if !Dir::new(&request.source_dir).exists().await {
        return AuditOutcome {
            success: false,
            cancelled: false,
            error: Some(format!(
                "Invalid Project Path: {}",
                request.source_dir.display()
            )),
        };
    }
    sink.info(format!("Working in: {}", request.source_dir.display()));
    sink.info("Agent is analyzing project structure...");

    let forward_sink = sink.clone();
    let mut forward = move |event: AgentEvent| forward_event(&forward_sink, event);

    match agent.run(request, &mut forward, cancel).await {
        Ok(outcome) => {
            if outcome.success {
                sink.success("Infrastructure Generation Complete.");
            }
            outcome
        }
        Err(e) => {
            sink.error(format!("Agent Error: {}", e));
            AuditOutcome {
                success: false,
                cancelled: false,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Translate one agent event into dashboard log lines.
///
/// Tool use is always narrated; free text is only surfaced when it carries
/// the phase/finding markers, so verbose reasoning stays out of the UI.
fn forward_event(sink: &EventSink, event: AgentEvent) {
    match event {
        AgentEvent::ToolUse { name, path } => match name.as_str() {
            "Edit" => sink.warn(format!(
                "Fixing Code: Editing {}...",
                path.as_deref().unwrap_or("file")
            )),
            "Write" => sink.success(format!(
                "Generating: {}",
                path.as_deref().unwrap_or("file")
            )),
            _ => sink.info(format!("Agent Tool: {}", name)),
        },
        AgentEvent::Text { text } => {
            if text.contains("Phase") || text.contains("Detected") {
                sink.info(text);
            }
        }
        AgentEvent::Result { .. } | AgentEvent::Other => {}
    }
}

/// Reference Dockerfile the agent adapts to the audited project.
const GOLDEN_DOCKERFILE: &str = r#"# Use the official Python lightweight image
FROM python:3.13-slim

# Install uv
COPY --from=ghcr.io/astral-sh/uv:latest /uv /uvx /bin/

# Install the project into /app
COPY . /app
WORKDIR /app

# Allow statements and log messages to immediately appear in the logs
ENV PYTHONUNBUFFERED=1

# Install dependencies
# Agent: Use 'uv sync' if pyproject.toml exists, otherwise 'uv pip install -r requirements.txt --system'
RUN uv sync

EXPOSE $PORT

# Run the MCP server
# Agent: Update the filename to match the detected entry point
CMD ["uv", "run", "detected_server.py"]
"#;

/// Reference Makefile; `gcp-setup` and `deploy` are the two targets the
/// pipeline invokes, and the echoed step markers drive the dashboard
/// stepper.
fn golden_makefile(project_id: &str) -> String {
    let template = r#"# === DYNAMIC CONFIGURATION ===
PROJECT_ID ?= __PROJECT_ID__
REGION ?= us-central1
REPO_NAME ?= mcp-repo
SERVICE_NAME ?= mcp-server
IMAGE_TAG ?= latest
PLATFORM ?= linux/amd64

# Computed Variables
ARTIFACT_REGISTRY = $(REGION)-docker.pkg.dev
FULL_IMAGE = $(ARTIFACT_REGISTRY)/$(PROJECT_ID)/$(REPO_NAME)/$(SERVICE_NAME):$(IMAGE_TAG)

.PHONY: all gcp-setup deploy logs

# 1. SETUP: Enables APIs & Creates Repo (Idempotent)
gcp-setup:
	@echo "Enabling GCP Services..."
	gcloud services enable run.googleapis.com artifactregistry.googleapis.com cloudbuild.googleapis.com --project=$(PROJECT_ID)
	@echo "Creating Artifact Registry..."
	gcloud artifacts repositories create $(REPO_NAME) --repository-format=docker --location=$(REGION) --project=$(PROJECT_ID) || echo "Repo exists, skipping."
	@echo "Authenticating Docker..."
	gcloud auth configure-docker $(REGION)-docker.pkg.dev

# 2. DEPLOY: Build -> Push -> Run (One Command)
deploy:
	@echo "Building Container..."
	docker build --platform $(PLATFORM) -t $(FULL_IMAGE) .
	@echo "Pushing to Registry..."
	docker push $(FULL_IMAGE)
	@echo "Deploying to Cloud Run..."
	gcloud run deploy $(SERVICE_NAME) \
		--image $(FULL_IMAGE) \
		--region $(REGION) \
		--project $(PROJECT_ID) \
		--allow-unauthenticated \
		--port 8080 \
		--memory 1Gi \
		--quiet

# 3. UTILS
logs:
	gcloud logs tail --project=$(PROJECT_ID) --filter="resource.type=cloud_run_revision AND resource.labels.service_name=$(SERVICE_NAME)"
"#;
    template.replace("__PROJECT_ID__", project_id)
}

/// Build the system prompt priming the agent with its mission and the
/// golden templates.
pub fn build_system_prompt(project_id: &str) -> String {
    format!(
        r#"You are a Senior Google Cloud DevOps Engineer specializing in MCP (Model Context Protocol).

YOUR MISSION:
Audit the current directory and generate a robust deployment infrastructure for Google Cloud Run.

PHASE 1: AUDIT & AUTO-REMEDIATION (CRITICAL)
1.  **Entry Point Detection:** Scan for the main Python server file (e.g., looks for `FastMCP`, `mcp.run`, or `if __name__ == "__main__"`).
2.  **Host Binding Check:** Cloud Run REQUIRES the server to listen on `0.0.0.0`.
    -   Grep the entry file for `host="localhost"` or `host="127.0.0.1"`.
    -   IF FOUND: You MUST use the 'Edit' tool to change it to `0.0.0.0`. Do not ask. Just fix it.
3.  **Transport Detection:** Identify if the server uses `sse` (Server-Sent Events) or `streamable-http` (HTTP). Log this specifically.

PHASE 2: FILE GENERATION
Generate the following three files. Do not overwrite existing files if they are already perfect, but usually, you should overwrite to ensure correctness.

1.  **`.dockerignore`**:
    -   Create this file immediately.
    -   MUST include: `.venv`, `__pycache__`, `.git`, `.env`, `dist`, `build`.
    -   Reason: Uploading local venvs causes massive build failures.

2.  **`Dockerfile`**:
    -   Based on the Reference below, but ADAPT it.
    -   **Dependency Check:** Look for `pyproject.toml`.
        -   YES: Use `RUN uv sync --no-dev`.
        -   NO (only requirements.txt): Use `RUN uv pip install -r requirements.txt --system`.
    -   **Entry Point:** Update the `CMD` to point to the file you detected in Phase 1.

3.  **`Makefile`**:
    -   Use the Reference below exactly.
    -   Ensure the variables match the Project ID provided: {project_id}.

REFERENCE DOCKERFILE:
```dockerfile
{dockerfile}
```

REFERENCE MAKEFILE:
```makefile
{makefile}
```

EXECUTION PLAN:
1. Scan files to find entry point and dependencies.
2. Fix `localhost` binding if present.
3. Write `.dockerignore`.
4. Write `Dockerfile`.
5. Write `Makefile`.
6. Report final status.
"#,
        project_id = project_id,
        dockerfile = GOLDEN_DOCKERFILE,
        makefile = golden_makefile(project_id),
    )
}
