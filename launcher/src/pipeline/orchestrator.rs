//! The deployment pipeline state machine.
//!
//! Linear stages, no branching: an optional agent audit, then idempotent
//! infrastructure setup, then one build/push/deploy invocation whose output
//! must yield the service URL. A stage either completes or the whole
//! pipeline halts; there are no retries and no partial credit.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::audit::{run_audit_and_generation, AuditAgent, AuditRequest};
use crate::events::EventSink;
use crate::pipeline::output::{is_already_exists, UrlScanner};
use crate::pipeline::process::{run_streamed, CommandSpec, ProcessOutput};

/// Identity of one deployment, immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub project_id: String,
    pub source_dir: PathBuf,
    pub service_name: String,
    pub region: String,
}

/// The ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    AuditAndGenerate,
    InfraSetup,
    BuildPushDeploy,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::AuditAndGenerate => "Audit & Generate",
            PipelineStage::InfraSetup => "GCP Setup",
            PipelineStage::BuildPushDeploy => "Deploy",
        };
        f.write_str(name)
    }
}

/// The two external invocations the pipeline runs in the target directory.
///
/// Injectable so tests can substitute stub commands for `make`.
#[derive(Debug, Clone)]
pub struct PipelineCommands {
    pub setup: CommandSpec,
    pub deploy: CommandSpec,
}

impl Default for PipelineCommands {
    fn default() -> Self {
        Self {
            setup: CommandSpec::new("make", &["gcp-setup"]),
            deploy: CommandSpec::new("make", &["deploy"]),
        }
    }
}

/// Agent collaborator plus the credential it runs under; present only when
/// the audit stage is included.
#[derive(Clone)]
pub struct AuditStage {
    pub agent: Arc<dyn AuditAgent>,
    pub credential: String,
}

/// Why a pipeline run did not produce a URL.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required input absent; nothing external was launched.
    #[error("{0}")]
    MissingCredential(String),

    /// A stage ran and failed; carries the captured output context.
    #[error("{stage} failed: {detail}")]
    Stage { stage: PipelineStage, detail: String },

    /// The deploy tool reported success but no URL was captured. Distinct
    /// from a tool failure so callers can recover by querying the provider.
    #[error("Deployment succeeded but URL could not be captured")]
    AmbiguousSuccess,

    #[error("Deployment cancelled")]
    Cancelled,
}

/// Terminal outcome of one pipeline invocation, never partially populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn from_outcome(outcome: &Result<String, PipelineError>) -> Self {
        match outcome {
            Ok(url) => Self {
                success: true,
                service_url: Some(url.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                service_url: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Run the pipeline to completion, streaming progress into `sink`.
///
/// On success returns the captured service origin URL (no endpoint suffix).
pub async fn run_pipeline(
    target: &DeployTarget,
    commands: &PipelineCommands,
    audit: Option<&AuditStage>,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    preflight(target, audit)?;

    // One scanner across every stage; the URL line can appear anywhere in
    // the combined stream and only the first match counts.
    let mut scanner = UrlScanner::new();

    if let Some(stage) = audit {
        sink.step(0);
        let request = AuditRequest {
            source_dir: target.source_dir.clone(),
            project_id: target.project_id.clone(),
            credential: stage.credential.clone(),
        };
        let outcome = run_audit_and_generation(stage.agent.as_ref(), &request, sink, cancel).await;
        if outcome.cancelled {
            return Err(PipelineError::Cancelled);
        }
        if !outcome.success {
            let detail = outcome.error.unwrap_or_else(|| "Audit failed".to_string());
            sink.error(format!("{} failed: {}", PipelineStage::AuditAndGenerate, detail));
            return Err(PipelineError::Stage {
                stage: PipelineStage::AuditAndGenerate,
                detail,
            });
        }
        sink.success("Audit & Generation Complete.");
    }

    sink.step(1);
    let setup = run_stage(
        PipelineStage::InfraSetup,
        &commands.setup,
        target,
        &mut scanner,
        sink,
        cancel,
    )
    .await?;

    if setup.success {
        sink.success(format!("{} completed successfully.", PipelineStage::InfraSetup));
    } else if is_already_exists(&setup.tail_text()) {
        // Setup is idempotent in intent; re-created resources are fine.
        sink.warn("Infrastructure already exists; continuing.");
    } else {
        sink.error(format!("{} failed.", PipelineStage::InfraSetup));
        return Err(PipelineError::Stage {
            stage: PipelineStage::InfraSetup,
            detail: setup.tail_text(),
        });
    }

    let deploy = run_stage(
        PipelineStage::BuildPushDeploy,
        &commands.deploy,
        target,
        &mut scanner,
        sink,
        cancel,
    )
    .await?;

    if !deploy.success {
        sink.error(format!("{} failed.", PipelineStage::BuildPushDeploy));
        return Err(PipelineError::Stage {
            stage: PipelineStage::BuildPushDeploy,
            detail: deploy.tail_text(),
        });
    }
    sink.success(format!("{} completed successfully.", PipelineStage::BuildPushDeploy));

    match scanner.into_url() {
        Some(url) => Ok(url),
        None => Err(PipelineError::AmbiguousSuccess),
    }
}

/// Validate the run's inputs before anything external is launched.
fn preflight(target: &DeployTarget, audit: Option<&AuditStage>) -> Result<(), PipelineError> {
    if target.project_id.trim().is_empty() {
        return Err(PipelineError::MissingCredential(
            "Missing Global Project ID".to_string(),
        ));
    }
    if target.source_dir.as_os_str().is_empty() {
        return Err(PipelineError::MissingCredential(
            "Missing project source path".to_string(),
        ));
    }
    if let Some(stage) = audit {
        if stage.credential.trim().is_empty() {
            return Err(PipelineError::MissingCredential(
                "Missing API Key (required for audit mode)".to_string(),
            ));
        }
    }
    Ok(())
}

/// Run one subprocess stage, forwarding its output and scanning for the
/// service URL. Returns the raw process outcome; interpretation (success,
/// idempotency tolerance) belongs to the caller.
async fn run_stage(
    stage: PipelineStage,
    spec: &CommandSpec,
    target: &DeployTarget,
    scanner: &mut UrlScanner,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, PipelineError> {
    sink.info(format!("Starting {}...", stage));

    let envs = [
        ("PROJECT_ID", target.project_id.as_str()),
        ("SERVICE_NAME", target.service_name.as_str()),
        ("REGION", target.region.as_str()),
    ];
    let is_deploy = stage == PipelineStage::BuildPushDeploy;

    let output = run_streamed(
        spec,
        &target.source_dir,
        &envs,
        |line| {
            sink.info(line);
            scanner.observe(line);
            if is_deploy {
                if line.contains("Building Container") {
                    sink.step(2);
                }
                if line.contains("Pushing to Registry") {
                    sink.step(3);
                }
            }
        },
        cancel,
    )
    .await
    .map_err(|e| PipelineError::Stage {
        stage,
        detail: e.to_string(),
    })?;

    if output.cancelled {
        return Err(PipelineError::Cancelled);
    }
    Ok(output)
}
