//! Local tooling prerequisite checks.
//!
//! A fixed set of read-only probes: cloud CLI present and authenticated,
//! application-default credentials configured, container runtime present and
//! its daemon running. Each probe is individually timeout-bounded so a hung
//! tool (a wedged docker daemon, typically) cannot hang the whole report.

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// Per-probe timeout. Failure is the default on expiry.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness of the `gcloud` CLI.
#[derive(Debug, Clone, Serialize)]
pub struct GcloudCheck {
    pub installed: bool,
    pub authenticated: bool,
    pub fix: &'static str,
}

/// Readiness of the container runtime.
#[derive(Debug, Clone, Serialize)]
pub struct DockerCheck {
    pub installed: bool,
    pub running: bool,
    pub fix: &'static str,
}

/// Application-default credential state.
#[derive(Debug, Clone, Serialize)]
pub struct AdcCheck {
    pub configured: bool,
    pub fix: &'static str,
}

/// Structured readiness report for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PrereqReport {
    pub gcloud: GcloudCheck,
    pub docker: DockerCheck,
    pub adc: AdcCheck,
}

impl Default for PrereqReport {
    fn default() -> Self {
        Self {
            gcloud: GcloudCheck {
                installed: false,
                authenticated: false,
                fix: "gcloud auth login",
            },
            docker: DockerCheck {
                installed: false,
                running: false,
                fix: "open -a Docker",
            },
            adc: AdcCheck {
                configured: false,
                fix: "gcloud auth application-default login",
            },
        }
    }
}

/// Run all probes and return the report. Never fails and mutates nothing;
/// safe to call repeatedly and concurrently.
pub async fn check_prerequisites() -> PrereqReport {
    let mut report = PrereqReport::default();

    let (gcloud, docker) = tokio::join!(probe_gcloud(), probe_docker());
    report.gcloud.installed = gcloud.installed;
    report.gcloud.authenticated = gcloud.authenticated;
    report.adc.configured = gcloud.adc_configured;
    report.docker.installed = docker.installed;
    report.docker.running = docker.running;

    report
}

struct GcloudProbe {
    installed: bool,
    authenticated: bool,
    adc_configured: bool,
}

async fn probe_gcloud() -> GcloudProbe {
    let mut result = GcloudProbe {
        installed: false,
        authenticated: false,
        adc_configured: false,
    };

    result.installed = probe("gcloud", &["--version"]).await;
    if !result.installed {
        return result;
    }

    result.authenticated = probe("gcloud", &["auth", "print-identity-token"]).await;
    result.adc_configured = probe(
        "gcloud",
        &["auth", "application-default", "print-access-token"],
    )
    .await;

    result
}

struct DockerProbe {
    installed: bool,
    running: bool,
}

async fn probe_docker() -> DockerProbe {
    let mut result = DockerProbe {
        installed: false,
        running: false,
    };

    result.installed = probe("docker", &["--version"]).await;
    if result.installed {
        result.running = probe("docker", &["info"]).await;
    }

    result
}

/// Run one probe command: true iff it spawns, exits zero, and does so
/// within [`PROBE_TIMEOUT`].
async fn probe(program: &str, args: &[&str]) -> bool {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(PROBE_TIMEOUT, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("Probe `{}` could not run: {}", program, e);
            false
        }
        Err(_) => {
            debug!("Probe `{}` timed out after {:?}", program, PROBE_TIMEOUT);
            false
        }
    }
}
