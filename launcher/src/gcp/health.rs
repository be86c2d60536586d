//! Liveness probe for deployed service URLs.
//!
//! A plain GET against the service origin, classified into a human-readable
//! reason. The probe deliberately treats most HTTP answers as "alive": a
//! container returning 5xx is in a different failure class than a deleted
//! service, and callers need to tell them apart.

use std::time::Duration;

use serde::Serialize;

use crate::errors::LauncherError;

pub const TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of probing one deployed URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub checked_at: String,
    /// True only for a corroborated 404; the single probe outcome that may
    /// demote a stored server record. Transient failures never do.
    #[serde(skip)]
    pub firm_not_found: bool,
}

/// Probe the origin of a deployed URL and classify the answer.
pub async fn probe_service(deployed_url: &str) -> HealthReport {
    let checked_at = crate::utils::iso_now();

    let origin = match origin_of(deployed_url) {
        Ok(origin) => origin,
        Err(err) => {
            return HealthReport {
                healthy: false,
                reason: format!("Connection failed — {}", err),
                status_code: None,
                checked_at,
                firm_not_found: false,
            };
        }
    };

    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            return HealthReport {
                healthy: false,
                reason: format!("Connection failed — {}", err),
                status_code: None,
                checked_at,
                firm_not_found: false,
            };
        }
    };

    match client.get(&origin).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let has_trace_header = response.headers().contains_key(TRACE_CONTEXT_HEADER);
            let (healthy, reason, firm_not_found) = classify_status(status, has_trace_header);
            HealthReport {
                healthy,
                reason,
                status_code: Some(status),
                checked_at,
                firm_not_found,
            }
        }
        Err(err) => HealthReport {
            healthy: false,
            reason: classify_failure(&err),
            status_code: None,
            checked_at,
            firm_not_found: false,
        },
    }
}

fn origin_of(raw: &str) -> Result<String, LauncherError> {
    let url = url::Url::parse(raw)?;
    let origin = url.origin();
    if !matches!(origin, url::Origin::Tuple(..)) {
        return Err(LauncherError::ValidationError(format!(
            "URL has no origin: {}",
            raw
        )));
    }
    Ok(origin.ascii_serialization())
}

fn classify_status(status: u16, has_trace_header: bool) -> (bool, String, bool) {
    if (200..300).contains(&status) {
        (true, format!("HTTP {} — service is running", status), false)
    } else if status == 404 {
        // Google's frontend answers for deleted Cloud Run services with a
        // generic 404 that lacks the trace header real containers add.
        if has_trace_header {
            (
                true,
                "HTTP 404 — service is running (route not found)".to_string(),
                false,
            )
        } else {
            (
                false,
                "Service not found — the Cloud Run service may have been deleted".to_string(),
                true,
            )
        }
    } else if status >= 500 {
        (
            true,
            format!("HTTP {} — service is running but returning server errors", status),
            false,
        )
    } else {
        (true, format!("HTTP {} — service is reachable", status), false)
    }
}

fn classify_failure(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return timeout_reason();
    }
    classify_failure_detail(&error_chain(err))
}

fn timeout_reason() -> String {
    format!(
        "Connection timed out after {}s — service may be down or unreachable",
        HEALTH_TIMEOUT.as_secs()
    )
}

fn classify_failure_detail(detail: &str) -> String {
    let lowered = detail.to_lowercase();
    if lowered.contains("dns error")
        || lowered.contains("failed to lookup")
        || lowered.contains("name or service not known")
    {
        "DNS resolution failed — the service URL no longer exists".to_string()
    } else if lowered.contains("connection refused") {
        "Connection refused — service is not accepting connections".to_string()
    } else {
        format!("Connection failed — {}", detail)
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
