//! Cloud Logging queries for deployed Cloud Run services.
//!
//! Log entries arrive with heterogeneous payload and timestamp shapes
//! depending on what produced them (stdout text, structured JSON, request
//! logs with only an `httpRequest` block). Everything is normalized into a
//! flat record the frontend can render directly.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::LauncherError;
use crate::gcp::auth;
use crate::gcp::client::GcpHandle;
use crate::gcp::metrics::TimeWindow;

const LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";

pub const DEFAULT_LOG_LIMIT: u32 = 200;

/// Cloud Logging severity. Unrecognized values collapse to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntrySeverity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    #[default]
    #[serde(other)]
    Default,
}

impl EntrySeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            EntrySeverity::Default => "DEFAULT",
            EntrySeverity::Debug => "DEBUG",
            EntrySeverity::Info => "INFO",
            EntrySeverity::Notice => "NOTICE",
            EntrySeverity::Warning => "WARNING",
            EntrySeverity::Error => "ERROR",
            EntrySeverity::Critical => "CRITICAL",
        }
    }
}

/// One normalized log line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub timestamp: String,
    pub severity: EntrySeverity,
    pub message: String,
    /// Original entry fields, kept for the expandable raw view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

/// Log lines plus the error that cut the fetch short, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsReport {
    pub logs: Vec<LogRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntriesResponse {
    entries: Vec<WireEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireEntry {
    log_name: String,
    timestamp: Option<serde_json::Value>,
    severity: EntrySeverity,
    text_payload: Option<String>,
    json_payload: Option<serde_json::Value>,
    proto_payload: Option<serde_json::Value>,
    http_request: Option<serde_json::Value>,
    labels: Option<serde_json::Value>,
    resource: Option<serde_json::Value>,
    trace: Option<String>,
    span_id: Option<String>,
}

/// Fetch recent log entries for one service, newest first. Never fails: on
/// any error the cached client handle is discarded and an empty listing is
/// returned with the failure attached.
pub async fn fetch_service_logs(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
    window: TimeWindow,
    limit: u32,
) -> LogsReport {
    match query_entries(handle, project_id, service_name, region, window, limit).await {
        Ok(logs) => LogsReport { logs, error: None },
        Err(err) => {
            warn!("Log query for {} failed: {}", service_name, err);
            handle.invalidate().await;
            LogsReport {
                logs: Vec::new(),
                error: Some(auth::describe_backend_error(&err.to_string())),
            }
        }
    }
}

async fn query_entries(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
    window: TimeWindow,
    limit: u32,
) -> Result<Vec<LogRecord>, LauncherError> {
    let client = handle.acquire().await?;

    let start = Utc::now() - window.duration();
    let filter = log_filter(
        service_name,
        region,
        &start.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    let body = serde_json::json!({
        "resourceNames": [format!("projects/{}", project_id)],
        "filter": filter,
        "orderBy": "timestamp desc",
        "pageSize": limit,
    });

    let url = format!("{}/v2/entries:list", LOGGING_ENDPOINT);
    let response: EntriesResponse = client.post_json(&url, &body).await?;
    Ok(response.entries.into_iter().map(to_record).collect())
}

fn log_filter(service_name: &str, region: &str, start: &str) -> String {
    format!(
        "resource.type=\"cloud_run_revision\" AND resource.labels.service_name=\"{}\" AND resource.labels.location=\"{}\" AND timestamp >= \"{}\"",
        service_name, region, start
    )
}

fn to_record(entry: WireEntry) -> LogRecord {
    let message = build_message(&entry);
    let raw_data = build_raw_data(&entry);
    LogRecord {
        timestamp: normalize_timestamp(entry.timestamp.as_ref()),
        severity: entry.severity,
        message,
        raw_data,
    }
}

/// Message precedence: text payload, then structured payloads, then a
/// synthesized request-log summary, then a severity/log-name placeholder so
/// no entry renders as a blank row.
fn build_message(entry: &WireEntry) -> String {
    let mut message = if let Some(text) = &entry.text_payload {
        text.clone()
    } else if let Some(payload) = &entry.json_payload {
        try_stringify(payload)
    } else if let Some(payload) = &entry.proto_payload {
        try_stringify(payload)
    } else {
        String::new()
    };

    if message.trim().is_empty() {
        if let Some(request) = &entry.http_request {
            message = http_summary(request);
        }
    }

    if message.trim().is_empty() {
        let tail = entry
            .log_name
            .rsplit('/')
            .next()
            .filter(|tail| !tail.is_empty());
        message = match tail {
            Some(tail) => format!("[{}] ({})", entry.severity.as_str(), tail),
            None => format!("[{}] (no payload)", entry.severity.as_str()),
        };
    }

    message
}

fn try_stringify(value: &serde_json::Value) -> String {
    if let Some(text) = value.as_str() {
        return text.to_string();
    }
    for key in ["message", "msg"] {
        if let Some(text) = value.get(key).and_then(|inner| inner.as_str()) {
            return text.to_string();
        }
    }
    serde_json::to_string(value).unwrap_or_default()
}

/// Cloud Run request logs often carry no payload at all; summarize the
/// `httpRequest` block instead: method, status, size, latency, URL.
fn http_summary(request: &serde_json::Value) -> String {
    let method = scalar_text(request.get("requestMethod"));
    let status = scalar_text(request.get("status"));
    let size = match scalar_text(request.get("responseSize")) {
        ref size if size.is_empty() => String::new(),
        size => format!("{} B", size),
    };
    let latency = match request.get("latency") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Object(fields)) => match fields.get("seconds") {
            Some(seconds) => format!("{}s", scalar_text(Some(seconds))),
            None => String::new(),
        },
        _ => String::new(),
    };
    let url = scalar_text(request.get("requestUrl"));

    let mut message = [method, status, size, latency, url]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("  ");

    let user_agent = scalar_text(request.get("userAgent"));
    if !user_agent.is_empty() {
        message.push_str(&format!("  ({})", user_agent));
    }
    message
}

fn scalar_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

/// Timestamps arrive as RFC 3339 strings or as `{seconds, nanos}` objects
/// whose seconds field may itself be a string. Anything unusable falls back
/// to the current time rather than dropping the entry.
fn normalize_timestamp(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(text)) if !text.is_empty() => text.clone(),
        Some(serde_json::Value::Object(fields)) => {
            let seconds = match fields.get("seconds") {
                Some(serde_json::Value::Number(number)) => number.as_i64(),
                Some(serde_json::Value::String(raw)) => raw.parse().ok(),
                _ => None,
            };
            let nanos = fields
                .get("nanos")
                .and_then(|nanos| nanos.as_u64())
                .unwrap_or(0) as u32;
            match seconds.and_then(|seconds| Utc.timestamp_opt(seconds, nanos).single()) {
                Some(when) => when.to_rfc3339_opts(SecondsFormat::Millis, true),
                None => now_iso(),
            }
        }
        _ => now_iso(),
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn build_raw_data(entry: &WireEntry) -> Option<serde_json::Value> {
    let mut raw = serde_json::Map::new();
    if !entry.log_name.is_empty() {
        raw.insert(
            "logName".to_string(),
            serde_json::Value::String(entry.log_name.clone()),
        );
    }
    raw.insert(
        "severity".to_string(),
        serde_json::Value::String(entry.severity.as_str().to_string()),
    );
    if let Some(text) = &entry.text_payload {
        raw.insert(
            "textPayload".to_string(),
            serde_json::Value::String(text.clone()),
        );
    }
    let nested = [
        ("httpRequest", &entry.http_request),
        ("jsonPayload", &entry.json_payload),
        ("protoPayload", &entry.proto_payload),
        ("labels", &entry.labels),
        ("resource", &entry.resource),
    ];
    for (key, value) in nested {
        if let Some(value) = value {
            raw.insert(key.to_string(), value.clone());
        }
    }
    if let Some(trace) = &entry.trace {
        raw.insert(
            "trace".to_string(),
            serde_json::Value::String(trace.clone()),
        );
    }
    if let Some(span_id) = &entry.span_id {
        raw.insert(
            "spanId".to_string(),
            serde_json::Value::String(span_id.clone()),
        );
    }
    Some(serde_json::Value::Object(raw))
}
