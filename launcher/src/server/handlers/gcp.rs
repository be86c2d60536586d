//! Google Cloud operations for deployed services: verification, telemetry,
//! metadata, and liveness probes.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::types::ServerStatus;
use crate::events::EventSink;
use crate::gcp::logs::DEFAULT_LOG_LIMIT;
use crate::gcp::metrics::TimeWindow;
use crate::server::handlers::config::emit_config_update;
use crate::server::state::ServerState;

const DEFAULT_REGION: &str = "us-central1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServiceQuery {
    project_id: String,
    service_name: String,
    location: Option<String>,
    time_range: Option<TimeWindow>,
    limit: Option<u32>,
    server_id: Option<String>,
}

impl ServiceQuery {
    fn region(&self) -> &str {
        self.location.as_deref().unwrap_or(DEFAULT_REGION)
    }

    fn window(&self) -> TimeWindow {
        self.time_range.unwrap_or_default()
    }
}

pub async fn verify_service(state: &ServerState, sink: &EventSink, payload: Value) {
    let query: ServiceQuery = serde_json::from_value(payload).unwrap_or_default();
    let result = crate::gcp::service::verify_service(
        &state.gcp,
        &query.project_id,
        &query.service_name,
        query.region(),
    )
    .await;

    // A verified-gone service demotes the stored record so the dashboard
    // stops presenting it as live.
    let looks_deleted = !result.ready
        && result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("not found"));
    if looks_deleted {
        if let Some(server_id) = query.server_id.as_deref().filter(|id| !id.is_empty()) {
            demote_if_healthy(state, sink, server_id).await;
        }
    }

    sink.emit("service-verified", result);
}

pub async fn get_service_metrics(state: &ServerState, sink: &EventSink, payload: Value) {
    let query: ServiceQuery = serde_json::from_value(payload).unwrap_or_default();
    let report = crate::gcp::metrics::fetch_service_metrics(
        &state.gcp,
        &query.project_id,
        &query.service_name,
        query.region(),
        query.window(),
    )
    .await;
    sink.emit("service-metrics", report);
}

pub async fn get_service_logs(state: &ServerState, sink: &EventSink, payload: Value) {
    let query: ServiceQuery = serde_json::from_value(payload).unwrap_or_default();
    let report = crate::gcp::logs::fetch_service_logs(
        &state.gcp,
        &query.project_id,
        &query.service_name,
        query.region(),
        query.window(),
        query.limit.unwrap_or(DEFAULT_LOG_LIMIT),
    )
    .await;
    sink.emit("service-logs", report);
}

pub async fn get_service_metadata(state: &ServerState, sink: &EventSink, payload: Value) {
    let query: ServiceQuery = serde_json::from_value(payload).unwrap_or_default();
    let report = crate::gcp::service::get_service_metadata(
        &state.gcp,
        &query.project_id,
        &query.service_name,
        query.region(),
    )
    .await;
    sink.emit("service-metadata", report);
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HealthCheckPayload {
    deployed_url: String,
    server_id: Option<String>,
}

/// Probe a deployed URL. Only a corroborated not-found demotes the stored
/// record; transient failures report unhealthy without touching it.
pub async fn health_check(state: &ServerState, sink: &EventSink, payload: Value) {
    let payload: HealthCheckPayload = serde_json::from_value(payload).unwrap_or_default();
    let report = crate::gcp::health::probe_service(&payload.deployed_url).await;

    if report.firm_not_found {
        if let Some(server_id) = payload.server_id.as_deref().filter(|id| !id.is_empty()) {
            demote_if_healthy(state, sink, server_id).await;
        }
    }

    sink.emit("health-check-result", report);
}

/// Flip a healthy server record to unhealthy and push the updated config.
/// Records in any other status are left alone.
async fn demote_if_healthy(state: &ServerState, sink: &EventSink, server_id: &str) {
    let config = state.store.load().await;
    let Some(server) = config.find_server(server_id) else {
        return;
    };
    if server.status != ServerStatus::Healthy {
        return;
    }

    let mut server = server.clone();
    server.status = ServerStatus::Unhealthy;
    match state.store.upsert_server(server).await {
        Ok(updated) => emit_config_update(sink, &updated),
        Err(e) => warn!("Failed to demote server {}: {}", server_id, e),
    }
}
