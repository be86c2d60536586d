//! Cloud Run Admin API lookups: readiness verification and service metadata.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::LauncherError;
use crate::gcp::auth;
use crate::gcp::client::{GcpClient, GcpHandle};

const RUN_ENDPOINT: &str = "https://run.googleapis.com";

/// Outcome of asking the Admin API whether a service is ready to serve.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Control-plane view of one deployed service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub service_name: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<RevisionSummary>,
    pub traffic: Vec<TrafficSplit>,
    pub scaling: ScalingSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_percent: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSplit {
    pub revision: String,
    pub percent: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,
}

/// Metadata, or the error that prevented the lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataReport {
    pub metadata: Option<ServiceMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireService {
    uri: Option<String>,
    creator: Option<String>,
    last_modifier: Option<String>,
    update_time: Option<String>,
    etag: Option<String>,
    latest_ready_revision: Option<String>,
    latest_created_revision: Option<String>,
    traffic: Vec<WireTrafficTarget>,
    template: WireTemplate,
    conditions: Vec<WireCondition>,
    terminal_condition: Option<WireCondition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireCondition {
    #[serde(rename = "type")]
    kind: Option<String>,
    state: Option<String>,
    status: Option<String>,
    message: Option<String>,
    reason: Option<String>,
    last_transition_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireTrafficTarget {
    #[serde(rename = "type")]
    kind: Option<String>,
    revision: Option<String>,
    percent: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireTemplate {
    scaling: WireScaling,
    max_instance_request_concurrency: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireScaling {
    min_instance_count: Option<i64>,
    max_instance_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireRevision {
    create_time: Option<String>,
    containers: Vec<WireContainer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct WireContainer {
    image: Option<String>,
}

/// Check whether a service exists and its Ready condition holds. Used both
/// for post-deploy reconciliation and for the dashboard's verify action.
pub async fn verify_service(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
) -> VerificationResult {
    match fetch_service(handle, project_id, service_name, region).await {
        Ok(service) => {
            let condition = ready_condition(&service);
            let ready = condition.map(condition_is_ready).unwrap_or(false);
            let error = if ready {
                None
            } else {
                Some(
                    condition
                        .and_then(|condition| {
                            condition.message.clone().or_else(|| condition.reason.clone())
                        })
                        .unwrap_or_else(|| "Service not ready".to_string()),
                )
            };
            VerificationResult {
                ready,
                url: service.uri,
                error,
            }
        }
        Err(err) => {
            warn!("Verification of {} failed: {}", service_name, err);
            handle.invalidate().await;
            VerificationResult {
                ready: false,
                url: None,
                error: Some(classify_admin_error(&err)),
            }
        }
    }
}

/// Fetch the control-plane metadata view. Never fails: errors surface as a
/// `None` metadata plus a message. A failed revision lookup degrades to a
/// name-only summary instead of sinking the whole report.
pub async fn get_service_metadata(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
) -> MetadataReport {
    let client = match handle.acquire().await {
        Ok(client) => client,
        Err(err) => {
            handle.invalidate().await;
            return MetadataReport {
                metadata: None,
                error: Some(auth::describe_backend_error(&err.to_string())),
            };
        }
    };

    let service: WireService = match client
        .get_json(&service_url(project_id, region, service_name))
        .await
    {
        Ok(service) => service,
        Err(err) => {
            warn!("Metadata lookup for {} failed: {}", service_name, err);
            handle.invalidate().await;
            return MetadataReport {
                metadata: None,
                error: Some(classify_admin_error(&err)),
            };
        }
    };

    let latest_name = latest_revision_name(&service);
    let latest_revision = match &latest_name {
        Some(name) => {
            let percent = latest_traffic_percent(&service.traffic, name);
            Some(describe_revision(&client, name, percent).await)
        }
        None => None,
    };

    MetadataReport {
        metadata: Some(summarize(service, service_name, region, latest_revision)),
        error: None,
    }
}

async fn fetch_service(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
) -> Result<WireService, LauncherError> {
    let client = handle.acquire().await?;
    client
        .get_json(&service_url(project_id, region, service_name))
        .await
}

fn service_url(project_id: &str, region: &str, service_name: &str) -> String {
    format!(
        "{}/v2/projects/{}/locations/{}/services/{}",
        RUN_ENDPOINT, project_id, region, service_name
    )
}

async fn describe_revision(
    client: &GcpClient,
    name: &str,
    traffic_percent: Option<i64>,
) -> RevisionSummary {
    let url = format!("{}/v2/{}", RUN_ENDPOINT, name);
    match client.get_json::<WireRevision>(&url).await {
        Ok(revision) => RevisionSummary {
            name: name.to_string(),
            image: revision
                .containers
                .first()
                .and_then(|container| container.image.clone()),
            create_time: revision.create_time,
            traffic_percent,
        },
        Err(err) => {
            debug!("Revision lookup for {} failed: {}", name, err);
            RevisionSummary {
                name: name.to_string(),
                image: None,
                create_time: None,
                traffic_percent,
            }
        }
    }
}

fn summarize(
    service: WireService,
    service_name: &str,
    region: &str,
    latest_revision: Option<RevisionSummary>,
) -> ServiceMetadata {
    let condition = ready_condition(&service);
    let status = condition.and_then(|condition| {
        condition
            .state
            .clone()
            .or_else(|| condition.status.clone())
            .or_else(|| condition.message.clone())
            .or_else(|| condition.last_transition_time.clone())
    });

    let latest_tail = latest_revision
        .as_ref()
        .map(|revision| revision_tail(&revision.name).to_string());
    let traffic = service
        .traffic
        .iter()
        .map(|target| TrafficSplit {
            revision: target
                .revision
                .clone()
                .filter(|revision| !revision.is_empty())
                .or_else(|| {
                    if targets_latest(target) {
                        latest_tail.clone()
                    } else {
                        None
                    }
                })
                .unwrap_or_default(),
            percent: target.percent.unwrap_or(0),
        })
        .collect();

    ServiceMetadata {
        service_name: service_name.to_string(),
        region: region.to_string(),
        url: service.uri,
        status,
        latest_revision,
        traffic,
        scaling: ScalingSettings {
            min_instances: service.template.scaling.min_instance_count,
            max_instances: service.template.scaling.max_instance_count,
            concurrency: service.template.max_instance_request_concurrency,
        },
        last_updated: service.update_time.or(service.etag),
        last_modified_by: service.creator.or(service.last_modifier),
    }
}

fn ready_condition(service: &WireService) -> Option<&WireCondition> {
    service
        .terminal_condition
        .as_ref()
        .or_else(|| {
            service
                .conditions
                .iter()
                .find(|condition| condition.kind.as_deref() == Some("Ready"))
        })
        .or_else(|| service.conditions.first())
}

fn condition_is_ready(condition: &WireCondition) -> bool {
    matches!(condition.state.as_deref(), Some("CONDITION_SUCCEEDED") | Some("READY"))
        || condition.status.as_deref() == Some("True")
}

fn latest_revision_name(service: &WireService) -> Option<String> {
    service
        .latest_ready_revision
        .clone()
        .or_else(|| service.latest_created_revision.clone())
        .or_else(|| {
            service
                .traffic
                .first()
                .and_then(|target| target.revision.clone())
        })
        .filter(|name| !name.is_empty())
}

/// Traffic targets name revisions by short name while the service names its
/// latest revision by full resource path; match on the path tail.
fn latest_traffic_percent(traffic: &[WireTrafficTarget], latest_name: &str) -> Option<i64> {
    let tail = revision_tail(latest_name);
    traffic.iter().find_map(|target| {
        if targets_latest(target) || target.revision.as_deref() == Some(tail) {
            Some(target.percent.unwrap_or(0))
        } else {
            None
        }
    })
}

fn targets_latest(target: &WireTrafficTarget) -> bool {
    target.kind.as_deref() == Some("TRAFFIC_TARGET_ALLOCATION_TYPE_LATEST")
}

fn revision_tail(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn classify_admin_error(err: &LauncherError) -> String {
    let detail = err.to_string();
    if detail.contains("404") || detail.to_lowercase().contains("not found") {
        return "Service not found".to_string();
    }
    auth::describe_backend_error(&detail)
}
