//! Cloud Monitoring queries for deployed Cloud Run services.
//!
//! All metric sub-queries for a snapshot are issued as one concurrent batch;
//! issuing them sequentially would multiply the round-trip cost by the number
//! of metrics.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::LauncherError;
use crate::gcp::auth;
use crate::gcp::client::{GcpClient, GcpHandle};

const MONITORING_ENDPOINT: &str = "https://monitoring.googleapis.com";

const REQUEST_COUNT_METRIC: &str = "run.googleapis.com/request_count";
const LATENCY_METRIC: &str = "run.googleapis.com/request_latencies";
const INSTANCE_COUNT_METRIC: &str = "run.googleapis.com/container/instance_count";
const CPU_METRIC: &str = "run.googleapis.com/container/cpu/utilizations";
const MEMORY_METRIC: &str = "run.googleapis.com/container/memory/utilizations";

/// Cloud Run reports request latencies in milliseconds; used when the
/// descriptor lookup fails.
const DEFAULT_LATENCY_UNIT: &str = "ms";

/// Query window for a metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeWindow {
    #[default]
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    LastSixHours,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
}

impl TimeWindow {
    pub fn duration(self) -> chrono::Duration {
        match self {
            TimeWindow::LastHour => chrono::Duration::hours(1),
            TimeWindow::LastSixHours => chrono::Duration::hours(6),
            TimeWindow::LastDay => chrono::Duration::hours(24),
            TimeWindow::LastWeek => chrono::Duration::days(7),
        }
    }

    /// Alignment period covering the whole window, so a percentile aligner
    /// reduces each series to a single point.
    fn alignment_period(self) -> String {
        format!("{}s", self.duration().num_seconds())
    }
}

/// Point-in-time reduction of a service's monitoring data over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetricSnapshot {
    pub request_count: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub latency_p50_ms: Option<i64>,
    pub latency_p95_ms: Option<i64>,
    pub latency_p99_ms: Option<i64>,
    pub instance_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_utilization: Option<f64>,
}

impl Default for ServiceMetricSnapshot {
    fn default() -> Self {
        Self {
            request_count: 0,
            error_count: 0,
            error_rate: 0.0,
            latency_p50_ms: None,
            latency_p95_ms: None,
            latency_p99_ms: None,
            instance_count: 0,
            cpu_utilization: None,
            memory_utilization: None,
        }
    }
}

/// Snapshot plus the error that prevented a real one, if any. The snapshot
/// is always fully populated; failures zero it rather than truncating it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub metrics: ServiceMetricSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TimeSeriesResponse {
    time_series: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TimeSeries {
    points: Vec<Point>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Point {
    value: PointValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PointValue {
    int64_value: Option<serde_json::Value>,
    double_value: Option<f64>,
}

impl PointValue {
    // The REST API serializes INT64 values as JSON strings.
    fn as_f64(&self) -> f64 {
        match &self.int64_value {
            Some(serde_json::Value::String(raw)) => raw.parse().unwrap_or(0.0),
            Some(serde_json::Value::Number(number)) => number.as_f64().unwrap_or(0.0),
            _ => self.double_value.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricDescriptor {
    unit: String,
}

/// Fetch a metrics snapshot for one service. Never fails: on any error the
/// cached client handle is discarded and a zeroed snapshot is returned with
/// the failure attached.
pub async fn fetch_service_metrics(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
    window: TimeWindow,
) -> MetricsReport {
    match query_snapshot(handle, project_id, service_name, region, window).await {
        Ok(metrics) => MetricsReport {
            metrics,
            error: None,
        },
        Err(err) => {
            warn!("Metrics query for {} failed: {}", service_name, err);
            handle.invalidate().await;
            MetricsReport {
                metrics: ServiceMetricSnapshot::default(),
                error: Some(auth::describe_backend_error(&err.to_string())),
            }
        }
    }
}

async fn query_snapshot(
    handle: &GcpHandle,
    project_id: &str,
    service_name: &str,
    region: &str,
    window: TimeWindow,
) -> Result<ServiceMetricSnapshot, LauncherError> {
    let client = handle.acquire().await?;
    let latency_unit = resolve_latency_unit(handle, &client, project_id).await;

    let resource = resource_filter(service_name, region);
    let requests_filter = format!("metric.type=\"{}\" AND {}", REQUEST_COUNT_METRIC, resource);
    let errors_filter = format!(
        "metric.type=\"{}\" AND metric.labels.response_code_class=\"5xx\" AND {}",
        REQUEST_COUNT_METRIC, resource
    );
    let latency_filter = format!("metric.type=\"{}\" AND {}", LATENCY_METRIC, resource);
    let instance_filter = format!("metric.type=\"{}\" AND {}", INSTANCE_COUNT_METRIC, resource);
    let cpu_filter = format!("metric.type=\"{}\" AND {}", CPU_METRIC, resource);
    let memory_filter = format!("metric.type=\"{}\" AND {}", MEMORY_METRIC, resource);

    // One shared end time keeps every sub-query on the same interval.
    let end = Utc::now();
    let (requests, errors, p50, p95, p99, instances, cpu, memory) = tokio::try_join!(
        query_series(&client, project_id, &requests_filter, window, None, end),
        query_series(&client, project_id, &errors_filter, window, None, end),
        query_series(
            &client,
            project_id,
            &latency_filter,
            window,
            Some("ALIGN_PERCENTILE_50"),
            end
        ),
        query_series(
            &client,
            project_id,
            &latency_filter,
            window,
            Some("ALIGN_PERCENTILE_95"),
            end
        ),
        query_series(
            &client,
            project_id,
            &latency_filter,
            window,
            Some("ALIGN_PERCENTILE_99"),
            end
        ),
        query_series(&client, project_id, &instance_filter, window, None, end),
        query_series(
            &client,
            project_id,
            &cpu_filter,
            window,
            Some("ALIGN_PERCENTILE_50"),
            end
        ),
        query_series(
            &client,
            project_id,
            &memory_filter,
            window,
            Some("ALIGN_PERCENTILE_50"),
            end
        ),
    )?;

    let request_count = sum_all_points(&requests).round() as i64;
    let error_count = sum_all_points(&errors).round() as i64;

    Ok(ServiceMetricSnapshot {
        request_count,
        error_count,
        error_rate: error_rate(request_count, error_count),
        latency_p50_ms: latest_value_max(&p50).map(|value| to_millis(value, &latency_unit)),
        latency_p95_ms: latest_value_max(&p95).map(|value| to_millis(value, &latency_unit)),
        latency_p99_ms: latest_value_max(&p99).map(|value| to_millis(value, &latency_unit)),
        instance_count: latest_value_max(&instances)
            .map(|value| value.round() as i64)
            .unwrap_or(0),
        cpu_utilization: latest_value_max(&cpu),
        memory_utilization: latest_value_max(&memory),
    })
}

async fn query_series(
    client: &GcpClient,
    project_id: &str,
    filter: &str,
    window: TimeWindow,
    aligner: Option<&str>,
    end: DateTime<Utc>,
) -> Result<TimeSeriesResponse, LauncherError> {
    let url = time_series_url(project_id, filter, window, aligner, end)?;
    client.get_json(&url).await
}

fn time_series_url(
    project_id: &str,
    filter: &str,
    window: TimeWindow,
    aligner: Option<&str>,
    end: DateTime<Utc>,
) -> Result<String, LauncherError> {
    let start = end - window.duration();
    let mut url = url::Url::parse(&format!(
        "{}/v3/projects/{}/timeSeries",
        MONITORING_ENDPOINT, project_id
    ))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("filter", filter);
        pairs.append_pair(
            "interval.startTime",
            &start.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        pairs.append_pair(
            "interval.endTime",
            &end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        pairs.append_pair("view", "FULL");
        if let Some(aligner) = aligner {
            pairs.append_pair("aggregation.perSeriesAligner", aligner);
            pairs.append_pair("aggregation.alignmentPeriod", &window.alignment_period());
        }
    }
    Ok(url.to_string())
}

fn resource_filter(service_name: &str, region: &str) -> String {
    format!(
        "resource.type=\"cloud_run_revision\" AND resource.labels.service_name=\"{}\" AND resource.labels.location=\"{}\"",
        service_name, region
    )
}

/// Resolve the latency metric's unit from its descriptor, caching the result
/// on the handle. Descriptor units are static metadata, so the cache outlives
/// client resets.
async fn resolve_latency_unit(handle: &GcpHandle, client: &GcpClient, project_id: &str) -> String {
    if let Some(unit) = handle.cached_unit(LATENCY_METRIC).await {
        return unit;
    }

    let url = format!(
        "{}/v3/projects/{}/metricDescriptors/{}",
        MONITORING_ENDPOINT,
        project_id,
        LATENCY_METRIC.replace('/', "%2F")
    );
    match client.get_json::<MetricDescriptor>(&url).await {
        Ok(descriptor) if !descriptor.unit.is_empty() => {
            handle.remember_unit(LATENCY_METRIC, &descriptor.unit).await;
            descriptor.unit
        }
        Ok(_) => DEFAULT_LATENCY_UNIT.to_string(),
        Err(err) => {
            warn!("Failed to read latency metric descriptor: {}", err);
            handle.invalidate().await;
            DEFAULT_LATENCY_UNIT.to_string()
        }
    }
}

/// Sum every point of every series. Counting metrics may come back as several
/// aligned points per series when the alignment period is shorter than the
/// window, so taking only the first point undercounts.
fn sum_all_points(response: &TimeSeriesResponse) -> f64 {
    response
        .time_series
        .iter()
        .flat_map(|series| series.points.iter())
        .map(|point| point.value.as_f64())
        .sum()
}

/// Most recent value per series (the API orders points newest-first),
/// max-reduced across series.
fn latest_value_max(response: &TimeSeriesResponse) -> Option<f64> {
    response
        .time_series
        .iter()
        .filter_map(|series| series.points.first())
        .map(|point| point.value.as_f64())
        .fold(None, |best, value| match best {
            Some(current) if current >= value => Some(current),
            _ => Some(value),
        })
}

fn to_millis(value: f64, unit: &str) -> i64 {
    let millis = match unit {
        "s" => value * 1000.0,
        "us" => value / 1000.0,
        "ns" => value / 1_000_000.0,
        // "ms" and anything unrecognized pass through unscaled.
        _ => value,
    };
    millis.round() as i64
}

fn error_rate(request_count: i64, error_count: i64) -> f64 {
    if request_count == 0 {
        return 0.0;
    }
    error_count as f64 / request_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_series(groups: &[&[f64]]) -> TimeSeriesResponse {
        let series: Vec<serde_json::Value> = groups
            .iter()
            .map(|points| {
                let points: Vec<serde_json::Value> = points
                    .iter()
                    .map(|value| serde_json::json!({"value": {"doubleValue": value}}))
                    .collect();
                serde_json::json!({"points": points})
            })
            .collect();
        serde_json::from_value(serde_json::json!({"timeSeries": series})).unwrap()
    }

    #[test]
    fn sums_every_point_of_every_series() {
        let response = double_series(&[&[1.0, 2.0], &[3.0]]);
        assert_eq!(sum_all_points(&response), 6.0);
    }

    #[test]
    fn sums_int64_string_values() {
        let response: TimeSeriesResponse = serde_json::from_value(serde_json::json!({
            "timeSeries": [
                {"points": [{"value": {"int64Value": "120"}}, {"value": {"int64Value": "3"}}]},
                {"points": [{"value": {"int64Value": 7}}]}
            ]
        }))
        .unwrap();
        assert_eq!(sum_all_points(&response), 130.0);
    }

    #[test]
    fn empty_response_sums_to_zero() {
        let response: TimeSeriesResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(sum_all_points(&response), 0.0);
        assert_eq!(latest_value_max(&response), None);
    }

    #[test]
    fn latest_value_takes_first_point_max_across_series() {
        // Points are newest-first, so 5.0 and 3.0 are the current values.
        let response = double_series(&[&[5.0, 2.0], &[3.0, 9.0]]);
        assert_eq!(latest_value_max(&response), Some(5.0));
    }

    #[test]
    fn unit_conversion_to_milliseconds() {
        assert_eq!(to_millis(1.0, "s"), 1000);
        assert_eq!(to_millis(1.0, "ms"), 1);
        assert_eq!(to_millis(1.0, "us"), 0);
        assert_eq!(to_millis(1.0, "ns"), 0);
        assert_eq!(to_millis(1500.0, "us"), 2);
        assert_eq!(to_millis(0.25, "s"), 250);
        // Unknown units pass through as already-milliseconds.
        assert_eq!(to_millis(42.4, "10^2.%"), 42);
    }

    #[test]
    fn error_rate_is_zero_without_requests() {
        assert_eq!(error_rate(0, 0), 0.0);
        assert_eq!(error_rate(0, 5), 0.0);
        assert_eq!(error_rate(10, 2), 0.2);
    }

    #[test]
    fn window_serde_uses_short_labels() {
        let window: TimeWindow = serde_json::from_str("\"24h\"").unwrap();
        assert_eq!(window, TimeWindow::LastDay);
        assert_eq!(serde_json::to_string(&TimeWindow::LastWeek).unwrap(), "\"7d\"");
        assert_eq!(TimeWindow::default(), TimeWindow::LastHour);
    }

    #[test]
    fn window_durations() {
        assert_eq!(TimeWindow::LastHour.duration().num_seconds(), 3600);
        assert_eq!(TimeWindow::LastWeek.duration().num_days(), 7);
        assert_eq!(TimeWindow::LastSixHours.alignment_period(), "21600s");
    }

    #[test]
    fn time_series_url_carries_interval_and_aligner() {
        let end = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let url = time_series_url(
            "demo-project",
            "metric.type=\"run.googleapis.com/request_latencies\"",
            TimeWindow::LastHour,
            Some("ALIGN_PERCENTILE_95"),
            end,
        )
        .unwrap();

        assert!(url.starts_with("https://monitoring.googleapis.com/v3/projects/demo-project/timeSeries?"));
        assert!(url.contains("interval.startTime=2024-05-01T11%3A00%3A00Z"));
        assert!(url.contains("interval.endTime=2024-05-01T12%3A00%3A00Z"));
        assert!(url.contains("aggregation.perSeriesAligner=ALIGN_PERCENTILE_95"));
        assert!(url.contains("aggregation.alignmentPeriod=3600s"));
    }

    #[test]
    fn counter_queries_carry_no_aligner() {
        let url = time_series_url(
            "demo-project",
            "metric.type=\"run.googleapis.com/request_count\"",
            TimeWindow::LastHour,
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(!url.contains("perSeriesAligner"));
    }

    #[test]
    fn default_snapshot_is_fully_zeroed() {
        let snapshot = ServiceMetricSnapshot::default();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.latency_p50_ms, None);
        assert_eq!(snapshot.instance_count, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = ServiceMetricSnapshot {
            request_count: 3,
            latency_p95_ms: Some(120),
            ..ServiceMetricSnapshot::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["requestCount"], 3);
        assert_eq!(value["latencyP95Ms"], 120);
        assert!(value.get("cpuUtilization").is_none());
    }
}
