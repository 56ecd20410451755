//! Cloud Monitoring v3 REST client for GKE container metrics

use super::{SeriesQuery, TimeSeriesBackend};
use crate::error::{Error, Result};
use crate::models::{MetricKind, Point, PointValue, TimeWindow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com/";

const CPU_METRIC: &str = "container.googleapis.com/container/cpu/usage_time";
const MEMORY_METRIC: &str = "container.googleapis.com/container/memory/bytes_used";

/// Connection settings for [`CloudMonitoringBackend`]
#[derive(Debug, Clone)]
pub struct CloudMonitoringConfig {
    pub project: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt
    pub retry_backoff: Duration,
}

impl Default for CloudMonitoringConfig {
    fn default() -> Self {
        Self {
            project: None,
            access_token: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

pub struct CloudMonitoringBackend {
    client: Client,
    series_url: Url,
    access_token: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for CloudMonitoringBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudMonitoringBackend")
            .field("series_url", &self.series_url.as_str())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl CloudMonitoringBackend {
    /// Validate configuration and build the HTTP client.
    ///
    /// Fails with [`Error::Config`] before any request is made.
    pub fn new(config: CloudMonitoringConfig) -> Result<Self> {
        let project = non_empty(config.project)
            .ok_or_else(|| Error::Config("a monitoring project is required (--project or KRE_PROJECT)".into()))?;
        let access_token = non_empty(config.access_token)
            .ok_or_else(|| Error::Config("an access token is required (KRE_ACCESS_TOKEN)".into()))?;

        let mut base = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("invalid monitoring endpoint {:?}: {}", config.endpoint, e)))?;
        // Keep the last path segment of prefixed endpoints when joining.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let series_url = base
            .join(&format!("v3/projects/{}/timeSeries", project))
            .map_err(|e| Error::Config(format!("invalid monitoring project {:?}: {}", project, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            series_url,
            access_token,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    async fn fetch_page(
        &self,
        filter: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<ListTimeSeriesResponse> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(4);
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        params.push(("filter", filter.to_string()));
        params.push(("interval.startTime", rfc3339(window.start)));
        params.push(("interval.endTime", rfc3339(window.end)));

        let mut attempt = 0u32;
        loop {
            match self.send(&params).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying time-series request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, params: &[(&str, String)]) -> Result<ListTimeSeriesResponse> {
        let response = self
            .client
            .get(self.series_url.clone())
            .bearer_auth(&self.access_token)
            .query(params)
            .send()
            .await
            .map_err(|source| Error::Http {
                context: "send time-series request".into(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|source| Error::Http {
            context: "read time-series response".into(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl TimeSeriesBackend for CloudMonitoringBackend {
    async fn query_range(&self, query: &SeriesQuery, window: &TimeWindow) -> Result<Vec<Point>> {
        let filter = build_filter(query);
        debug!(filter = %filter, "Querying time series");

        let mut points = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(&filter, window, page_token.as_deref()).await?;
            for series in page.time_series {
                for point in series.points {
                    points.push(point.into_point()?);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(
            container = %query.container_name,
            pod_uid = %query.pod_uid,
            points = points.len(),
            "Time series fetched"
        );
        Ok(points)
    }

    fn name(&self) -> &'static str {
        "cloud-monitoring"
    }
}

/// Filter expression with clauses in a fixed order
pub fn build_filter(query: &SeriesQuery) -> String {
    let mut clauses: Vec<(&str, &str)> = Vec::with_capacity(4);
    match query.kind {
        MetricKind::Cpu => clauses.push(("metric.type", CPU_METRIC)),
        MetricKind::Memory => {
            clauses.push(("metric.type", MEMORY_METRIC));
            clauses.push(("metric.label.memory_type", "non-evictable"));
        }
    }
    clauses.push(("resource.label.container_name", &query.container_name));
    clauses.push(("resource.label.pod_id", &query.pod_uid));

    clauses
        .iter()
        .map(|(key, value)| format!("{} = \"{}\"", key, escape(value)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<TimeSeries>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    points: Vec<ApiPoint>,
}

#[derive(Debug, Deserialize)]
struct ApiPoint {
    interval: ApiInterval,
    value: TypedValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInterval {
    end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    int64_value: Option<Int64Repr>,
    double_value: Option<f64>,
}

// int64 travels as a JSON string, but accept plain numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Number(i64),
    Text(String),
}

impl ApiPoint {
    fn into_point(self) -> Result<Point> {
        let value = match (self.value.int64_value, self.value.double_value) {
            (Some(Int64Repr::Number(v)), _) => PointValue::Int64(v),
            (Some(Int64Repr::Text(s)), _) => PointValue::Int64(s.parse().map_err(|_| {
                Error::MalformedResponse(format!("int64Value {:?} is not an integer", s))
            })?),
            (None, Some(v)) if v.is_finite() => PointValue::Double(v),
            (None, Some(v)) => {
                return Err(Error::MalformedResponse(format!("non-finite doubleValue {}", v)))
            }
            (None, None) => {
                return Err(Error::MalformedResponse(
                    "point has neither int64Value nor doubleValue".into(),
                ))
            }
        };

        Ok(Point {
            end_time: self.interval.end_time,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn window() -> TimeWindow {
        TimeWindow {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap(),
        }
    }

    fn query(kind: MetricKind) -> SeriesQuery {
        SeriesQuery {
            container_name: "app".into(),
            pod_uid: "1234-abcd".into(),
            kind,
        }
    }

    fn backend(endpoint: &str, max_retries: u32) -> CloudMonitoringBackend {
        CloudMonitoringBackend::new(CloudMonitoringConfig {
            project: Some("demo".into()),
            access_token: Some("secret".into()),
            endpoint: endpoint.to_string(),
            request_timeout: Duration::from_secs(5),
            max_retries,
            retry_backoff: Duration::from_millis(1),
        })
        .unwrap()
    }

    #[test]
    fn test_cpu_filter() {
        assert_eq!(
            build_filter(&query(MetricKind::Cpu)),
            "metric.type = \"container.googleapis.com/container/cpu/usage_time\" AND \
             resource.label.container_name = \"app\" AND \
             resource.label.pod_id = \"1234-abcd\""
        );
    }

    #[test]
    fn test_memory_filter_selects_non_evictable() {
        let filter = build_filter(&query(MetricKind::Memory));
        assert!(filter.starts_with(
            "metric.type = \"container.googleapis.com/container/memory/bytes_used\" AND \
             metric.label.memory_type = \"non-evictable\""
        ));
    }

    #[test]
    fn test_filter_escapes_quotes() {
        let mut q = query(MetricKind::Cpu);
        q.container_name = "we\"ird".into();
        assert!(build_filter(&q).contains("container_name = \"we\\\"ird\""));
    }

    #[test]
    fn test_missing_project_is_config_error() {
        let err = CloudMonitoringBackend::new(CloudMonitoringConfig {
            access_token: Some("t".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let err = CloudMonitoringBackend::new(CloudMonitoringConfig {
            project: Some("demo".into()),
            access_token: Some("  ".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = CloudMonitoringBackend::new(CloudMonitoringConfig {
            project: Some("demo".into()),
            access_token: Some("t".into()),
            endpoint: "not a url".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_endpoint_path_prefix_is_kept() {
        for endpoint in ["https://proxy.internal/monitoring", "https://proxy.internal/monitoring/"] {
            let backend = CloudMonitoringBackend::new(CloudMonitoringConfig {
                project: Some("demo".into()),
                access_token: Some("t".into()),
                endpoint: endpoint.into(),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(
                backend.series_url.as_str(),
                "https://proxy.internal/monitoring/v3/projects/demo/timeSeries"
            );
        }

        let backend = CloudMonitoringBackend::new(CloudMonitoringConfig {
            project: Some("demo".into()),
            access_token: Some("t".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            backend.series_url.as_str(),
            "https://monitoring.googleapis.com/v3/projects/demo/timeSeries"
        );
    }

    #[tokio::test]
    async fn test_query_parses_int_and_double_points() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_header("authorization", "Bearer secret")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("interval.startTime".into(), "2024-01-01T00:00:00.000000000Z".into()),
                Matcher::UrlEncoded("interval.endTime".into(), "2024-01-01T04:00:00.000000000Z".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "timeSeries": [
                        {"points": [
                            {"interval": {"endTime": "2024-01-01T00:01:00Z"}, "value": {"int64Value": "1048576"}},
                            {"interval": {"endTime": "2024-01-01T00:02:00Z"}, "value": {"int64Value": 2048}}
                        ]},
                        {"points": [
                            {"interval": {"endTime": "2024-01-01T00:03:00Z"}, "value": {"doubleValue": 1.5}}
                        ]}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let points = backend(&server.url(), 0)
            .query_range(&query(MetricKind::Memory), &window())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].value, PointValue::Int64(1_048_576));
        assert_eq!(points[1].value, PointValue::Int64(2048));
        assert_eq!(points[2].value, PointValue::Double(1.5));
    }

    #[tokio::test]
    async fn test_query_follows_page_tokens() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Regex("^filter=".into()))
            .with_status(200)
            .with_body(
                r#"{"timeSeries": [{"points": [
                    {"interval": {"endTime": "2024-01-01T00:01:00Z"}, "value": {"doubleValue": 10.0}}
                ]}], "nextPageToken": "page-2"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Regex("^pageToken=page-2&".into()))
            .with_status(200)
            .with_body(
                r#"{"timeSeries": [{"points": [
                    {"interval": {"endTime": "2024-01-01T00:02:00Z"}, "value": {"doubleValue": 20.0}}
                ]}], "nextPageToken": ""}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let points = backend(&server.url(), 0)
            .query_range(&query(MetricKind::Cpu), &window())
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(points.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_response_yields_no_points() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let points = backend(&server.url(), 0)
            .query_range(&query(MetricKind::Cpu), &window())
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .expect(3)
            .create_async()
            .await;

        let err = backend(&server.url(), 2)
            .query_range(&query(MetricKind::Cpu), &window())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::BackendStatus { status: 503, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("denied")
            .expect(1)
            .create_async()
            .await;

        let err = backend(&server.url(), 5)
            .query_range(&query(MetricKind::Cpu), &window())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::BackendStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v3/projects/demo/timeSeries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"timeSeries": [{"points": [{"interval": {"endTime": "2024-01-01T00:01:00Z"}, "value": {}}]}]}"#)
            .create_async()
            .await;

        let err = backend(&server.url(), 0)
            .query_range(&query(MetricKind::Cpu), &window())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
