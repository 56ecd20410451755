//! Time-series backends queried for historical container usage

pub mod cloud_monitoring;

pub use cloud_monitoring::{CloudMonitoringBackend, CloudMonitoringConfig};

use crate::error::Result;
use crate::models::{MetricJob, MetricKind, Point, TimeWindow};
use async_trait::async_trait;

/// Selects the series of one container for one metric kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub container_name: String,
    pub pod_uid: String,
    pub kind: MetricKind,
}

impl SeriesQuery {
    pub fn for_job(job: &MetricJob) -> Self {
        Self {
            container_name: job.container_name.clone(),
            pod_uid: job.pod_uid.clone(),
            kind: job.kind,
        }
    }
}

/// Source of raw samples for a container over a time range.
///
/// Implementations are shared by all pipeline workers and must be safe
/// for concurrent use. Points may come back in any order.
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// All samples of the selected series whose end time lies in `window`
    async fn query_range(&self, query: &SeriesQuery, window: &TimeWindow) -> Result<Vec<Point>>;

    /// Short backend identifier used in logs
    fn name(&self) -> &'static str;
}
