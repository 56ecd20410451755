//! Report entry points tying inventory, pipeline and ranking together

use crate::collector::MetricsPipeline;
use crate::error::{Error, Result};
use crate::inventory::ClusterInventory;
use crate::models::{
    ClusterCapacity, ContainerMetricsSummary, ContainerResourceRow, MetricJob, MetricKind,
    NodeCapacity, TimeWindow,
};
use crate::observability::StructuredLogger;
use crate::ranking::{rank, validate_field};
use crate::report::{AllocationReport, MetricsReport};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument};

/// Default ranking field of the allocation report
pub const DEFAULT_ALLOCATION_SORT: &str = "CpuReq";
/// Default ranking field of historical reports
pub const DEFAULT_HISTORY_SORT: &str = "Max";

/// Selection and ordering for the allocation report
#[derive(Debug, Clone)]
pub struct AllocationQuery {
    pub namespace: Option<String>,
    pub node: Option<String>,
    pub sort: String,
    pub reverse: bool,
}

impl Default for AllocationQuery {
    fn default() -> Self {
        Self {
            namespace: None,
            node: None,
            sort: DEFAULT_ALLOCATION_SORT.to_string(),
            reverse: false,
        }
    }
}

impl AllocationQuery {
    pub fn validate(&self) -> Result<()> {
        validate_field::<ContainerResourceRow>(&self.sort)
    }
}

/// Selection, window and ordering for historical reports
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub namespace: Option<String>,
    pub node: Option<String>,
    pub kinds: Vec<MetricKind>,
    pub duration: Duration,
    pub sort: String,
    pub reverse: bool,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            namespace: None,
            node: None,
            kinds: vec![MetricKind::Cpu],
            duration: Duration::from_secs(4 * 3600),
            sort: DEFAULT_HISTORY_SORT.to_string(),
            reverse: false,
        }
    }
}

impl HistoryQuery {
    pub fn validate(&self) -> Result<()> {
        validate_field::<ContainerMetricsSummary>(&self.sort)?;
        if self.kinds.is_empty() {
            return Err(Error::Config("at least one metric kind must be selected".into()));
        }
        if self.duration.is_zero() {
            return Err(Error::Config("the history window must be longer than zero".into()));
        }
        Ok(())
    }

    /// Selected kinds, CPU first, without duplicates
    fn ordered_kinds(&self) -> Vec<MetricKind> {
        [MetricKind::Cpu, MetricKind::Memory]
            .into_iter()
            .filter(|k| self.kinds.contains(k))
            .collect()
    }
}

/// One ranked table per selected metric kind, over a shared window
#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub window: TimeWindow,
    pub reports: Vec<MetricsReport>,
    pub ok: usize,
    pub no_data: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Builds allocation and historical reports for a cluster
pub struct Explorer {
    inventory: Arc<dyn ClusterInventory>,
    logger: StructuredLogger,
}

impl Explorer {
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self {
            inventory,
            logger: StructuredLogger::new("inventory"),
        }
    }

    /// Requests and limits of every active container, ranked.
    ///
    /// Row percentages are against the row's node; totals are against the
    /// nodes in scope (all nodes, or only `query.node`).
    #[instrument(skip(self))]
    pub async fn allocations(&self, query: &AllocationQuery) -> Result<AllocationReport> {
        query.validate()?;

        let nodes = self.inventory.list_nodes().await?;
        let in_scope: Vec<NodeCapacity> = match &query.node {
            Some(name) => nodes.iter().filter(|n| &n.name == name).cloned().collect(),
            None => nodes.clone(),
        };
        let capacity = ClusterCapacity::from_nodes(&in_scope);
        let by_name: HashMap<&str, &NodeCapacity> =
            nodes.iter().map(|n| (n.name.as_str(), n)).collect();

        let containers = self
            .inventory
            .list_active_containers(query.namespace.as_deref(), query.node.as_deref())
            .await?;

        let mut rows: Vec<ContainerResourceRow> = containers
            .iter()
            .map(|c| ContainerResourceRow::new(c, by_name.get(c.node_name.as_str()).copied()))
            .collect();
        rank(&mut rows, &query.sort, query.reverse)?;

        let report = AllocationReport::new(rows, capacity);
        self.logger.log_report_ready("allocation", report.rows.len(), 0);
        Ok(report)
    }

    /// Historical usage for every active container and selected kind.
    ///
    /// All jobs share one window ending now. Per-job failures show up as
    /// no-data rows; a shutdown signal stops collection early and the
    /// finished rows are still reported.
    #[instrument(skip(self, pipeline, shutdown))]
    pub async fn history(
        &self,
        pipeline: &MetricsPipeline,
        query: &HistoryQuery,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<HistoryReport> {
        query.validate()?;
        let kinds = query.ordered_kinds();

        let containers = self
            .inventory
            .list_active_containers(query.namespace.as_deref(), query.node.as_deref())
            .await?;

        let window = TimeWindow::ending_at(Utc::now(), query.duration);
        let jobs: Vec<MetricJob> = kinds
            .iter()
            .flat_map(|kind| containers.iter().map(move |c| MetricJob::new(c, *kind, window)))
            .collect();
        info!(
            containers = containers.len(),
            jobs = jobs.len(),
            window_secs = query.duration.as_secs(),
            "Dispatching metric jobs"
        );

        let outcome = pipeline.run(jobs, shutdown).await?;

        let mut by_kind: HashMap<MetricKind, Vec<ContainerMetricsSummary>> = HashMap::new();
        for summary in outcome.summaries {
            by_kind.entry(summary.kind).or_default().push(summary);
        }

        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let mut summaries = by_kind.remove(&kind).unwrap_or_default();
            rank(&mut summaries, &query.sort, query.reverse)?;
            let report = MetricsReport::new(kind, window, summaries);
            self.logger.log_report_ready(
                &format!("history-{}", kind),
                report.summaries.len(),
                report.total_data_points,
            );
            reports.push(report);
        }

        Ok(HistoryReport {
            window,
            reports,
            ok: outcome.ok,
            no_data: outcome.no_data,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
        })
    }
}
