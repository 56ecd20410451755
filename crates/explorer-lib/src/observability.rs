//! Observability for explorer runs
//!
//! Provides:
//! - Prometheus metrics for the collection pipeline, kept in a per-run registry
//! - Structured event logging with tracing

use crate::error::{Error, Result};
use crate::models::MetricJob;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for backend query latency (in seconds)
const QUERY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// How a pipeline job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    /// Statistics were produced
    Ok,
    /// The backend answered but the samples could not be summarized
    NoData,
    /// The backend query failed or timed out
    Failed,
    /// Shutdown was requested before the job finished
    Cancelled,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Ok => "ok",
            JobOutcome::NoData => "no_data",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

struct PipelineMetricsInner {
    registry: Registry,
    backend_query_seconds: Histogram,
    jobs_total: IntCounterVec,
    data_points_total: IntCounter,
}

/// Metrics handle for one run; clones share the same registry
#[derive(Clone)]
pub struct PipelineMetrics {
    inner: Arc<PipelineMetricsInner>,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let backend_query_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "kre_backend_query_seconds",
                "Time spent in time-series backend queries",
            )
            .buckets(QUERY_BUCKETS.to_vec()),
        )
        .map_err(metrics_error)?;
        let jobs_total = IntCounterVec::new(
            Opts::new("kre_pipeline_jobs_total", "Pipeline jobs by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let data_points_total = IntCounter::new(
            "kre_data_points_total",
            "Raw samples consumed by the aggregator",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(backend_query_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(jobs_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(data_points_total.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            inner: Arc::new(PipelineMetricsInner {
                registry,
                backend_query_seconds,
                jobs_total,
                data_points_total,
            }),
        })
    }

    pub fn observe_query(&self, elapsed: Duration) {
        self.inner.backend_query_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_outcome(&self, outcome: JobOutcome) {
        self.inner
            .jobs_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn add_data_points(&self, count: u64) {
        self.inner.data_points_total.inc_by(count);
    }

    pub fn jobs(&self, outcome: JobOutcome) -> u64 {
        self.inner
            .jobs_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    pub fn data_points(&self) -> u64 {
        self.inner.data_points_total.get()
    }

    /// Prometheus text exposition of every metric in this run
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Pipeline(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Pipeline(format!("metrics: {}", e))
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    backend: String,
}

impl StructuredLogger {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }

    pub fn log_pipeline_started(&self, jobs: usize, workers: usize) {
        info!(
            event = "pipeline_started",
            backend = %self.backend,
            jobs = jobs,
            workers = workers,
            "Collecting historical metrics"
        );
    }

    pub fn log_job_failed(&self, job: &MetricJob, outcome: JobOutcome, error: &Error) {
        error!(
            event = "job_failed",
            backend = %self.backend,
            namespace = %job.namespace,
            pod = %job.pod_name,
            container = %job.container_name,
            kind = %job.kind,
            outcome = outcome.as_str(),
            error = %error,
            "Metrics job produced no data"
        );
    }

    pub fn log_job_cancelled(&self, job: &MetricJob) {
        warn!(
            event = "job_cancelled",
            namespace = %job.namespace,
            pod = %job.pod_name,
            container = %job.container_name,
            kind = %job.kind,
            "Metrics job cancelled"
        );
    }

    pub fn log_pipeline_finished(
        &self,
        ok: usize,
        no_data: usize,
        failed: usize,
        cancelled: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "pipeline_finished",
            backend = %self.backend,
            ok = ok,
            no_data = no_data,
            failed = failed,
            cancelled = cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "Metrics collection finished"
        );
    }

    pub fn log_report_ready(&self, report: &str, rows: usize, data_points: u64) {
        info!(
            event = "report_ready",
            report = report,
            rows = rows,
            data_points = data_points,
            "Report assembled"
        );
    }
}
