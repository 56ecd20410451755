//! Bounded worker pool that turns metric jobs into summaries
//!
//! One dispatcher task feeds a bounded job queue and closes it after the
//! last enqueue. N workers share the queue, query the backend, reduce the
//! samples and send one result per job. The result channel closes when the
//! last worker drops its sender, which is what ends collection.

use crate::error::{Error, Result};
use crate::models::{ContainerMetricsSummary, MetricJob};
use crate::observability::{JobOutcome, PipelineMetrics, StructuredLogger};
use crate::stats;
use crate::timeseries::{SeriesQuery, TimeSeriesBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Configuration for the metrics pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers (default: 5)
    pub workers: usize,
    /// Capacity of the job queue
    pub job_buffer: usize,
    /// Capacity of the result channel
    pub result_buffer: usize,
    /// Upper bound on a single backend query (default: 30 seconds)
    pub query_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            job_buffer: 16,
            result_buffer: 64,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// One entry per job that was not cancelled, in completion order
    pub summaries: Vec<ContainerMetricsSummary>,
    pub ok: usize,
    pub no_data: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PipelineOutcome {
    pub fn total(&self) -> usize {
        self.ok + self.no_data + self.failed + self.cancelled
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    fn record(&mut self, result: JobResult) {
        match result.outcome {
            JobOutcome::Ok => self.ok += 1,
            JobOutcome::NoData => self.no_data += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
        if let Some(summary) = result.summary {
            self.summaries.push(summary);
        }
    }
}

/// What a worker reports for one job
#[derive(Debug)]
struct JobResult {
    outcome: JobOutcome,
    summary: Option<ContainerMetricsSummary>,
}

/// State shared read-only by all workers of a run
struct WorkerContext {
    backend: Arc<dyn TimeSeriesBackend>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
    query_timeout: Duration,
}

/// Fan-out/fan-in collector of historical metrics
pub struct MetricsPipeline {
    backend: Arc<dyn TimeSeriesBackend>,
    config: PipelineConfig,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl MetricsPipeline {
    pub fn new(
        backend: Arc<dyn TimeSeriesBackend>,
        config: PipelineConfig,
        metrics: PipelineMetrics,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".into()));
        }
        let logger = StructuredLogger::new(backend.name());

        Ok(Self {
            backend,
            config,
            metrics,
            logger,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Run every job to exactly one outcome.
    ///
    /// When `shutdown` flips to `true`, in-flight queries are abandoned and
    /// the remaining queue is drained as cancelled; the summaries finished
    /// so far are still returned.
    #[instrument(skip_all, fields(jobs = jobs.len(), workers = self.config.workers))]
    pub async fn run(
        &self,
        jobs: Vec<MetricJob>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<PipelineOutcome> {
        let total = jobs.len();
        let started = Instant::now();
        let workers = self.config.workers.min(total.max(1));
        self.logger.log_pipeline_started(total, workers);

        let (job_tx, job_rx) = mpsc::channel::<MetricJob>(self.config.job_buffer.max(1));
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(self.config.result_buffer.max(1));

        let dispatcher = tokio::spawn(async move {
            for job in jobs {
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
            // job_tx drops here, after the last enqueue
        });

        let context = Arc::new(WorkerContext {
            backend: self.backend.clone(),
            metrics: self.metrics.clone(),
            logger: self.logger.clone(),
            query_timeout: self.config.query_timeout,
        });
        let job_rx = Arc::new(Mutex::new(job_rx));

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    context.clone(),
                    job_rx.clone(),
                    result_tx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        let mut outcome = PipelineOutcome::default();
        while let Some(result) = result_rx.recv().await {
            self.metrics.record_outcome(result.outcome);
            outcome.record(result);
        }

        dispatcher.await.map_err(join_error)?;
        for handle in handles {
            handle.await.map_err(join_error)?;
        }

        if outcome.total() != total {
            return Err(Error::Pipeline(format!(
                "{} jobs submitted but {} accounted for",
                total,
                outcome.total()
            )));
        }

        self.logger.log_pipeline_finished(
            outcome.ok,
            outcome.no_data,
            outcome.failed,
            outcome.cancelled,
            started.elapsed(),
        );
        Ok(outcome)
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Pipeline(format!("worker task failed: {}", e))
}

async fn worker(
    id: usize,
    context: Arc<WorkerContext>,
    jobs: Arc<Mutex<mpsc::Receiver<MetricJob>>>,
    results: mpsc::Sender<JobResult>,
    mut shutdown: Option<watch::Receiver<bool>>,
) {
    let mut processed = 0usize;

    loop {
        let next = jobs.lock().await.recv().await;
        let Some(job) = next else { break };

        let result = if is_shutdown(&shutdown) {
            cancelled(&context, &job)
        } else {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => cancelled(&context, &job),
                result = process(&context, &job) => result,
            }
        };

        processed += 1;
        if results.send(result).await.is_err() {
            break;
        }
    }

    debug!(worker = id, processed = processed, "Worker finished");
}

async fn process(context: &WorkerContext, job: &MetricJob) -> JobResult {
    let query = SeriesQuery::for_job(job);
    let started = Instant::now();
    let fetched = tokio::time::timeout(
        context.query_timeout,
        context.backend.query_range(&query, &job.window),
    )
    .await;
    context.metrics.observe_query(started.elapsed());

    let points = match fetched {
        Ok(Ok(points)) => points,
        Ok(Err(e)) => return no_data(context, job, JobOutcome::Failed, e),
        Err(_) => {
            let e = Error::Timeout {
                after: context.query_timeout,
            };
            return no_data(context, job, JobOutcome::Failed, e);
        }
    };

    match stats::summarize(job.kind, points) {
        Ok(stats) => {
            context.metrics.add_data_points(stats.data_points);
            JobResult {
                outcome: JobOutcome::Ok,
                summary: Some(ContainerMetricsSummary::from_stats(job, stats)),
            }
        }
        Err(e) => no_data(context, job, JobOutcome::NoData, e),
    }
}

fn no_data(context: &WorkerContext, job: &MetricJob, outcome: JobOutcome, error: Error) -> JobResult {
    context.logger.log_job_failed(job, outcome, &error);
    JobResult {
        outcome,
        summary: Some(ContainerMetricsSummary::no_data(job, error.to_string())),
    }
}

fn cancelled(context: &WorkerContext, job: &MetricJob) -> JobResult {
    context.logger.log_job_cancelled(job);
    JobResult {
        outcome: JobOutcome::Cancelled,
        summary: None,
    }
}

fn is_shutdown(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Resolves once shutdown is signalled; never resolves without a signal
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without signalling
            return std::future::pending().await;
        }
    }
}

/// Builder for [`MetricsPipeline`]
pub struct MetricsPipelineBuilder {
    backend: Option<Arc<dyn TimeSeriesBackend>>,
    metrics: Option<PipelineMetrics>,
    config: PipelineConfig,
}

impl MetricsPipelineBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            metrics: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn TimeSeriesBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    pub fn job_buffer(mut self, size: usize) -> Self {
        self.config.job_buffer = size;
        self
    }

    pub fn build(self) -> Result<MetricsPipeline> {
        let backend = self
            .backend
            .ok_or_else(|| Error::Config("a time-series backend is required".into()))?;
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => PipelineMetrics::new()?,
        };

        info!(
            backend = backend.name(),
            workers = self.config.workers,
            query_timeout_secs = self.config.query_timeout.as_secs(),
            "Creating metrics pipeline"
        );
        MetricsPipeline::new(backend, self.config, metrics)
    }
}

impl Default for MetricsPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
