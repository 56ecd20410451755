//! Pipeline tests against in-memory backends
//!
//! The mock backend serves a fixed series per metric kind and can be told
//! to fail, return nothing, or stall, based on the container name.

#[cfg(test)]
mod pipeline_tests {
    use crate::collector::{MetricsPipeline, MetricsPipelineBuilder, PipelineConfig};
    use crate::error::{Error, Result};
    use crate::models::{ActiveContainer, MetricJob, MetricKind, Point, TimeWindow};
    use crate::observability::{JobOutcome, PipelineMetrics};
    use crate::timeseries::{SeriesQuery, TimeSeriesBackend};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Default)]
    struct MockBackend {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockBackend {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TimeSeriesBackend for MockBackend {
        async fn query_range(&self, query: &SeriesQuery, window: &TimeWindow) -> Result<Vec<Point>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if query.container_name.starts_with("bad") {
                return Err(Error::BackendStatus {
                    status: 403,
                    body: "permission denied".into(),
                });
            }
            if query.container_name.starts_with("empty") {
                return Ok(Vec::new());
            }

            let at = |minutes_ago: i64| window.end - ChronoDuration::minutes(minutes_ago);
            Ok(match query.kind {
                // 0.5 then 1 core
                MetricKind::Cpu => vec![
                    Point::double(at(0), 90.0),
                    Point::double(at(2), 0.0),
                    Point::double(at(1), 30.0),
                ],
                MetricKind::Memory => vec![
                    Point::int(at(2), 100),
                    Point::int(at(1), 200),
                    Point::int(at(0), 200),
                ],
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn jobs(containers: &[&str], kinds: &[MetricKind]) -> Vec<MetricJob> {
        let window = TimeWindow::ending_at(Utc::now(), Duration::from_secs(4 * 3600));
        let mut jobs = Vec::new();
        for (i, name) in containers.iter().enumerate() {
            let container = ActiveContainer {
                namespace: "default".into(),
                pod_name: format!("pod-{}", i),
                pod_uid: format!("uid-{}", i),
                node_name: "node-a".into(),
                container_name: name.to_string(),
                ..Default::default()
            };
            for kind in kinds {
                jobs.push(MetricJob::new(&container, *kind, window));
            }
        }
        jobs
    }

    fn pipeline(backend: Arc<MockBackend>, config: PipelineConfig) -> MetricsPipeline {
        MetricsPipeline::new(backend, config, PipelineMetrics::new().unwrap()).unwrap()
    }

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            workers,
            ..Default::default()
        }
    }

    const BOTH: &[MetricKind] = &[MetricKind::Cpu, MetricKind::Memory];

    #[tokio::test]
    async fn test_every_job_yields_exactly_one_result() {
        let names: Vec<String> = (0..20)
            .map(|i| match i % 5 {
                0 => format!("bad-{}", i),
                1 => format!("empty-{}", i),
                _ => format!("app-{}", i),
            })
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let jobs = jobs(&names, BOTH);
        let backend = Arc::new(MockBackend::default());

        let outcome = pipeline(backend.clone(), config(3)).run(jobs, None).await.unwrap();

        assert_eq!(outcome.summaries.len(), 40);
        assert_eq!(outcome.ok, 24);
        assert_eq!(outcome.failed, 8);
        assert_eq!(outcome.no_data, 8);
        assert_eq!(outcome.cancelled, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 40);

        let unique: HashSet<_> = outcome
            .summaries
            .iter()
            .map(|s| (s.pod_name.clone(), s.kind))
            .collect();
        assert_eq!(unique.len(), 40);
    }

    #[tokio::test]
    async fn test_summaries_carry_statistics() {
        let outcome = pipeline(Arc::new(MockBackend::default()), config(2))
            .run(jobs(&["app"], BOTH), None)
            .await
            .unwrap();

        let cpu = outcome
            .summaries
            .iter()
            .find(|s| s.kind == MetricKind::Cpu)
            .and_then(|s| s.stats)
            .unwrap();
        assert_eq!((cpu.min, cpu.max, cpu.central, cpu.last), (500, 1000, 750, 1000));
        assert_eq!(cpu.data_points, 3);

        let memory = outcome
            .summaries
            .iter()
            .find(|s| s.kind == MetricKind::Memory)
            .and_then(|s| s.stats)
            .unwrap();
        assert_eq!((memory.min, memory.max, memory.central), (100, 200, 200));
    }

    #[tokio::test]
    async fn test_failed_jobs_become_no_data_rows() {
        let outcome = pipeline(Arc::new(MockBackend::default()), config(1))
            .run(jobs(&["bad-one"], &[MetricKind::Memory]), None)
            .await
            .unwrap();

        let summary = &outcome.summaries[0];
        assert!(!summary.has_data());
        assert_eq!(summary.container_name, "bad-one");
        assert!(summary.note.as_deref().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_worker_concurrency_is_bounded() {
        let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(20)));
        let names: Vec<String> = (0..16).map(|i| format!("app-{}", i)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();

        let outcome = pipeline(backend.clone(), config(4))
            .run(jobs(&names, &[MetricKind::Cpu]), None)
            .await
            .unwrap();

        assert_eq!(outcome.ok, 16);
        let peak = backend.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak concurrency {}", peak);
        assert!(peak >= 2, "workers did not overlap");
    }

    #[tokio::test]
    async fn test_slow_queries_time_out_per_job() {
        let backend = Arc::new(MockBackend::with_delay(Duration::from_secs(10)));
        let config = PipelineConfig {
            workers: 3,
            query_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let outcome = pipeline(backend, config)
            .run(jobs(&["a", "b", "c"], &[MetricKind::Cpu]), None)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.summaries.len(), 3);
        assert!(outcome
            .summaries
            .iter()
            .all(|s| s.note.as_deref().unwrap_or("").contains("timed out")));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_and_queued_jobs() {
        let backend = Arc::new(MockBackend::with_delay(Duration::from_secs(10)));
        let names: Vec<String> = (0..10).map(|i| format!("app-{}", i)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let started = std::time::Instant::now();
        let outcome = pipeline(backend.clone(), config(2))
            .run(jobs(&names, &[MetricKind::Cpu]), Some(rx))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.cancelled, 10);
        assert!(outcome.was_cancelled());
        assert!(outcome.summaries.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_skips_backend() {
        let backend = Arc::new(MockBackend::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let outcome = pipeline(backend.clone(), config(3))
            .run(jobs(&["a", "b"], BOTH), Some(rx))
            .await
            .unwrap();

        assert_eq!(outcome.cancelled, 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let outcome = pipeline(Arc::new(MockBackend::default()), config(2))
            .run(jobs(&["a", "b"], BOTH), Some(rx))
            .await
            .unwrap();

        assert_eq!(outcome.ok, 4);
        assert_eq!(outcome.cancelled, 0);
    }

    #[tokio::test]
    async fn test_no_jobs() {
        let outcome = pipeline(Arc::new(MockBackend::default()), config(5))
            .run(Vec::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.total(), 0);
        assert!(outcome.summaries.is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_are_counted_in_metrics() {
        let metrics = PipelineMetrics::new().unwrap();
        let pipeline = MetricsPipelineBuilder::new()
            .backend(Arc::new(MockBackend::default()))
            .metrics(metrics.clone())
            .workers(2)
            .build()
            .unwrap();

        pipeline
            .run(jobs(&["app", "bad", "empty"], &[MetricKind::Memory]), None)
            .await
            .unwrap();

        assert_eq!(metrics.jobs(JobOutcome::Ok), 1);
        assert_eq!(metrics.jobs(JobOutcome::Failed), 1);
        assert_eq!(metrics.jobs(JobOutcome::NoData), 1);
        assert_eq!(metrics.data_points(), 3);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = MetricsPipeline::new(
            Arc::new(MockBackend::default()),
            config(0),
            PipelineMetrics::new().unwrap(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_requires_backend() {
        let result = MetricsPipelineBuilder::new().workers(2).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
    }
}
