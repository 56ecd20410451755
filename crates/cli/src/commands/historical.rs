//! Historical usage report from Cloud Monitoring

use anyhow::{anyhow, bail, Context, Result};
use explorer_lib::explorer::DEFAULT_HISTORY_SORT;
use explorer_lib::ranking::validate_field;
use explorer_lib::{
    CloudMonitoringBackend, ContainerMetricsSummary, Explorer, HistoryQuery, HistoryReport,
    KubeInventory, MetricsPipelineBuilder,
};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Settings;
use crate::output::{print_json, print_table, print_warning, OutputFormat};
use crate::Cli;

const DEFAULT_WORKERS: usize = 5;

/// Validate flags and backend settings, then collect and print one table
/// per selected metric kind
pub async fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let sort = cli
        .sort
        .clone()
        .unwrap_or_else(|| DEFAULT_HISTORY_SORT.to_string());
    validate_field::<ContainerMetricsSummary>(&sort)?;
    let kinds = cli
        .metric_kinds()
        .ok_or_else(|| anyhow!("--historical requires --metric <cpu|mem|all> (or --cpu / --mem)"))?;

    let query = HistoryQuery {
        namespace: cli.namespace.clone().or_else(|| settings.namespace.clone()),
        node: cli.node.clone(),
        kinds,
        duration: cli.duration,
        sort,
        reverse: cli.reverse,
    };
    query.validate()?;

    let backend = CloudMonitoringBackend::new(settings.cloud_monitoring(cli.project.as_deref()))
        .context("Cloud Monitoring is not configured (set --project and KRE_ACCESS_TOKEN)")?;

    let workers = cli
        .workers
        .map(usize::from)
        .or(settings.workers)
        .unwrap_or(DEFAULT_WORKERS);
    let mut builder = MetricsPipelineBuilder::new()
        .backend(Arc::new(backend))
        .workers(workers);
    if let Some(timeout) = settings.query_timeout() {
        builder = builder.query_timeout(timeout);
    }
    let pipeline = builder.build().context("Invalid collection settings")?;

    let inventory = KubeInventory::connect(cli.kubeconfig.as_deref())
        .await
        .context("Failed to connect to the Kubernetes cluster")?;
    let explorer = Explorer::new(Arc::new(inventory));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("Interrupted, stopping metric collection");
            let _ = shutdown_tx.send(true);
        }
    });

    let history = explorer
        .history(&pipeline, &query, Some(shutdown_rx))
        .await
        .context("Failed to collect historical metrics")?;

    print_history(cli, &history)?;

    if cli.dump_metrics {
        eprintln!("{}", pipeline.metrics().render()?);
    }

    if history.cancelled > 0 {
        bail!(
            "Collection interrupted: {} of {} jobs were cancelled",
            history.cancelled,
            history.ok + history.no_data + history.failed + history.cancelled
        );
    }
    Ok(())
}

fn print_history(cli: &Cli, history: &HistoryReport) -> Result<()> {
    if cli.output == OutputFormat::Json {
        print_json(history)?;
    }

    for report in &history.reports {
        let table = report.table();
        if cli.output == OutputFormat::Table {
            print_table(&table);
            println!("{}", report.footer());
            println!();
        }

        let missing = report.no_data_count();
        if missing > 0 {
            print_warning(&format!(
                "{} {} series had no usable data",
                missing, report.kind
            ));
        }

        if cli.csv {
            super::write_csv(&format!("metrics-{}", report.kind), &table)?;
        }
    }

    Ok(())
}
