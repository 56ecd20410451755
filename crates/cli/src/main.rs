//! Kubernetes Resource Explorer CLI
//!
//! Reports the CPU and memory requests and limits of every active container
//! against node capacity, or historical usage from Cloud Monitoring.

mod commands;
mod config;
mod duration;
mod output;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use explorer_lib::MetricKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Kubernetes Resource Explorer
#[derive(Parser, Debug)]
#[command(name = "kube-resource-explorer")]
#[command(
    author,
    version,
    about = "Explore resource allocation and historical usage of Kubernetes containers",
    long_about = None
)]
pub struct Cli {
    /// Namespace to report on (all namespaces if not specified)
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Only report containers scheduled on this node
    #[arg(long)]
    pub node: Option<String>,

    /// Field to sort by (CpuReq in allocation mode, Max in historical mode)
    #[arg(long, short)]
    pub sort: Option<String>,

    /// Reverse the sort order
    #[arg(long, short)]
    pub reverse: bool,

    /// Report historical usage instead of allocations
    #[arg(long)]
    pub historical: bool,

    /// History window ending now (e.g. 4h, 90m, 1h30m, 2d)
    #[arg(long, default_value = "4h", value_parser = duration::parse)]
    pub duration: Duration,

    /// Metric kind to report in historical mode
    #[arg(long, value_enum, conflicts_with_all = ["cpu", "mem"])]
    pub metric: Option<MetricSelection>,

    /// Shorthand for --metric cpu
    #[arg(long, conflicts_with = "mem")]
    pub cpu: bool,

    /// Shorthand for --metric mem
    #[arg(long)]
    pub mem: bool,

    /// Cloud project hosting the cluster's monitoring data
    #[arg(long)]
    pub project: Option<String>,

    /// Number of concurrent metric queries
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Also export the report to a CSV file in the working directory
    #[arg(long)]
    pub csv: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "table")]
    pub output: output::OutputFormat,

    /// Path to kubeconfig file (uses default resolution if not specified)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Print collection metrics in Prometheus text format when done
    #[arg(long)]
    pub dump_metrics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricSelection {
    Cpu,
    #[value(alias = "memory")]
    Mem,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Metric kinds selected by `--metric`, `--cpu` or `--mem`
    pub fn metric_kinds(&self) -> Option<Vec<MetricKind>> {
        let selection = match (self.metric, self.cpu, self.mem) {
            (Some(selection), _, _) => selection,
            (None, true, _) => MetricSelection::Cpu,
            (None, _, true) => MetricSelection::Mem,
            (None, false, false) => return None,
        };
        Some(match selection {
            MetricSelection::Cpu => vec![MetricKind::Cpu],
            MetricSelection::Mem => vec![MetricKind::Memory],
            MetricSelection::All => vec![MetricKind::Cpu, MetricKind::Memory],
        })
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the verbosity flag
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let settings = config::Settings::load()?;
    tracing::debug!(
        historical = cli.historical,
        namespace = ?cli.namespace.as_ref().or(settings.namespace.as_ref()),
        "Starting report"
    );

    if cli.historical {
        commands::historical::run(&cli, &settings).await
    } else {
        commands::allocations::run(&cli, &settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_metric_selection() {
        let cli = Cli::parse_from(["kube-resource-explorer", "--historical", "--mem"]);
        assert_eq!(cli.metric_kinds(), Some(vec![MetricKind::Memory]));

        let cli = Cli::parse_from(["kube-resource-explorer", "--metric", "all"]);
        assert_eq!(cli.metric_kinds(), Some(vec![MetricKind::Cpu, MetricKind::Memory]));

        let cli = Cli::parse_from(["kube-resource-explorer", "--historical"]);
        assert_eq!(cli.metric_kinds(), None);
    }

    #[test]
    fn test_conflicting_metric_flags() {
        assert!(Cli::try_parse_from(["kube-resource-explorer", "--cpu", "--mem"]).is_err());
        assert!(Cli::try_parse_from(["kube-resource-explorer", "--metric", "cpu", "--mem"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["kube-resource-explorer"]);
        assert_eq!(cli.duration, Duration::from_secs(4 * 3600));
        assert_eq!(cli.output, output::OutputFormat::Table);
        assert!(cli.sort.is_none());
        assert!(!cli.historical);
    }

    #[test]
    fn test_workers_must_be_positive() {
        assert!(Cli::try_parse_from(["kube-resource-explorer", "--workers", "0"]).is_err());
        let cli = Cli::parse_from(["kube-resource-explorer", "--workers", "8"]);
        assert_eq!(cli.workers, Some(8));
    }
}
