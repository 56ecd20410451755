//! Allocation report: requests and limits against node capacity

use anyhow::{Context, Result};
use explorer_lib::explorer::DEFAULT_ALLOCATION_SORT;
use explorer_lib::{AllocationQuery, Explorer, KubeInventory};
use std::sync::Arc;

use crate::config::Settings;
use crate::output::{print_info, print_json, print_table, OutputFormat};
use crate::Cli;

/// Validate the query, list the cluster and print the ranked report
pub async fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let query = AllocationQuery {
        namespace: cli.namespace.clone().or_else(|| settings.namespace.clone()),
        node: cli.node.clone(),
        sort: cli
            .sort
            .clone()
            .unwrap_or_else(|| DEFAULT_ALLOCATION_SORT.to_string()),
        reverse: cli.reverse,
    };
    query.validate()?;

    let inventory = KubeInventory::connect(cli.kubeconfig.as_deref())
        .await
        .context("Failed to connect to the Kubernetes cluster")?;
    let explorer = Explorer::new(Arc::new(inventory));

    let report = explorer
        .allocations(&query)
        .await
        .context("Failed to build the allocation report")?;
    let table = report.table();

    match cli.output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_table(&table),
    }

    if cli.csv {
        super::write_csv("resources", &table)?;
    }
    if cli.dump_metrics {
        print_info("No collection metrics in allocation mode");
    }

    Ok(())
}
