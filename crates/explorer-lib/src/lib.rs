//! Kubernetes resource explorer library
//!
//! This crate provides the core functionality for:
//! - Exact CPU and memory quantities
//! - Statistical reduction of historical time series
//! - Concurrent collection of historical metrics
//! - Ranking of report rows by a field chosen at runtime
//! - Report assembly, cluster inventory and the Cloud Monitoring backend

pub mod collector;
pub mod error;
pub mod explorer;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod ranking;
pub mod report;
pub mod stats;
pub mod timeseries;

pub use collector::{MetricsPipeline, MetricsPipelineBuilder, PipelineConfig, PipelineOutcome};
pub use error::{Error, Result};
pub use explorer::{AllocationQuery, Explorer, HistoryQuery, HistoryReport};
pub use inventory::{ClusterInventory, KubeInventory};
pub use models::*;
pub use observability::{JobOutcome, PipelineMetrics, StructuredLogger};
pub use quantity::{Amount, CpuQuantity, MemoryQuantity, ResourceKind, ResourceQuantity};
pub use report::{AllocationReport, MetricsReport, Table};
pub use timeseries::{CloudMonitoringBackend, CloudMonitoringConfig, SeriesQuery, TimeSeriesBackend};
