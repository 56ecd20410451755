//! Historical metrics collection
//!
//! Fans (container, metric kind) jobs out to a bounded pool of workers that
//! query a [`TimeSeriesBackend`](crate::timeseries::TimeSeriesBackend) and
//! reduce each series with the statistical aggregator.

mod pool;

#[cfg(test)]
mod tests;

pub use pool::{MetricsPipeline, MetricsPipelineBuilder, PipelineConfig, PipelineOutcome};
