//! Core data models for the resource explorer

use crate::quantity::{Amount, CpuQuantity, MemoryQuantity, ResourceKind, ResourceQuantity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Kind of historical metric, CPU (rate) or memory (level)
pub type MetricKind = ResourceKind;

/// Schedulable resources of a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeCapacity {
    pub name: String,
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
}

/// Total resources summed across all nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterCapacity {
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
}

impl ClusterCapacity {
    pub fn from_nodes(nodes: &[NodeCapacity]) -> Self {
        Self {
            cpu: nodes.iter().map(|n| n.cpu).sum(),
            memory: nodes.iter().map(|n| n.memory).sum(),
        }
    }

    pub fn get(&self, kind: ResourceKind) -> ResourceQuantity {
        match kind {
            ResourceKind::Cpu => ResourceQuantity::Cpu(self.cpu),
            ResourceKind::Memory => ResourceQuantity::Memory(self.memory),
        }
    }
}

/// A container of a non-terminated pod, with its declared resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveContainer {
    pub namespace: String,
    pub pod_name: String,
    pub pod_uid: String,
    pub node_name: String,
    pub container_name: String,
    pub cpu_request: CpuQuantity,
    pub cpu_limit: CpuQuantity,
    pub memory_request: MemoryQuantity,
    pub memory_limit: MemoryQuantity,
}

/// Requests and limits of one container against its node's capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerResourceRow {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub node_name: String,
    pub cpu_req: CpuQuantity,
    pub cpu_limit: CpuQuantity,
    pub mem_req: MemoryQuantity,
    pub mem_limit: MemoryQuantity,
    pub percent_cpu_req: i64,
    pub percent_cpu_limit: i64,
    pub percent_memory_req: i64,
    pub percent_memory_limit: i64,
}

impl ContainerResourceRow {
    /// Build a row; without a known node every percentage is 0
    pub fn new(container: &ActiveContainer, node: Option<&NodeCapacity>) -> Self {
        let (cpu_capacity, memory_capacity) = node
            .map(|n| (n.cpu, n.memory))
            .unwrap_or((CpuQuantity::ZERO, MemoryQuantity::ZERO));

        Self {
            namespace: container.namespace.clone(),
            pod_name: container.pod_name.clone(),
            container_name: container.container_name.clone(),
            node_name: container.node_name.clone(),
            cpu_req: container.cpu_request,
            cpu_limit: container.cpu_limit,
            mem_req: container.memory_request,
            mem_limit: container.memory_limit,
            percent_cpu_req: container.cpu_request.percent_of(&cpu_capacity),
            percent_cpu_limit: container.cpu_limit.percent_of(&cpu_capacity),
            percent_memory_req: container.memory_request.percent_of(&memory_capacity),
            percent_memory_limit: container.memory_limit.percent_of(&memory_capacity),
        }
    }

    /// `pod/container` display name
    pub fn name(&self) -> String {
        format!("{}/{}", self.pod_name, self.container_name)
    }
}

/// Closed time range a historical query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The window of length `duration` that ends at `end`
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Self {
        let start = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }
}

/// One unit of work for the collection pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricJob {
    pub namespace: String,
    pub pod_name: String,
    pub pod_uid: String,
    pub node_name: String,
    pub container_name: String,
    pub kind: MetricKind,
    pub window: TimeWindow,
}

impl MetricJob {
    pub fn new(container: &ActiveContainer, kind: MetricKind, window: TimeWindow) -> Self {
        Self {
            namespace: container.namespace.clone(),
            pod_name: container.pod_name.clone(),
            pod_uid: container.pod_uid.clone(),
            node_name: container.node_name.clone(),
            container_name: container.container_name.clone(),
            kind,
            window,
        }
    }
}

/// Raw value of a time-series point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    Int64(i64),
    Double(f64),
}

impl PointValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            PointValue::Int64(v) => v as f64,
            PointValue::Double(v) => v,
        }
    }

    /// Integer view; doubles are rounded half-to-even
    pub fn as_i64(&self) -> i64 {
        match *self {
            PointValue::Int64(v) => v,
            PointValue::Double(v) => v.round_ties_even() as i64,
        }
    }
}

/// A timestamped sample as returned by the time-series backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub end_time: DateTime<Utc>,
    pub value: PointValue,
}

impl Point {
    pub fn int(end_time: DateTime<Utc>, value: i64) -> Self {
        Self {
            end_time,
            value: PointValue::Int64(value),
        }
    }

    pub fn double(end_time: DateTime<Utc>, value: f64) -> Self {
        Self {
            end_time,
            value: PointValue::Double(value),
        }
    }
}

/// Reduced statistics in the kind's base units (milli-cores or bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub last: i64,
    pub min: i64,
    pub max: i64,
    /// Average for CPU, mode for memory
    pub central: i64,
    pub data_points: u64,
}

/// Historical usage of one container for one metric kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerMetricsSummary {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub node_name: String,
    pub kind: MetricKind,
    pub stats: Option<UsageStats>,
    /// Why `stats` is missing, for no-data rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ContainerMetricsSummary {
    pub fn from_stats(job: &MetricJob, stats: UsageStats) -> Self {
        Self::build(job, Some(stats), None)
    }

    /// Sentinel row for a job whose data could not be obtained
    pub fn no_data(job: &MetricJob, reason: impl Into<String>) -> Self {
        Self::build(job, None, Some(reason.into()))
    }

    fn build(job: &MetricJob, stats: Option<UsageStats>, note: Option<String>) -> Self {
        Self {
            namespace: job.namespace.clone(),
            pod_name: job.pod_name.clone(),
            container_name: job.container_name.clone(),
            node_name: job.node_name.clone(),
            kind: job.kind,
            stats,
            note,
        }
    }

    pub fn name(&self) -> String {
        format!("{}/{}", self.pod_name, self.container_name)
    }

    pub fn has_data(&self) -> bool {
        self.stats.is_some()
    }

    pub fn data_points(&self) -> u64 {
        self.stats.map(|s| s.data_points).unwrap_or(0)
    }

    pub fn last(&self) -> Option<ResourceQuantity> {
        self.quantity(|s| s.last)
    }

    pub fn min(&self) -> Option<ResourceQuantity> {
        self.quantity(|s| s.min)
    }

    pub fn max(&self) -> Option<ResourceQuantity> {
        self.quantity(|s| s.max)
    }

    pub fn central(&self) -> Option<ResourceQuantity> {
        self.quantity(|s| s.central)
    }

    fn quantity(&self, pick: impl Fn(&UsageStats) -> i64) -> Option<ResourceQuantity> {
        self.stats
            .as_ref()
            .map(|s| ResourceQuantity::of(self.kind, pick(s)))
    }
}
