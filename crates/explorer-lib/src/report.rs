//! Report assembly: ranked records plus totals, flattened to string tables

use crate::models::{
    ClusterCapacity, ContainerMetricsSummary, ContainerResourceRow, MetricKind, TimeWindow,
};
use crate::quantity::{Amount, CpuQuantity, MemoryQuantity, ResourceQuantity};
use serde::Serialize;
use std::time::Duration;

/// Plain table of display strings handed to a formatter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub totals: Option<Vec<String>>,
}

impl Table {
    /// Header, body and totals as one list of records (CSV order)
    pub fn to_records(&self) -> Vec<Vec<String>> {
        let mut records = Vec::with_capacity(self.rows.len() + 2);
        records.push(self.headers.clone());
        records.extend(self.rows.iter().cloned());
        if let Some(totals) = &self.totals {
            records.push(totals.clone());
        }
        records
    }
}

fn strings<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

fn percent(value: i64) -> String {
    format!("{}%", value)
}

/// Sums of declared resources across all rows, against cluster capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocationTotals {
    pub cpu_req: CpuQuantity,
    pub cpu_limit: CpuQuantity,
    pub mem_req: MemoryQuantity,
    pub mem_limit: MemoryQuantity,
    pub percent_cpu_req: i64,
    pub percent_cpu_limit: i64,
    pub percent_memory_req: i64,
    pub percent_memory_limit: i64,
}

impl AllocationTotals {
    pub fn compute(rows: &[ContainerResourceRow], capacity: &ClusterCapacity) -> Self {
        let cpu_req: CpuQuantity = rows.iter().map(|r| r.cpu_req).sum();
        let cpu_limit: CpuQuantity = rows.iter().map(|r| r.cpu_limit).sum();
        let mem_req: MemoryQuantity = rows.iter().map(|r| r.mem_req).sum();
        let mem_limit: MemoryQuantity = rows.iter().map(|r| r.mem_limit).sum();

        Self {
            cpu_req,
            cpu_limit,
            mem_req,
            mem_limit,
            percent_cpu_req: cpu_req.percent_of(&capacity.cpu),
            percent_cpu_limit: cpu_limit.percent_of(&capacity.cpu),
            percent_memory_req: mem_req.percent_of(&capacity.memory),
            percent_memory_limit: mem_limit.percent_of(&capacity.memory),
        }
    }
}

/// Requests and limits of every active container, in ranked order
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub capacity: ClusterCapacity,
    pub rows: Vec<ContainerResourceRow>,
    pub totals: AllocationTotals,
}

impl AllocationReport {
    /// `rows` must already be ranked
    pub fn new(rows: Vec<ContainerResourceRow>, capacity: ClusterCapacity) -> Self {
        let totals = AllocationTotals::compute(&rows, &capacity);
        Self {
            capacity,
            rows,
            totals,
        }
    }

    pub fn table(&self) -> Table {
        let headers = strings([
            "Namespace",
            "Name",
            "Node",
            "CpuReq",
            "CpuReq%",
            "CpuLimit",
            "CpuLimit%",
            "MemReq",
            "MemReq%",
            "MemLimit",
            "MemLimit%",
        ]);

        let rows = self
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.namespace.clone(),
                    r.name(),
                    r.node_name.clone(),
                    r.cpu_req.to_string(),
                    percent(r.percent_cpu_req),
                    r.cpu_limit.to_string(),
                    percent(r.percent_cpu_limit),
                    r.mem_req.to_string(),
                    percent(r.percent_memory_req),
                    r.mem_limit.to_string(),
                    percent(r.percent_memory_limit),
                ]
            })
            .collect();

        let t = &self.totals;
        let cpu_cap = self.capacity.cpu;
        let mem_cap = self.capacity.memory;
        let totals = vec![
            "Total".to_string(),
            String::new(),
            String::new(),
            format!("{}/{}", t.cpu_req, cpu_cap),
            percent(t.percent_cpu_req),
            format!("{}/{}", t.cpu_limit, cpu_cap),
            percent(t.percent_cpu_limit),
            format!("{}/{}", t.mem_req, mem_cap),
            percent(t.percent_memory_req),
            format!("{}/{}", t.mem_limit, mem_cap),
            percent(t.percent_memory_limit),
        ];

        Table {
            headers,
            rows,
            totals: Some(totals),
        }
    }
}

/// Historical usage of every container for one metric kind
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub kind: MetricKind,
    pub window: TimeWindow,
    pub summaries: Vec<ContainerMetricsSummary>,
    pub total_data_points: u64,
}

impl MetricsReport {
    /// `summaries` must already be ranked and all of `kind`
    pub fn new(kind: MetricKind, window: TimeWindow, summaries: Vec<ContainerMetricsSummary>) -> Self {
        let total_data_points = summaries
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.data_points()));
        Self {
            kind,
            window,
            summaries,
            total_data_points,
        }
    }

    /// Header of the central-tendency column for this kind
    pub fn central_label(&self) -> &'static str {
        match self.kind {
            MetricKind::Cpu => "Avg",
            MetricKind::Memory => "Mode",
        }
    }

    pub fn table(&self) -> Table {
        let headers = strings([
            "Namespace",
            "Pod/Container",
            "Last",
            "Min",
            "Max",
            self.central_label(),
            "DataPoints",
        ]);

        let rows = self
            .summaries
            .iter()
            .map(|s| {
                vec![
                    s.namespace.clone(),
                    s.name(),
                    cell(s.last()),
                    cell(s.min()),
                    cell(s.max()),
                    cell(s.central()),
                    s.data_points().to_string(),
                ]
            })
            .collect();

        let mut totals = vec![String::new(); 7];
        totals[0] = "Total".to_string();
        totals[6] = self.total_data_points.to_string();

        Table {
            headers,
            rows,
            totals: Some(totals),
        }
    }

    pub fn footer(&self) -> String {
        format!(
            "Results shown are for a period of {}. {} data points were evaluated.",
            format_window(self.window.duration()),
            format_thousands(self.total_data_points)
        )
    }

    /// Containers for which no statistics could be produced
    pub fn no_data_count(&self) -> usize {
        self.summaries.iter().filter(|s| !s.has_data()).count()
    }
}

fn cell(value: Option<ResourceQuantity>) -> String {
    value.map(|q| q.to_string()).unwrap_or_else(|| "-".to_string())
}

/// `1234567` -> `"1,234,567"`
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Compact `XhYmZs` rendering; zero components inside the span are kept
pub fn format_window(window: Duration) -> String {
    let total = window.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
