//! Output formatting utilities

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use colored::Colorize;
use explorer_lib::Table;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::builder::Builder;
use tabled::settings::Style;

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Render a report table with a rounded border; totals become the last row
pub fn render_table(table: &Table) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.headers.iter().cloned());
    for row in &table.rows {
        builder.push_record(row.iter().cloned());
    }
    if let Some(totals) = &table.totals {
        builder.push_record(totals.iter().cloned());
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Print a report table, or a notice when it has no rows
pub fn print_table(table: &Table) {
    if table.rows.is_empty() {
        print_warning("No containers found");
    }
    println!("{}", render_table(table));
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

/// `<prefix>-YYYYMMDDHHMM.csv`
pub fn csv_file_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}-{}.csv", prefix, now.format("%Y%m%d%H%M"))
}

/// Write header, rows and totals of `table` as CSV into `dir`
pub fn export_csv(dir: &Path, prefix: &str, table: &Table, now: DateTime<Local>) -> Result<PathBuf> {
    let path = dir.join(csv_file_name(prefix, now));
    let mut content = String::new();
    for record in table.to_records() {
        let line: Vec<String> = record.iter().map(|field| csv_field(field)).collect();
        content.push_str(&line.join(","));
        content.push('\n');
    }

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write CSV file {}", path.display()))?;
    Ok(path)
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// Status messages go to stderr so stdout carries only the report.

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}
