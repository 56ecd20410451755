//! Report commands

pub mod allocations;
pub mod historical;

use chrono::Local;
use explorer_lib::Table;
use std::path::Path;

use crate::output::{export_csv, print_success};

/// Export `table` to `<prefix>-YYYYMMDDHHMM.csv` in the working directory
fn write_csv(prefix: &str, table: &Table) -> anyhow::Result<()> {
    let path = export_csv(Path::new("."), prefix, table, Local::now())?;
    let name = path.file_name().unwrap_or(path.as_os_str());
    print_success(&format!("Wrote {}", name.to_string_lossy()));
    Ok(())
}
