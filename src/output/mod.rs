//! Output module for run statistics and exports
//!
//! This module handles:
//! - Counting what a run did and printing the totals
//! - Exporting a run's records into flat JSON files

mod export;
pub mod stats;

pub use export::{export_run, human_size, ExportSummary};
pub use stats::{print_statistics, RunStats, StatsSnapshot};
