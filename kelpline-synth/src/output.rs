//! Output writing
//!
//! All terminal artifacts land in the manifest's output directory: the two
//! canonical CSV tables, the joined spatial outputs as JSON, and the run
//! report.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use kelpline_common::records::{CanonicalRecord, Observation};
use kelpline_common::table;

use crate::error::SynthResult;
use crate::joiner::{CanonicalJoin, HistoryJoin};
use crate::report::RunReport;

/// Fixed file names within the output directory
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub all_records: PathBuf,
    pub most_recent: PathBuf,
    pub network_most_recent: PathBuf,
    pub network_all_records: PathBuf,
    pub run_report: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: &Path) -> Self {
        OutputPaths {
            all_records: output_dir.join("all_records.csv"),
            most_recent: output_dir.join("most_recent.csv"),
            network_most_recent: output_dir.join("network_most_recent.json"),
            network_all_records: output_dir.join("network_all_records.json"),
            run_report: output_dir.join("run_report.json"),
        }
    }

    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.all_records.clone(),
            self.most_recent.clone(),
            self.network_most_recent.clone(),
            self.network_all_records.clone(),
            self.run_report.clone(),
        ]
    }
}

pub fn write_tables(
    paths: &OutputPaths,
    history: &[Observation],
    canonical: &[CanonicalRecord],
) -> SynthResult<()> {
    table::write_observations(&paths.all_records, history)?;
    info!(
        "Wrote {} history rows to {}",
        history.len(),
        paths.all_records.display()
    );
    table::write_canonical(&paths.most_recent, canonical)?;
    info!(
        "Wrote {} canonical rows to {}",
        canonical.len(),
        paths.most_recent.display()
    );
    Ok(())
}

pub fn write_joins(
    paths: &OutputPaths,
    most_recent: &CanonicalJoin,
    all_records: &HistoryJoin,
) -> SynthResult<()> {
    fs::write(
        &paths.network_most_recent,
        serde_json::to_vec_pretty(most_recent)?,
    )?;
    fs::write(
        &paths.network_all_records,
        serde_json::to_vec_pretty(all_records)?,
    )?;
    info!(
        "Wrote joined outputs to {} and {}",
        paths.network_most_recent.display(),
        paths.network_all_records.display()
    );
    Ok(())
}

pub fn write_report(paths: &OutputPaths, report: &RunReport) -> SynthResult<()> {
    fs::write(&paths.run_report, serde_json::to_vec_pretty(report)?)?;
    Ok(())
}
