//! Run report types
//!
//! Every run writes a machine-readable summary next to its tabular outputs:
//! which jobs ran, which failed and why, what was collapsed, superseded or
//! corrected, how ties were broken, and any referential mismatches. Nothing
//! the pipeline degrades on is ever swallowed silently.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use kelpline_common::records::SiteCode;

use crate::joiner::ReferentialReport;
use crate::reconciler::TieBreak;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Outcome of one (source, dataset) job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: String,
    pub status: JobStatus,
    pub n_observations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Summary of one complete synthesis run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<JobReport>,
    /// Repository size after duplicate collapse and supersession
    pub n_observations: usize,
    pub n_duplicates_collapsed: u64,
    pub n_superseded: u64,
    pub n_corrections: u64,
    pub n_canonical_sites: usize,
    pub ties: Vec<TieBreak>,
    pub sites_without_year: Vec<SiteCode>,
    pub referential: ReferentialReport,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn n_failed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count()
    }
}
