//! Job scheduling
//!
//! Builds the declarative job list from the run manifest and executes the
//! aggregate-classify-normalize stages data-parallel across (source,
//! dataset) jobs. Jobs share no mutable state; results are collected and
//! merged into the repository only after every job has completed or failed,
//! which is what lets the reconciler run as a clean barrier.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{error, info};

use kelpline_common::layers::{ContainerLayer, SurveyFootprint, SurveyLayer, TabularDataset};

use crate::adapters::{self, NormalizedBatch};
use crate::config::{DatasetConfig, RunManifest, SourceConfig, SourceKind};
use crate::context::RunContext;
use crate::error::{SynthError, SynthResult};

/// One schedulable unit: a single dataset of a single source
#[derive(Debug, Clone)]
pub struct Job {
    pub source: SourceConfig,
    pub dataset: DatasetConfig,
}

impl Job {
    pub fn label(&self) -> String {
        format!("{}/{}", self.source.name, self.dataset.name)
    }
}

/// Successful job output carried to the repository stage
#[derive(Debug)]
pub struct JobData {
    pub source_name: String,
    pub supersede_overlapped_years: bool,
    pub batch: NormalizedBatch,
}

/// Outcome of one job; failures are isolated, never fatal to the run
#[derive(Debug)]
pub struct JobResult {
    pub label: String,
    pub outcome: Result<JobData, SynthError>,
}

/// Flatten the manifest into the job list
pub fn build_jobs(manifest: &RunManifest) -> Vec<Job> {
    manifest
        .sources
        .iter()
        .flat_map(|source| {
            source.datasets.iter().map(move |dataset| Job {
                source: source.clone(),
                dataset: dataset.clone(),
            })
        })
        .collect()
}

/// Run all jobs data-parallel and collect every outcome
///
/// Returns only once every job has completed or failed; the caller can then
/// treat the merged results as the complete repository.
pub fn run_jobs(ctx: &RunContext, containers: &ContainerLayer, jobs: Vec<Job>) -> Vec<JobResult> {
    jobs.into_par_iter()
        .map(|job| {
            let label = job.label();
            info!("Job {label}: starting");
            // the geometry engine can panic on degenerate input; convert
            // that into an isolated job failure like any other error
            let outcome = catch_unwind(AssertUnwindSafe(|| run_job(ctx, containers, &job)))
                .unwrap_or_else(|panic| {
                    Err(SynthError::Geometry {
                        job: label.clone(),
                        message: panic_message(panic),
                    })
                });
            match &outcome {
                Ok(data) => info!(
                    "Job {label}: completed with {} observations",
                    data.batch.observations.len()
                ),
                Err(e) => error!("Job {label}: failed: {e}"),
            }
            JobResult { label, outcome }
        })
        .collect()
}

fn run_job(ctx: &RunContext, containers: &ContainerLayer, job: &Job) -> SynthResult<JobData> {
    let label = job.label();
    let batch = match job.source.kind {
        SourceKind::AreaSurvey | SourceKind::LineSurvey => {
            let survey_path = job.dataset.survey.as_ref().ok_or_else(|| {
                SynthError::Config(format!("dataset {label} has no survey layer"))
            })?;
            let survey = SurveyLayer::from_path(survey_path)?;
            let footprint = job
                .dataset
                .footprint
                .as_deref()
                .map(SurveyFootprint::from_path)
                .transpose()?;

            let output = adapters::geometry::normalize(
                &label,
                &job.source,
                &job.dataset,
                containers,
                &survey,
                footprint.as_ref(),
            )?;
            write_coverage_audit(ctx, &label, &output)?;
            output.batch
        }
        SourceKind::Tabular => {
            let table_path = job.dataset.table.as_ref().ok_or_else(|| {
                SynthError::Config(format!("dataset {label} has no table"))
            })?;
            let table = TabularDataset::from_path(table_path)?;
            adapters::tabular::normalize(&label, &job.source, &job.dataset, &table)?
        }
    };

    Ok(JobData {
        source_name: job.source.name.clone(),
        supersede_overlapped_years: job.source.supersede_overlapped_years,
        batch,
    })
}

/// Persist per-year coverage rows into the scratch workspace for audit
fn write_coverage_audit(
    ctx: &RunContext,
    label: &str,
    output: &adapters::geometry::GeometryJobOutput,
) -> SynthResult<()> {
    for (year, coverage) in &output.coverage {
        let path = ctx
            .scratch
            .job_artifact(label, &format!("coverage_{year}.json"))?;
        fs::write(&path, serde_json::to_vec_pretty(coverage)?)?;
    }
    Ok(())
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("geometry engine panic: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("geometry engine panic: {message}")
    } else {
        "geometry engine panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::config::{MeasureUnit, YearRule};

    fn manifest_with_two_sources() -> RunManifest {
        let source = |name: &str, datasets: Vec<DatasetConfig>| SourceConfig {
            name: name.into(),
            url: None,
            kind: SourceKind::AreaSurvey,
            unit: MeasureUnit::Hectares,
            epsilon: 0.0,
            absence_marker_max_measure: None,
            presence_only: false,
            supersede_overlapped_years: false,
            year_rule: YearRule::DatasetSuffix,
            datasets,
        };
        let dataset = |name: &str| DatasetConfig {
            name: name.into(),
            survey: Some(PathBuf::from(format!("{name}.json"))),
            footprint: Some(PathBuf::from("footprint.json")),
            table: None,
        };
        RunManifest {
            containers: PathBuf::from("containers.json"),
            network: PathBuf::from("network.json"),
            output_dir: PathBuf::from("out"),
            scratch_dir: PathBuf::from("scratch"),
            sources: vec![
                source("a", vec![dataset("kelp_2020"), dataset("kelp_2021")]),
                source("b", vec![dataset("beds_2019")]),
            ],
        }
    }

    #[test]
    fn jobs_are_one_per_source_dataset_pair() {
        let jobs = build_jobs(&manifest_with_two_sources());
        assert_eq!(jobs.len(), 3);
        let labels: Vec<_> = jobs.iter().map(Job::label).collect();
        assert_eq!(labels, vec!["a/kelp_2020", "a/kelp_2021", "b/beds_2019"]);
    }
}
