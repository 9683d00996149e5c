//! Whole-run orchestration
//!
//! Sequences the stages of one synthesis run: load the fixed layers, run
//! every (source, dataset) job data-parallel, merge the surviving
//! observations into the repository, reconcile behind the barrier, join
//! onto the network, and write every output plus the run report. Per-job
//! failures degrade the run; only missing top-level inputs abort it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use chrono::Utc;
use tracing::{info, warn};

use kelpline_common::layers::{ContainerLayer, NetworkLayer};
use kelpline_common::records::{Observation, SiteCode, Year};

use crate::adapters::NormalizedBatch;
use crate::config::RunManifest;
use crate::context::RunContext;
use crate::error::SynthResult;
use crate::joiner::{join_all_records, join_most_recent, validate_referential};
use crate::output::{write_joins, write_report, write_tables, OutputPaths};
use crate::reconciler::reconcile;
use crate::report::{JobReport, JobStatus, RunReport};
use crate::repository::ObservationRepository;
use crate::scheduler::{build_jobs, run_jobs, JobData};

type SurveyedByYear = BTreeMap<Year, HashSet<SiteCode>>;

/// One complete synthesis run over a manifest
pub struct Pipeline {
    manifest: RunManifest,
}

impl Pipeline {
    pub fn new(manifest: RunManifest) -> Self {
        Pipeline { manifest }
    }

    pub fn run(&self) -> SynthResult<RunReport> {
        let ctx = RunContext::prepare(&self.manifest)?;
        info!("Run {} starting", ctx.run_id);

        // fatal only here: a run without containers or network is meaningless
        let containers = ContainerLayer::from_path(&self.manifest.containers)?;
        let network = NetworkLayer::from_path(&self.manifest.network)?;
        info!(
            "Loaded {} containers and {} network segments",
            containers.containers.len(),
            network.segments.len()
        );

        let jobs = build_jobs(&self.manifest);
        if jobs.is_empty() {
            warn!("Manifest defines no jobs; outputs will be empty");
        }
        info!(
            "Scheduling {} jobs across {} sources",
            jobs.len(),
            self.manifest.sources.len()
        );

        // stages 1-3, data-parallel; returns only when every job is done
        let results = run_jobs(&ctx, &containers, jobs);

        // supersession needs each source's full year-by-year coverage first
        let mut surveyed_by_source: HashMap<String, SurveyedByYear> = HashMap::new();
        for result in &results {
            if let Ok(data) = &result.outcome {
                if data.supersede_overlapped_years {
                    let entry = surveyed_by_source
                        .entry(data.source_name.clone())
                        .or_default();
                    for (year, sites) in &data.batch.surveyed {
                        entry.entry(*year).or_default().extend(sites.iter().cloned());
                    }
                }
            }
        }

        let mut repository = ObservationRepository::new();
        let mut job_reports = Vec::with_capacity(results.len());
        let mut n_superseded = 0u64;

        for result in results {
            match result.outcome {
                Ok(data) => {
                    let JobData {
                        source_name,
                        supersede_overlapped_years,
                        batch,
                    } = data;
                    let NormalizedBatch {
                        observations,
                        warnings,
                        ..
                    } = batch;
                    let n_produced = observations.len();

                    for observation in observations {
                        if supersede_overlapped_years
                            && is_superseded(surveyed_by_source.get(&source_name), &observation)
                        {
                            info!(
                                "Superseded {} {:?} from {source_name}: later survey covered it",
                                observation.site_code, observation.year
                            );
                            n_superseded += 1;
                            continue;
                        }
                        repository.insert(observation);
                    }

                    job_reports.push(JobReport {
                        job: result.label,
                        status: JobStatus::Completed,
                        n_observations: n_produced,
                        error: None,
                        warnings,
                    });
                }
                Err(e) => {
                    job_reports.push(JobReport {
                        job: result.label,
                        status: JobStatus::Failed,
                        n_observations: 0,
                        error: Some(e.to_string()),
                        warnings: Vec::new(),
                    });
                }
            }
        }

        let n_duplicates_collapsed = repository.n_collapsed();
        let frozen = repository.freeze();
        info!("Repository frozen with {} observations", frozen.len());

        // stage 4: the reconciliation barrier
        let reconciled = reconcile(&frozen);

        let paths = OutputPaths::new(&ctx.output_dir);
        write_tables(&paths, &reconciled.history, &reconciled.canonical)?;

        // stage 5: network joins
        let referential = validate_referential(&network, &reconciled.history);
        let most_recent_join = join_most_recent(&network, &reconciled.canonical);
        let all_records_join = join_all_records(&network, &reconciled.history);
        write_joins(&paths, &most_recent_join, &all_records_join)?;

        let report = RunReport {
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            jobs: job_reports,
            n_observations: frozen.len(),
            n_duplicates_collapsed,
            n_superseded,
            n_corrections: reconciled.n_corrections,
            n_canonical_sites: reconciled.canonical.len(),
            ties: reconciled.ties,
            sites_without_year: reconciled.sites_without_year,
            referential,
            outputs: paths.all(),
        };
        write_report(&paths, &report)?;

        info!(
            "Run {} finished: {}/{} jobs completed, {} observations, {} canonical sites",
            ctx.run_id,
            report.jobs.len() - report.n_failed_jobs(),
            report.jobs.len(),
            report.n_observations,
            report.n_canonical_sites
        );
        Ok(report)
    }
}

/// True when a later-year survey of the same source covered this site
fn is_superseded(surveyed: Option<&SurveyedByYear>, observation: &Observation) -> bool {
    let Some(surveyed) = surveyed else {
        return false;
    };
    let Some(year) = observation.year else {
        return false;
    };
    surveyed
        .range((Bound::Excluded(year), Bound::Unbounded))
        .any(|(_, sites)| sites.contains(&observation.site_code))
}
