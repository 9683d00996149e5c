//! Source adapters
//!
//! One adapter family per kind of survey program, selected at configuration
//! time (`SourceKind`), never by runtime attribute lookup. Every adapter is
//! a pure mapping from its inputs plus the source configuration to a batch
//! of canonical observations with provenance attached; adapters share no
//! mutable state, so jobs can run in parallel.

pub mod geometry;
pub mod tabular;

use std::collections::{BTreeMap, HashSet};

use kelpline_common::layers::SurveyFeature;
use kelpline_common::records::{Observation, SiteCode, Year};

use crate::config::YearRule;

/// Output of one normalized (source, dataset) job
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    /// Sites surveyed per year, kept for overlap supersession
    pub surveyed: Vec<(Year, HashSet<SiteCode>)>,
    /// Degraded items worth surfacing in the run report
    pub warnings: Vec<String>,
}

/// Resolve a dataset-level year, when the rule defines one
///
/// `FeatureYear` sources resolve per feature instead and return `None`.
pub fn resolve_dataset_year(rule: &YearRule, dataset_name: &str) -> Result<Option<Year>, String> {
    match rule {
        YearRule::DatasetSuffix => {
            let suffix: String = dataset_name
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            if suffix.len() < 4 {
                return Err(format!(
                    "dataset name {dataset_name:?} too short to carry a year suffix"
                ));
            }
            Year::parse(&suffix)
                .map(Some)
                .map_err(|_| format!("dataset name {dataset_name:?} has no year suffix"))
        }
        YearRule::FeatureYear => Ok(None),
        YearRule::Fixed { year } => Year::new(*year)
            .map(Some)
            .map_err(|e| e.to_string()),
    }
}

/// Split survey features into per-year batches
///
/// Single-year rules produce one batch; `FeatureYear` groups by the
/// feature's own year field and rejects features without one.
pub fn partition_features<'a>(
    rule: &YearRule,
    dataset_name: &str,
    features: &'a [SurveyFeature],
) -> Result<Vec<(Year, Vec<&'a SurveyFeature>)>, String> {
    match resolve_dataset_year(rule, dataset_name)? {
        Some(year) => Ok(vec![(year, features.iter().collect())]),
        None => {
            let mut by_year: BTreeMap<Year, Vec<&SurveyFeature>> = BTreeMap::new();
            for (index, feature) in features.iter().enumerate() {
                let year = feature.year.ok_or_else(|| {
                    format!("feature {index} of {dataset_name:?} has no year attribute")
                })?;
                by_year.entry(year).or_default().push(feature);
            }
            Ok(by_year.into_iter().collect())
        }
    }
}
