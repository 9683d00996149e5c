//! Adapter for pre-classified tabular sources
//!
//! Some programs deliver attribute tables rather than usable geometry: one
//! row per surveyed shoreline segment with presence already recorded. The
//! adapter groups rows per site and year and keeps the maximum presence, so
//! a site is present if any of its segments was. Site codes missing from a
//! row are synthesized from the region prefix plus a zero-padded site
//! number, matching the container layer's coding scheme.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use kelpline_common::layers::{TabularDataset, TabularRow};
use kelpline_common::records::{Observation, Presence, SiteCode, Year};

use crate::adapters::{resolve_dataset_year, NormalizedBatch};
use crate::config::{DatasetConfig, SourceConfig, YearRule};
use crate::error::SynthError;

/// Normalize one tabular dataset into canonical observations
pub fn normalize(
    job_label: &str,
    config: &SourceConfig,
    dataset: &DatasetConfig,
    table: &TabularDataset,
) -> Result<NormalizedBatch, SynthError> {
    let dataset_year = resolve_dataset_year(&config.year_rule, &dataset.name).map_err(
        |message| SynthError::Schema {
            job: job_label.to_string(),
            message,
        },
    )?;

    let mut batch = NormalizedBatch::default();
    let mut grouped: BTreeMap<(SiteCode, Option<Year>), Presence> = BTreeMap::new();

    for (index, row) in table.rows.iter().enumerate() {
        let Some(site_code) = resolve_site_code(row) else {
            let message =
                format!("{job_label}: row {index} has neither site_code nor region/site_no");
            warn!("{message}");
            batch.warnings.push(message);
            continue;
        };

        let year = match &config.year_rule {
            YearRule::FeatureYear => {
                if row.year.is_none() {
                    let message = format!(
                        "{job_label}: row {index} ({site_code}) has no year; kept in \
                         history only"
                    );
                    warn!("{message}");
                    batch.warnings.push(message);
                }
                row.year
            }
            _ => dataset_year,
        };

        grouped
            .entry((site_code, year))
            .and_modify(|presence| {
                if row.presence.is_present() {
                    *presence = Presence::Present;
                }
            })
            .or_insert(row.presence);
    }

    let mut surveyed: BTreeMap<Year, HashSet<SiteCode>> = BTreeMap::new();
    for ((site_code, year), presence) in grouped {
        if let Some(year) = year {
            surveyed.entry(year).or_default().insert(site_code.clone());
        }
        if config.presence_only && !presence.is_present() {
            continue;
        }
        batch.observations.push(Observation {
            site_code,
            year,
            source: config.name.clone(),
            source_url: config.url.clone(),
            presence,
            // tabular sources carry no proportional coverage
            abundance: None,
            raw_measure: None,
        });
    }

    batch.surveyed = surveyed.into_iter().collect();
    Ok(batch)
}

/// Direct site code, or region prefix + four-digit zero-padded site number
fn resolve_site_code(row: &TabularRow) -> Option<SiteCode> {
    if let Some(site_code) = &row.site_code {
        return Some(site_code.clone());
    }
    match (&row.region, row.site_no) {
        (Some(region), Some(site_no)) => Some(format!("{region}{site_no:04}")),
        _ => None,
    }
}
