//! Presence and abundance classification
//!
//! Turns the raw coverage rows for a batch into one `(presence, abundance)`
//! per site. Sites represented by several weighted sub-segments get an
//! ordinal abundance class from the weighted presence fraction; sites with a
//! single undivided container carry presence only and a null abundance,
//! since not every source supports proportional coverage.

use std::collections::BTreeMap;

use tracing::warn;

use kelpline_common::records::{Abundance, Presence, SiteCode};

use crate::aggregator::{AggregateBatch, CoverageRow};

/// Classification result for one site within one (source, year) batch
#[derive(Debug, Clone, PartialEq)]
pub struct SiteClassification {
    pub site_code: SiteCode,
    pub presence: Presence,
    pub abundance: Option<Abundance>,
    /// Total raw coverage across the site's rows, in the batch unit
    pub raw_measure: f64,
    /// Weighted presence fraction, when sub-segment weights were available
    pub weighted_presence: Option<f64>,
}

/// Classify every site in an aggregated batch
///
/// `epsilon` is the source-specific presence threshold; comparison is
/// strictly greater, so tiny residue from the geometry engine stays absent.
pub fn classify_batch(batch: &AggregateBatch, epsilon: f64) -> Vec<SiteClassification> {
    let mut by_site: BTreeMap<&str, Vec<&CoverageRow>> = BTreeMap::new();
    for row in &batch.rows {
        by_site.entry(row.site_code.as_str()).or_default().push(row);
    }

    by_site
        .into_iter()
        .map(|(site_code, rows)| classify_site(site_code, &rows, epsilon))
        .collect()
}

fn classify_site(site_code: &str, rows: &[&CoverageRow], epsilon: f64) -> SiteClassification {
    let raw_measure: f64 = rows.iter().map(|r| r.raw_measure).sum();
    let presence = if rows
        .iter()
        .any(|r| Presence::from_measure(r.raw_measure, epsilon).is_present())
    {
        Presence::Present
    } else {
        Presence::Absent
    };

    let weighted_presence = weighted_presence(site_code, rows, epsilon);
    let abundance = weighted_presence.map(Abundance::from_weighted_presence);

    SiteClassification {
        site_code: site_code.to_string(),
        presence,
        abundance,
        raw_measure,
        weighted_presence,
    }
}

/// Weighted presence fraction across sub-segments
///
/// weight_i = sub-segment measure / original feature total. Only defined
/// when every row of the site carries a usable total.
fn weighted_presence(site_code: &str, rows: &[&CoverageRow], epsilon: f64) -> Option<f64> {
    if !rows.iter().all(|r| r.total_measure.is_some()) {
        return None;
    }
    let mut weighted = 0.0;
    for row in rows {
        let Some(total) = row.total_measure else {
            return None;
        };
        if total <= 0.0 {
            warn!(
                "Site {site_code}: non-positive total measure {total}, \
                 skipping weighted abundance"
            );
            return None;
        }
        let weight = row.container_measure / total;
        if Presence::from_measure(row.raw_measure, epsilon).is_present() {
            weighted += weight;
        }
    }
    Some(weighted)
}
