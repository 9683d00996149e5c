//! Network joining
//!
//! Attaches the reconciled tables onto the reference spatial network. The
//! most-recent join is one-to-one and outer: every network segment appears
//! exactly once, with null fields when no record exists, because "no data"
//! must stay distinguishable from "confirmed absence". The all-records join
//! is a one-to-many row expansion keyed by (site_code, year, source); a
//! single-row spatial join cannot represent that multiplicity.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use kelpline_common::layers::{Geometry, NetworkLayer};
use kelpline_common::records::{CanonicalRecord, Observation, SiteCode};

/// Referential mismatches found before joining; warnings, never fatal
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferentialReport {
    /// Site codes in the record tables with no network segment
    pub records_without_segment: Vec<SiteCode>,
    /// Network segments that no observation ever mentions
    pub segments_without_record: Vec<SiteCode>,
}

impl ReferentialReport {
    pub fn is_clean(&self) -> bool {
        self.records_without_segment.is_empty() && self.segments_without_record.is_empty()
    }
}

/// One network segment with its canonical record, if any
#[derive(Debug, Clone, Serialize)]
pub struct JoinedSegment {
    pub site_code: SiteCode,
    pub geometry: Geometry,
    pub record: Option<CanonicalRecord>,
}

/// The one-to-one most-recent spatial output
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalJoin {
    pub segments: Vec<JoinedSegment>,
}

/// One row of the one-to-many historical join
#[derive(Debug, Clone, Serialize)]
pub struct HistoryJoinRow {
    pub site_code: SiteCode,
    #[serde(flatten)]
    pub observation: ObservationFields,
    /// Null when the observation's site is missing from the network
    pub geometry: Option<Geometry>,
}

/// Observation attributes carried into the joined row
#[derive(Debug, Clone, Serialize)]
pub struct ObservationFields {
    pub year: Option<kelpline_common::records::Year>,
    pub source: String,
    pub source_url: Option<String>,
    pub presence: kelpline_common::records::Presence,
    pub abundance: Option<kelpline_common::records::Abundance>,
    pub raw_measure: Option<f64>,
}

/// The one-to-many all-records spatial output
#[derive(Debug, Clone, Serialize)]
pub struct HistoryJoin {
    pub rows: Vec<HistoryJoinRow>,
}

/// Cross-check site codes between record tables and network
pub fn validate_referential(
    network: &NetworkLayer,
    history: &[Observation],
) -> ReferentialReport {
    let network_codes = network.site_codes();
    let mut report = ReferentialReport::default();

    let mut seen = std::collections::HashSet::new();
    for observation in history {
        if seen.insert(observation.site_code.as_str())
            && !network_codes.contains(observation.site_code.as_str())
        {
            report.records_without_segment.push(observation.site_code.clone());
        }
    }
    for segment in &network.segments {
        if !history.iter().any(|o| o.site_code == segment.site_code) {
            report.segments_without_record.push(segment.site_code.clone());
        }
    }

    report.records_without_segment.sort();
    report.segments_without_record.sort();

    if !report.records_without_segment.is_empty() {
        warn!(
            "{} record site codes missing from the network: {:?}",
            report.records_without_segment.len(),
            report.records_without_segment
        );
    }
    if !report.segments_without_record.is_empty() {
        warn!(
            "{} network segments have no observation",
            report.segments_without_record.len()
        );
    }

    report
}

/// One-to-one outer join of the canonical table onto the network
pub fn join_most_recent(
    network: &NetworkLayer,
    canonical: &[CanonicalRecord],
) -> CanonicalJoin {
    let by_site: HashMap<&str, &CanonicalRecord> = canonical
        .iter()
        .map(|record| (record.site_code.as_str(), record))
        .collect();

    let segments = network
        .segments
        .iter()
        .map(|segment| JoinedSegment {
            site_code: segment.site_code.clone(),
            geometry: segment.geometry.clone(),
            record: by_site.get(segment.site_code.as_str()).map(|r| (*r).clone()),
        })
        .collect();

    CanonicalJoin { segments }
}

/// One-to-many row expansion of the full history onto the network
pub fn join_all_records(network: &NetworkLayer, history: &[Observation]) -> HistoryJoin {
    let by_site: HashMap<&str, &Geometry> = network
        .segments
        .iter()
        .map(|segment| (segment.site_code.as_str(), &segment.geometry))
        .collect();

    let rows = history
        .iter()
        .map(|observation| HistoryJoinRow {
            site_code: observation.site_code.clone(),
            observation: ObservationFields {
                year: observation.year,
                source: observation.source.clone(),
                source_url: observation.source_url.clone(),
                presence: observation.presence,
                abundance: observation.abundance,
                raw_measure: observation.raw_measure,
            },
            geometry: by_site
                .get(observation.site_code.as_str())
                .map(|g| (*g).clone()),
        })
        .collect();

    HistoryJoin { rows }
}
