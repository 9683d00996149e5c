//! Temporal reconciliation
//!
//! The single barrier stage of the pipeline: consumes the frozen repository
//! and produces the full corrected history plus exactly one canonical
//! most-recent record per site. Conflicts are never errors here; they are
//! resolved deterministically and logged so a run is auditable and
//! repeatable.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use kelpline_common::records::{CanonicalRecord, Observation, SiteCode, Year};

use crate::repository::FrozenRepository;

/// A resolved most-recent-year tie, kept for the run report
#[derive(Debug, Clone, Serialize)]
pub struct TieBreak {
    pub site_code: SiteCode,
    pub year: Year,
    pub n_candidates: u32,
    pub selected_source: String,
}

/// Everything the reconciler derives from the repository
#[derive(Debug)]
pub struct ReconcileOutput {
    /// Corrected full history, one row per observation
    pub history: Vec<Observation>,
    /// One record per distinct site, ordered by site code
    pub canonical: Vec<CanonicalRecord>,
    pub n_corrections: u64,
    pub ties: Vec<TieBreak>,
    /// Sites with no usable year anywhere; reported, never canonicalized
    pub sites_without_year: Vec<SiteCode>,
}

/// Reconcile the full repository into history + canonical tables
pub fn reconcile(repository: &FrozenRepository) -> ReconcileOutput {
    // step 1: consistency correction over every observation
    let mut n_corrections = 0;
    let history: Vec<Observation> = repository
        .observations()
        .iter()
        .cloned()
        .map(|mut observation| {
            if observation.apply_consistency_correction().is_some() {
                n_corrections += 1;
            }
            observation
        })
        .collect();

    // steps 3-5: per-site most-recent selection
    let mut by_site: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for observation in &history {
        by_site
            .entry(observation.site_code.as_str())
            .or_default()
            .push(observation);
    }

    let mut canonical = Vec::with_capacity(by_site.len());
    let mut ties = Vec::new();
    let mut sites_without_year = Vec::new();

    for (site_code, observations) in by_site {
        let Some(max_year) = observations.iter().filter_map(|o| o.year).max() else {
            warn!("Site {site_code}: no observation with a usable year, skipping canonicalization");
            sites_without_year.push(site_code.to_string());
            continue;
        };

        let mut candidates: Vec<&Observation> = observations
            .iter()
            .copied()
            .filter(|o| o.year == Some(max_year))
            .collect();
        let n_candidates = candidates.len() as u32;
        candidates.sort_by(|a, b| prefer(a, b));
        let selected = candidates[0];

        if n_candidates > 1 {
            info!(
                "Tie at {site_code} {max_year}: {n_candidates} sources, selected {}",
                selected.source
            );
            ties.push(TieBreak {
                site_code: site_code.to_string(),
                year: max_year,
                n_candidates,
                selected_source: selected.source.clone(),
            });
        }

        canonical.push(CanonicalRecord {
            site_code: site_code.to_string(),
            year: max_year,
            source: selected.source.clone(),
            source_url: selected.source_url.clone(),
            presence: selected.presence,
            abundance: selected.abundance,
            raw_measure: selected.raw_measure,
            n_sources_considered: n_candidates,
        });
    }

    ReconcileOutput {
        history,
        canonical,
        n_corrections,
        ties,
        sites_without_year,
    }
}

/// Total preference order for same-year candidates
///
/// Greatest coverage measure first, then greatest abundance, then
/// lexicographically smallest source name. Source names are unique within a
/// (site, year) after repository collapse, so the order is total and the
/// selection reproducible.
fn prefer(a: &Observation, b: &Observation) -> Ordering {
    let measure = |o: &Observation| o.raw_measure.unwrap_or(f64::NEG_INFINITY);
    let abundance = |o: &Observation| o.abundance.map(|a| i16::from(a.as_u8())).unwrap_or(-1);
    measure(b)
        .total_cmp(&measure(a))
        .then_with(|| abundance(b).cmp(&abundance(a)))
        .then_with(|| a.source.cmp(&b.source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpline_common::records::{Abundance, Presence};

    use crate::repository::ObservationRepository;

    fn obs(
        site: &str,
        year: Option<u16>,
        source: &str,
        presence: u8,
        abundance: Option<u8>,
        measure: Option<f64>,
    ) -> Observation {
        Observation {
            site_code: site.into(),
            year: year.map(|y| Year::new(y).unwrap()),
            source: source.into(),
            source_url: None,
            presence: Presence::try_from(presence).unwrap(),
            abundance: abundance.map(|a| Abundance::new(a).unwrap()),
            raw_measure: measure,
        }
    }

    fn frozen(observations: Vec<Observation>) -> FrozenRepository {
        let mut repo = ObservationRepository::new();
        repo.extend(observations);
        repo.freeze()
    }

    #[test]
    fn most_recent_year_wins() {
        let repo = frozen(vec![
            obs("s1", Some(2010), "a", 0, None, Some(0.0)),
            obs("s1", Some(2020), "a", 1, None, Some(2.0)),
        ]);
        let output = reconcile(&repo);

        assert_eq!(output.history.len(), 2);
        assert_eq!(output.canonical.len(), 1);
        let record = &output.canonical[0];
        assert_eq!(record.year, Year::new(2020).unwrap());
        assert_eq!(record.presence, Presence::Present);
        assert_eq!(record.n_sources_considered, 1);
    }

    #[test]
    fn tie_breaks_on_greater_coverage() {
        let repo = frozen(vec![
            obs("AR0101", Some(2022), "A", 1, None, Some(3.0)),
            obs("AR0101", Some(2022), "B", 0, None, Some(0.0)),
        ]);
        let output = reconcile(&repo);

        let record = &output.canonical[0];
        assert_eq!(record.source, "A");
        assert_eq!(record.n_sources_considered, 2);
        assert_eq!(output.ties.len(), 1);
        assert_eq!(output.ties[0].selected_source, "A");
    }

    #[test]
    fn tie_falls_back_to_abundance_then_source_name() {
        let repo = frozen(vec![
            obs("s1", Some(2022), "b", 1, Some(2), Some(1.0)),
            obs("s1", Some(2022), "a", 1, Some(4), Some(1.0)),
        ]);
        let output = reconcile(&repo);
        assert_eq!(output.canonical[0].source, "a");

        let repo = frozen(vec![
            obs("s1", Some(2022), "b", 1, Some(2), Some(1.0)),
            obs("s1", Some(2022), "a", 1, Some(2), Some(1.0)),
        ]);
        let output = reconcile(&repo);
        assert_eq!(output.canonical[0].source, "a");
    }

    #[test]
    fn consistency_correction_applies_to_history() {
        let repo = frozen(vec![
            obs("s1", Some(2022), "a", 0, Some(3), Some(0.0)),
            obs("s2", Some(2022), "a", 1, Some(0), Some(2.0)),
        ]);
        let output = reconcile(&repo);

        assert_eq!(output.n_corrections, 2);
        assert!(output.history.iter().all(|o| o.is_consistent()));
        assert_eq!(output.canonical[0].abundance, Some(Abundance::MIN));
        assert_eq!(output.canonical[1].abundance, Some(Abundance::new(1).unwrap()));
    }

    #[test]
    fn yearless_site_is_reported_not_canonicalized() {
        let repo = frozen(vec![
            obs("s1", None, "a", 1, None, None),
            obs("s2", Some(2022), "a", 1, None, Some(1.0)),
        ]);
        let output = reconcile(&repo);

        // still in history
        assert_eq!(output.history.len(), 2);
        assert_eq!(output.canonical.len(), 1);
        assert_eq!(output.canonical[0].site_code, "s2");
        assert_eq!(output.sites_without_year, vec!["s1".to_string()]);
    }

    #[test]
    fn yearless_row_does_not_block_a_dated_site() {
        let repo = frozen(vec![
            obs("s1", None, "a", 1, None, None),
            obs("s1", Some(2015), "b", 0, None, Some(0.0)),
        ]);
        let output = reconcile(&repo);
        assert_eq!(output.canonical.len(), 1);
        assert_eq!(output.canonical[0].year, Year::new(2015).unwrap());
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let observations = vec![
            obs("s1", Some(2022), "b", 1, Some(2), Some(1.0)),
            obs("s1", Some(2022), "a", 1, Some(4), Some(1.0)),
            obs("s2", Some(2010), "c", 0, None, Some(0.0)),
            obs("s3", None, "c", 1, None, None),
        ];
        let first = reconcile(&frozen(observations.clone()));
        let second = reconcile(&frozen(observations));
        assert_eq!(first.canonical, second.canonical);
        assert_eq!(first.history, second.history);
    }

    #[test]
    fn one_canonical_row_per_distinct_site() {
        let repo = frozen(vec![
            obs("s1", Some(2020), "a", 1, None, Some(1.0)),
            obs("s1", Some(2021), "b", 0, None, Some(0.0)),
            obs("s2", Some(1984), "c", 1, None, Some(0.5)),
        ]);
        let output = reconcile(&repo);
        let mut sites: Vec<_> = output.canonical.iter().map(|r| &r.site_code).collect();
        sites.dedup();
        assert_eq!(sites.len(), output.canonical.len());
        assert_eq!(output.canonical.len(), 2);
    }
}
