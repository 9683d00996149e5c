//! Observation repository
//!
//! Append-only accumulator for the observations produced by every
//! (source, year) job. Duplicate (site, year, source) keys can only arise
//! from overlapping datasets within one source (e.g. adjacent flight areas
//! covering the same site); the collapse rule keeps the row with the
//! greater coverage measure. Once every job has completed the repository is
//! frozen into a deterministically ordered, immutable view for the
//! reconciler.

use std::collections::HashMap;

use tracing::info;

use kelpline_common::records::{Observation, SiteCode, Year};

/// What happened to an inserted observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Key already present with a smaller measure; row replaced
    ReplacedExisting,
    /// Key already present with an equal or greater measure; row discarded
    Discarded,
}

type Key = (SiteCode, Option<Year>, String);

/// Append-only collection of observations across all sources and years
#[derive(Debug, Default)]
pub struct ObservationRepository {
    observations: Vec<Observation>,
    index: HashMap<Key, usize>,
    n_collapsed: u64,
}

impl ObservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one observation, collapsing duplicate keys
    pub fn insert(&mut self, observation: Observation) -> InsertOutcome {
        let key = observation.key();
        match self.index.get(&key) {
            None => {
                self.index.insert(key, self.observations.len());
                self.observations.push(observation);
                InsertOutcome::Inserted
            }
            Some(&existing_index) => {
                self.n_collapsed += 1;
                let existing = &self.observations[existing_index];
                let existing_measure = existing.raw_measure.unwrap_or(f64::NEG_INFINITY);
                let new_measure = observation.raw_measure.unwrap_or(f64::NEG_INFINITY);
                if new_measure > existing_measure {
                    info!(
                        "Collapsed duplicate {}/{:?}/{}: kept larger measure {new_measure}",
                        observation.site_code, observation.year, observation.source
                    );
                    self.observations[existing_index] = observation;
                    InsertOutcome::ReplacedExisting
                } else {
                    info!(
                        "Collapsed duplicate {}/{:?}/{}: kept existing measure {existing_measure}",
                        observation.site_code, observation.year, observation.source
                    );
                    InsertOutcome::Discarded
                }
            }
        }
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for observation in observations {
            self.insert(observation);
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn n_collapsed(&self) -> u64 {
        self.n_collapsed
    }

    /// Freeze into an immutable, deterministically ordered view
    pub fn freeze(mut self) -> FrozenRepository {
        self.observations.sort_by(|a, b| {
            a.site_code
                .cmp(&b.site_code)
                .then(a.year.cmp(&b.year))
                .then_with(|| a.source.cmp(&b.source))
        });
        FrozenRepository {
            observations: self.observations,
            n_collapsed: self.n_collapsed,
        }
    }
}

/// The complete, immutable repository the reconciler consumes
#[derive(Debug)]
pub struct FrozenRepository {
    observations: Vec<Observation>,
    n_collapsed: u64,
}

impl FrozenRepository {
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn n_collapsed(&self) -> u64 {
        self.n_collapsed
    }
}
