//! Canonical observation record schema
//!
//! One `Observation` is a single measurement of a monitoring site for one
//! (source, year) pair. Observations are accumulated across all sources and
//! years, then reconciled into one `CanonicalRecord` per site. Value types
//! (`Year`, `Presence`, `Abundance`) validate their domain at construction
//! and serialize as plain numbers so the CSV outputs stay stable.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Stable identifier of a monitoring site within the reference network
pub type SiteCode = String;

/// A validated four-digit survey year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Year(u16);

impl Year {
    /// Create a year, rejecting anything that is not four digits
    pub fn new(year: u16) -> Result<Self> {
        if (1000..=9999).contains(&year) {
            Ok(Year(year))
        } else {
            Err(Error::InvalidValue(format!(
                "year {year} is not a four-digit year"
            )))
        }
    }

    /// Parse a year from text, e.g. a dataset name suffix or attribute value
    pub fn parse(text: &str) -> Result<Self> {
        let value: u16 = text
            .trim()
            .parse()
            .map_err(|_| Error::InvalidValue(format!("unresolvable year {text:?}")))?;
        Year::new(value)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Year {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for Year {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = u16::deserialize(deserializer)?;
        Year::new(value).map_err(D::Error::custom)
    }
}

/// Binary presence flag: was any kelp detected within the container
///
/// Serializes as 0/1 to match the canonical table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Absent,
    Present,
}

impl Presence {
    /// Presence from a raw coverage measure against a source-specific epsilon
    pub fn from_measure(raw_measure: f64, epsilon: f64) -> Self {
        if raw_measure > epsilon {
            Presence::Present
        } else {
            Presence::Absent
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Presence::Absent => 0,
            Presence::Present => 1,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, Presence::Present)
    }
}

impl TryFrom<u8> for Presence {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Presence::Absent),
            1 => Ok(Presence::Present),
            other => Err(Error::InvalidValue(format!(
                "presence must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl Serialize for Presence {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Presence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Presence::try_from(value).map_err(D::Error::custom)
    }
}

/// Ordinal abundance class 0-4 derived from weighted proportional coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Abundance(u8);

impl Abundance {
    pub const MIN: Abundance = Abundance(0);
    pub const MAX: Abundance = Abundance(4);

    pub fn new(class: u8) -> Result<Self> {
        if class <= 4 {
            Ok(Abundance(class))
        } else {
            Err(Error::InvalidValue(format!(
                "abundance class must be 0-4, got {class}"
            )))
        }
    }

    /// Classify a weighted presence fraction into its ordinal class
    ///
    /// Half-open bins: (-inf,0] -> 0, (0,0.25] -> 1, (0.25,0.5] -> 2,
    /// (0.5,0.75] -> 3, (0.75,inf) -> 4.
    pub fn from_weighted_presence(weighted: f64) -> Self {
        if weighted <= 0.0 {
            Abundance(0)
        } else if weighted <= 0.25 {
            Abundance(1)
        } else if weighted <= 0.5 {
            Abundance(2)
        } else if weighted <= 0.75 {
            Abundance(3)
        } else {
            Abundance(4)
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Abundance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Abundance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Abundance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Abundance::new(value).map_err(D::Error::custom)
    }
}

/// Which direction a consistency correction moved an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Correction {
    /// presence = 0 but abundance > 0: abundance forced to 0
    AbundanceZeroed,
    /// presence = 1 but abundance = 0: abundance raised to class 1
    AbundanceRaised,
}

/// One measurement of a site for one (source, year) pair
///
/// `year` is `None` only for rows whose source could not resolve a year;
/// such rows are kept in the history table but never canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub site_code: SiteCode,
    pub year: Option<Year>,
    pub source: String,
    pub source_url: Option<String>,
    pub presence: Presence,
    pub abundance: Option<Abundance>,
    pub raw_measure: Option<f64>,
}

impl Observation {
    /// Uniqueness key prior to reconciliation
    pub fn key(&self) -> (SiteCode, Option<Year>, String) {
        (self.site_code.clone(), self.year, self.source.clone())
    }

    /// Resolve a presence/abundance disagreement in place
    ///
    /// Independent presence and abundance pipelines can disagree on the same
    /// measurement; presence wins and abundance is adjusted to the nearest
    /// consistent class. Returns what was changed, if anything.
    pub fn apply_consistency_correction(&mut self) -> Option<Correction> {
        match (self.presence, self.abundance) {
            (Presence::Absent, Some(a)) if a.as_u8() > 0 => {
                self.abundance = Some(Abundance::MIN);
                Some(Correction::AbundanceZeroed)
            }
            (Presence::Present, Some(a)) if a.as_u8() == 0 => {
                self.abundance = Some(Abundance(1));
                Some(Correction::AbundanceRaised)
            }
            _ => None,
        }
    }

    /// Check the corrected-record invariant
    pub fn is_consistent(&self) -> bool {
        match (self.presence, self.abundance) {
            (Presence::Absent, None) => true,
            (Presence::Absent, Some(a)) => a.as_u8() == 0,
            (Presence::Present, None) => true,
            (Presence::Present, Some(a)) => (1..=4).contains(&a.as_u8()),
        }
    }
}

/// The reconciled most-recent state for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub site_code: SiteCode,
    pub year: Year,
    pub source: String,
    pub source_url: Option<String>,
    pub presence: Presence,
    pub abundance: Option<Abundance>,
    pub raw_measure: Option<f64>,
    /// How many observations shared the most-recent year before tie-breaking
    pub n_sources_considered: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_rejects_short_values() {
        assert!(Year::new(999).is_err());
        assert!(Year::new(2022).is_ok());
        assert!(Year::parse("2019").is_ok());
        assert!(Year::parse("19").is_err());
        assert!(Year::parse("kelp").is_err());
    }

    #[test]
    fn presence_epsilon_is_strict() {
        assert_eq!(Presence::from_measure(0.0, 0.0), Presence::Absent);
        assert_eq!(Presence::from_measure(0.0001, 0.0), Presence::Present);
        // measure exactly at epsilon stays absent; marker stripping upstream
        // keeps genuine beds away from this boundary
        assert_eq!(Presence::from_measure(0.5, 0.5), Presence::Absent);
        assert_eq!(Presence::from_measure(0.51, 0.5), Presence::Present);
    }

    #[test]
    fn abundance_bins_are_half_open() {
        assert_eq!(Abundance::from_weighted_presence(0.0).as_u8(), 0);
        assert_eq!(Abundance::from_weighted_presence(-0.5).as_u8(), 0);
        assert_eq!(Abundance::from_weighted_presence(0.25).as_u8(), 1);
        assert_eq!(Abundance::from_weighted_presence(0.26).as_u8(), 2);
        assert_eq!(Abundance::from_weighted_presence(0.5).as_u8(), 2);
        assert_eq!(Abundance::from_weighted_presence(0.75).as_u8(), 3);
        assert_eq!(Abundance::from_weighted_presence(1.0).as_u8(), 4);
    }

    #[test]
    fn consistency_correction_zeroes_abundance_for_absent() {
        let mut obs = Observation {
            site_code: "AR0101".into(),
            year: Some(Year::new(2020).unwrap()),
            source: "test".into(),
            source_url: None,
            presence: Presence::Absent,
            abundance: Some(Abundance::new(3).unwrap()),
            raw_measure: Some(0.0),
        };
        assert_eq!(
            obs.apply_consistency_correction(),
            Some(Correction::AbundanceZeroed)
        );
        assert_eq!(obs.abundance, Some(Abundance::MIN));
        assert!(obs.is_consistent());
    }

    #[test]
    fn consistency_correction_raises_abundance_for_present() {
        let mut obs = Observation {
            site_code: "AR0101".into(),
            year: Some(Year::new(2020).unwrap()),
            source: "test".into(),
            source_url: None,
            presence: Presence::Present,
            abundance: Some(Abundance::MIN),
            raw_measure: Some(2.0),
        };
        assert_eq!(
            obs.apply_consistency_correction(),
            Some(Correction::AbundanceRaised)
        );
        assert_eq!(obs.abundance, Some(Abundance::new(1).unwrap()));
        assert!(obs.is_consistent());
    }

    #[test]
    fn consistent_records_are_untouched() {
        let mut obs = Observation {
            site_code: "AR0101".into(),
            year: None,
            source: "test".into(),
            source_url: None,
            presence: Presence::Present,
            abundance: None,
            raw_measure: None,
        };
        assert_eq!(obs.apply_consistency_correction(), None);
        assert!(obs.is_consistent());
    }
}
