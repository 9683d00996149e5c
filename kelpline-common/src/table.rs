//! CSV IO for the canonical tables
//!
//! `all_records.csv` holds the full corrected history, one row per
//! observation; `most_recent.csv` holds exactly one row per site. Column
//! order comes from the record structs, so readers and writers stay in sync
//! with the schema by construction.

use std::path::Path;

use crate::error::Result;
use crate::records::{CanonicalRecord, Observation};

/// Write the full-history table
pub fn write_observations(path: &Path, observations: &[Observation]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for observation in observations {
        writer.serialize(observation)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a full-history table back, e.g. for downstream tooling or tests
pub fn read_observations(path: &Path) -> Result<Vec<Observation>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut observations = Vec::new();
    for row in reader.deserialize() {
        observations.push(row?);
    }
    Ok(observations)
}

/// Write the canonical most-recent table, one row per site
pub fn write_canonical(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a canonical table back
pub fn read_canonical(path: &Path) -> Result<Vec<CanonicalRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Abundance, Presence, Year};

    fn sample_observation(site: &str, year: Option<u16>, presence: Presence) -> Observation {
        Observation {
            site_code: site.into(),
            year: year.map(|y| Year::new(y).unwrap()),
            source: "WADNR_Kayak".into(),
            source_url: Some("https://example.org/kayak".into()),
            presence,
            abundance: presence
                .is_present()
                .then(|| Abundance::new(2).unwrap()),
            raw_measure: Some(1.25),
        }
    }

    #[test]
    fn observations_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_records.csv");
        let rows = vec![
            sample_observation("AR0101", Some(2022), Presence::Present),
            sample_observation("AR0102", Some(2022), Presence::Absent),
            sample_observation("AR0103", None, Presence::Present),
        ];
        write_observations(&path, &rows).unwrap();
        let back = read_observations(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn canonical_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("most_recent.csv");
        let records = vec![CanonicalRecord {
            site_code: "AR0101".into(),
            year: Year::new(2022).unwrap(),
            source: "WADNR_Kayak".into(),
            source_url: None,
            presence: Presence::Present,
            abundance: Some(Abundance::new(4).unwrap()),
            raw_measure: Some(3.0),
            n_sources_considered: 2,
        }];
        write_canonical(&path, &records).unwrap();
        let back = read_canonical(&path).unwrap();
        assert_eq!(back, records);
    }
}
