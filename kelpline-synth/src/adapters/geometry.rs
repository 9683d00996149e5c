//! Adapter for geometry-backed survey programs
//!
//! Covers both areal surveys (polygon kelp beds summarized as hectares
//! within containers) and line surveys (clipped length in meters). The
//! dataset is partitioned into per-year batches, each batch is aggregated
//! against the containers restricted to the footprint, classified, and
//! mapped into canonical observations carrying the source's provenance.

use std::collections::HashSet;

use tracing::debug;

use kelpline_common::layers::{ContainerLayer, SurveyFootprint, SurveyLayer};
use kelpline_common::records::{Observation, Year};

use crate::aggregator::{aggregate, AggregateBatch, AggregateOptions};
use crate::adapters::{partition_features, NormalizedBatch};
use crate::classifier::{classify_batch, SiteClassification};
use crate::config::{DatasetConfig, SourceConfig};
use crate::error::SynthError;

/// Normalized observations plus per-year coverage for scratch audit
#[derive(Debug)]
pub struct GeometryJobOutput {
    pub batch: NormalizedBatch,
    pub coverage: Vec<(Year, AggregateBatch)>,
}

/// Normalize one geometry-backed dataset into canonical observations
pub fn normalize(
    job_label: &str,
    config: &SourceConfig,
    dataset: &DatasetConfig,
    containers: &ContainerLayer,
    survey: &SurveyLayer,
    footprint: Option<&SurveyFootprint>,
) -> Result<GeometryJobOutput, SynthError> {
    let partitions = partition_features(&config.year_rule, &dataset.name, &survey.features)
        .map_err(|message| SynthError::Schema {
            job: job_label.to_string(),
            message,
        })?;

    let options = AggregateOptions {
        unit: config.unit,
        absence_marker_max_measure: config.absence_marker_max_measure,
    };

    let mut batch = NormalizedBatch::default();
    let mut coverage = Vec::with_capacity(partitions.len());

    for (year, features) in partitions {
        let features: Vec<_> = features.into_iter().cloned().collect();
        let aggregated = aggregate(containers, footprint, &features, &options).map_err(
            |e| SynthError::Geometry {
                job: job_label.to_string(),
                message: e.to_string(),
            },
        )?;

        let classes = classify_batch(&aggregated, config.epsilon);
        let surveyed: HashSet<_> = classes.iter().map(|c| c.site_code.clone()).collect();
        debug!(
            "{job_label} {year}: {} sites surveyed, {} markers stripped",
            surveyed.len(),
            aggregated.n_markers_stripped
        );

        let mut kept = 0;
        for class in &classes {
            if config.presence_only && !class.presence.is_present() {
                continue;
            }
            batch.observations.push(to_observation(config, year, class));
            kept += 1;
        }
        if config.presence_only && kept < classes.len() {
            batch.warnings.push(format!(
                "{job_label} {year}: dropped {} absent rows (presence-only source)",
                classes.len() - kept
            ));
        }

        batch.surveyed.push((year, surveyed));
        coverage.push((year, aggregated));
    }

    Ok(GeometryJobOutput { batch, coverage })
}

fn to_observation(config: &SourceConfig, year: Year, class: &SiteClassification) -> Observation {
    Observation {
        site_code: class.site_code.clone(),
        year: Some(year),
        source: config.name.clone(),
        source_url: config.url.clone(),
        presence: class.presence,
        abundance: class.abundance,
        raw_measure: Some(class.raw_measure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use kelpline_common::layers::{Container, Geometry, SurveyFeature};
    use kelpline_common::records::Presence;

    use crate::config::{MeasureUnit, SourceKind, YearRule};

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    fn source(presence_only: bool) -> SourceConfig {
        SourceConfig {
            name: "Samish_AerialSurveys".into(),
            url: Some("https://example.org/samish".into()),
            kind: SourceKind::AreaSurvey,
            unit: MeasureUnit::Hectares,
            epsilon: 0.0,
            absence_marker_max_measure: None,
            presence_only,
            supersede_overlapped_years: false,
            year_rule: YearRule::DatasetSuffix,
            datasets: vec![],
        }
    }

    fn dataset(name: &str) -> DatasetConfig {
        DatasetConfig {
            name: name.into(),
            survey: None,
            footprint: None,
            table: None,
        }
    }

    fn containers() -> ContainerLayer {
        ContainerLayer {
            containers: vec![
                Container {
                    site_code: "s1".into(),
                    segment: None,
                    geometry: Geometry::Polygons(square(0.0, 0.0, 100.0)),
                    total_measure: None,
                },
                Container {
                    site_code: "s2".into(),
                    segment: None,
                    geometry: Geometry::Polygons(square(100.0, 0.0, 100.0)),
                    total_measure: None,
                },
            ],
        }
    }

    #[test]
    fn observations_carry_year_source_and_provenance() {
        let survey = SurveyLayer {
            features: vec![SurveyFeature {
                geometry: Geometry::Polygons(square(10.0, 10.0, 50.0)),
                year: None,
            }],
        };
        let footprint = SurveyFootprint {
            geometry: square(0.0, 0.0, 200.0),
            year: None,
        };

        let output = normalize(
            "Samish_AerialSurveys/kelp_2006",
            &source(false),
            &dataset("kelp_2006"),
            &containers(),
            &survey,
            Some(&footprint),
        )
        .unwrap();

        let obs = &output.batch.observations;
        assert_eq!(obs.len(), 2);
        assert!(obs.iter().all(|o| o.year == Some(Year::new(2006).unwrap())));
        assert!(obs.iter().all(|o| o.source == "Samish_AerialSurveys"));
        assert!(obs.iter().all(|o| o.source_url.is_some()));
        assert_eq!(obs[0].presence, Presence::Present);
        assert_eq!(obs[1].presence, Presence::Absent);
    }

    #[test]
    fn presence_only_drops_absent_rows_but_not_surveyed_sites() {
        let survey = SurveyLayer {
            features: vec![SurveyFeature {
                geometry: Geometry::Polygons(square(10.0, 10.0, 50.0)),
                year: None,
            }],
        };

        let output = normalize(
            "MRC_Kayak/kelp_2006",
            &source(true),
            &dataset("kelp_2006"),
            &containers(),
            &survey,
            None,
        )
        .unwrap();

        assert_eq!(output.batch.observations.len(), 1);
        assert_eq!(output.batch.observations[0].site_code, "s1");
        // both sites were still surveyed as far as supersession is concerned
        assert_eq!(output.batch.surveyed[0].1.len(), 2);
        assert_eq!(output.batch.warnings.len(), 1);
    }

    #[test]
    fn bad_year_suffix_is_a_schema_error() {
        let survey = SurveyLayer { features: vec![] };
        let footprint = SurveyFootprint {
            geometry: square(0.0, 0.0, 200.0),
            year: None,
        };
        let result = normalize(
            "Samish_AerialSurveys/kelp_final",
            &source(false),
            &dataset("kelp_final"),
            &containers(),
            &survey,
            Some(&footprint),
        );
        assert!(matches!(result, Err(SynthError::Schema { .. })));
    }
}
