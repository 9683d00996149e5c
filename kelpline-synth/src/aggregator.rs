//! Spatial aggregation of survey geometry onto containers
//!
//! For one (source, year) job: restrict the container layer to the survey
//! footprint, intersect each remaining container with the survey features,
//! and emit one raw coverage measure per container (or per container
//! sub-segment). Containers outside the footprint are excluded entirely --
//! they were not surveyed, which must never be confused with a surveyed
//! container whose coverage is zero.

use geo::{Area, BooleanOps, EuclideanLength, Intersects, MultiPolygon};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use kelpline_common::layers::{ContainerLayer, Geometry, SurveyFeature, SurveyFootprint};
use kelpline_common::records::SiteCode;

use crate::config::MeasureUnit;

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Aggregation failure; isolated to the (source, year) job that hit it
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Declared unit cannot measure this container/feature geometry pair
    #[error("unit {unit:?} cannot measure {container} container against {feature} survey")]
    UnitMismatch {
        unit: MeasureUnit,
        container: &'static str,
        feature: &'static str,
    },

    /// Line-on-line overlap has no meaningful coverage measure
    #[error("line container against line survey has no coverage measure")]
    LineOnLine,
}

/// Raw coverage for one container (or sub-segment) inside the footprint
#[derive(Debug, Clone, Serialize)]
pub struct CoverageRow {
    pub site_code: SiteCode,
    pub segment: Option<String>,
    /// Coverage in the batch unit; 0 means surveyed and absent
    pub raw_measure: f64,
    /// The container's own measure, for sub-segment weighting
    pub container_measure: f64,
    /// Original feature total, present only for subdivided layers
    pub total_measure: Option<f64>,
}

/// One aggregated batch; a single unit applies to every row
#[derive(Debug, Clone, Serialize)]
pub struct AggregateBatch {
    pub unit: MeasureUnit,
    pub rows: Vec<CoverageRow>,
    /// Confirmed-absence marker features stripped before intersection
    pub n_markers_stripped: usize,
}

/// Aggregation knobs taken from the source configuration
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub unit: MeasureUnit,
    /// Features at or below this base measure are absence markers
    pub absence_marker_max_measure: Option<f64>,
}

/// Aggregate one survey layer onto the containers
///
/// With no footprint (presence-only sources) every container is treated as
/// within scope; the adapter drops absent rows afterwards.
pub fn aggregate(
    containers: &ContainerLayer,
    footprint: Option<&SurveyFootprint>,
    features: &[SurveyFeature],
    options: &AggregateOptions,
) -> Result<AggregateBatch, AggregateError> {
    let (features, n_markers_stripped) = strip_absence_markers(features, options);

    let mut rows = Vec::new();
    for container in &containers.containers {
        if let Some(footprint) = footprint {
            if !intersects_footprint(&container.geometry, &footprint.geometry) {
                // not surveyed: no row at all
                continue;
            }
        }

        let mut raw_measure = 0.0;
        for feature in &features {
            raw_measure +=
                measure_in_unit(&container.geometry, &feature.geometry, options.unit)?;
        }

        rows.push(CoverageRow {
            site_code: container.site_code.clone(),
            segment: container.segment.clone(),
            raw_measure,
            container_measure: natural_measure(&container.geometry),
            total_measure: container.total_measure,
        });
    }

    debug!(
        "Aggregated {} of {} containers ({} markers stripped)",
        rows.len(),
        containers.containers.len(),
        n_markers_stripped
    );

    Ok(AggregateBatch {
        unit: options.unit,
        rows,
        n_markers_stripped,
    })
}

/// Remove confirmed-absence marker features
///
/// One source family encodes "surveyed, no kelp" as deliberately tiny
/// polygons; anything strictly below the configured threshold is a marker.
/// A genuine bed exactly at the threshold survives.
fn strip_absence_markers<'a>(
    features: &'a [SurveyFeature],
    options: &AggregateOptions,
) -> (Vec<&'a SurveyFeature>, usize) {
    match options.absence_marker_max_measure {
        None => (features.iter().collect(), 0),
        Some(threshold) => {
            let mut kept = Vec::with_capacity(features.len());
            let mut stripped = 0;
            for feature in features {
                if base_measure(&feature.geometry) < threshold {
                    stripped += 1;
                } else {
                    kept.push(feature);
                }
            }
            (kept, stripped)
        }
    }
}

fn intersects_footprint(geometry: &Geometry, footprint: &MultiPolygon<f64>) -> bool {
    match geometry {
        Geometry::Polygons(mp) => mp.intersects(footprint),
        Geometry::Lines(ml) => ml.intersects(footprint),
    }
}

/// Measure in base coordinate units: square meters or meters
fn base_measure(geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Polygons(mp) => mp.unsigned_area(),
        Geometry::Lines(ml) => ml.euclidean_length(),
    }
}

/// A geometry's own natural measure: hectares for polygons, meters for lines
fn natural_measure(geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Polygons(mp) => mp.unsigned_area() / SQUARE_METERS_PER_HECTARE,
        Geometry::Lines(ml) => ml.euclidean_length(),
    }
}

/// Overlap between one container and one survey feature, in the batch unit
fn measure_in_unit(
    container: &Geometry,
    feature: &Geometry,
    unit: MeasureUnit,
) -> Result<f64, AggregateError> {
    match (unit, container, feature) {
        (MeasureUnit::Hectares, Geometry::Polygons(c), Geometry::Polygons(f)) => {
            Ok(c.intersection(f).unsigned_area() / SQUARE_METERS_PER_HECTARE)
        }
        (MeasureUnit::Meters, Geometry::Polygons(c), Geometry::Lines(f)) => {
            Ok(c.clip(f, false).euclidean_length())
        }
        (MeasureUnit::Meters, Geometry::Lines(c), Geometry::Polygons(f)) => {
            Ok(f.clip(c, false).euclidean_length())
        }
        (_, Geometry::Lines(_), Geometry::Lines(_)) => Err(AggregateError::LineOnLine),
        (unit, container, feature) => Err(AggregateError::UnitMismatch {
            unit,
            container: container.kind(),
            feature: feature.kind(),
        }),
    }
}
