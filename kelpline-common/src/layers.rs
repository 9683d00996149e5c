//! Spatial layer types
//!
//! Layers arrive pre-projected in a canonical JSON format produced by the
//! upstream data-preparation tooling: a container layer (fixed monitoring
//! units), per-(source, year) survey layers and footprints, the reference
//! spatial network, and tabular datasets for sources that ship attribute
//! tables instead of geometry. Coordinates are planar meters; readers for
//! proprietary geodatabase formats and CRS transformation live upstream.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use geo::{MultiLineString, MultiPolygon};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::records::{Presence, SiteCode, Year};

/// Survey or container geometry: areal beds or linear shoreline features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Polygons(MultiPolygon<f64>),
    Lines(MultiLineString<f64>),
}

impl Geometry {
    pub fn is_polygons(&self) -> bool {
        matches!(self, Geometry::Polygons(_))
    }

    /// Short name for error reporting
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Polygons(_) => "polygons",
            Geometry::Lines(_) => "lines",
        }
    }
}

/// A fixed spatial unit of the monitoring network
///
/// `segment` identifies a subdivision when the layer splits original
/// features into sub-segments; `total_measure` then carries the original
/// feature's full length/area so coverage can be weighted across segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub site_code: SiteCode,
    #[serde(default)]
    pub segment: Option<String>,
    pub geometry: Geometry,
    #[serde(default)]
    pub total_measure: Option<f64>,
}

/// The container layer against which coverage is measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerLayer {
    pub containers: Vec<Container>,
}

impl ContainerLayer {
    pub fn from_path(path: &Path) -> Result<Self> {
        let layer: ContainerLayer = load_json(path)?;
        layer.validate()?;
        Ok(layer)
    }

    /// Reject empty layers and duplicate (site_code, segment) pairs
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(Error::Layer("container layer has no features".into()));
        }
        let mut seen = HashSet::new();
        for container in &self.containers {
            let key = (container.site_code.clone(), container.segment.clone());
            if !seen.insert(key) {
                return Err(Error::Layer(format!(
                    "duplicate container {}{}",
                    container.site_code,
                    container
                        .segment
                        .as_deref()
                        .map(|s| format!(" segment {s}"))
                        .unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}

/// The spatial extent actually surveyed in one (source, year)
///
/// Containers outside the footprint were not surveyed, which is distinct
/// from surveyed-and-absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyFootprint {
    pub geometry: MultiPolygon<f64>,
    #[serde(default)]
    pub year: Option<Year>,
}

impl SurveyFootprint {
    pub fn from_path(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// One surveyed feature (kelp bed polygon or shoreline line)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyFeature {
    pub geometry: Geometry,
    #[serde(default)]
    pub year: Option<Year>,
}

/// A survey geometry layer for one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyLayer {
    pub features: Vec<SurveyFeature>,
}

impl SurveyLayer {
    pub fn from_path(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// One segment of the reference spatial network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSegment {
    pub site_code: SiteCode,
    pub geometry: Geometry,
}

/// Reference network onto which results are projected
///
/// Site codes here are a superset of the container layer; segments with no
/// observation anywhere stay in the joined outputs with null fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLayer {
    pub segments: Vec<NetworkSegment>,
}

impl NetworkLayer {
    pub fn from_path(path: &Path) -> Result<Self> {
        let layer: NetworkLayer = load_json(path)?;
        layer.validate()?;
        Ok(layer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(Error::Layer("network layer has no segments".into()));
        }
        let mut seen = HashSet::new();
        for segment in &self.segments {
            if !seen.insert(segment.site_code.clone()) {
                return Err(Error::Layer(format!(
                    "duplicate network site_code {}",
                    segment.site_code
                )));
            }
        }
        Ok(())
    }

    pub fn site_codes(&self) -> HashSet<&str> {
        self.segments.iter().map(|s| s.site_code.as_str()).collect()
    }
}

/// One row of a pre-classified tabular source
///
/// Either `site_code` is given directly, or it is synthesized from a region
/// prefix plus a zero-padded site number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularRow {
    #[serde(default)]
    pub site_code: Option<SiteCode>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub site_no: Option<u32>,
    pub presence: Presence,
    #[serde(default)]
    pub year: Option<Year>,
}

/// A tabular dataset for sources that arrive without usable geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularDataset {
    pub rows: Vec<TabularRow>,
}

impl TabularDataset {
    pub fn from_path(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Layer(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&text)?)
}
