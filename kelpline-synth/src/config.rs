//! Run manifest and per-source configuration
//!
//! A run is described declaratively in one TOML manifest: the container and
//! network layers, plus one `[[source]]` block per survey program. Each
//! source block selects an adapter family, a year-extraction rule, a
//! measurement unit, and the datasets to process. Relative paths resolve
//! against the manifest's directory.
//!
//! Example:
//!
//! ```toml
//! containers = "layers/containers.json"
//! network = "layers/network.json"
//! output_dir = "synth_results"
//!
//! [[source]]
//! name = "WADNR_Kayak"
//! url = "https://example.org/kayak"
//! kind = "area_survey"
//! unit = "hectares"
//! absence_marker_max_measure = 3.6
//! year_rule = { type = "feature_year" }
//!
//! [[source.dataset]]
//! name = "bed_perimeter_surveys"
//! survey = "layers/kayak/beds.json"
//! footprint = "layers/kayak/site_boundaries.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{SynthError, SynthResult};

/// Adapter family for a source, selected at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Polygon kelp beds summarized within containers (areal coverage)
    AreaSurvey,
    /// Line survey data measured as clipped length
    LineSurvey,
    /// Pre-classified attribute tables with per-segment presence
    Tabular,
}

/// Unit of the raw coverage measure; never mixed within a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureUnit {
    #[default]
    Hectares,
    Meters,
}

/// How a dataset's survey year is resolved
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum YearRule {
    /// Last four characters of the dataset name
    DatasetSuffix,
    /// Per-feature (or per-row) year field
    FeatureYear,
    /// Fixed literal for single-year sources
    Fixed { year: u16 },
}

/// One dataset belonging to a source
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name; with `year_rule = "dataset_suffix"` the last four
    /// characters must be the survey year
    pub name: String,
    /// Survey geometry layer (area_survey / line_survey sources)
    #[serde(default)]
    pub survey: Option<PathBuf>,
    /// Survey footprint; absent only for presence-only sources
    #[serde(default)]
    pub footprint: Option<PathBuf>,
    /// Attribute table (tabular sources)
    #[serde(default)]
    pub table: Option<PathBuf>,
}

/// Configuration for one survey program
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Source name recorded on every observation
    pub name: String,
    /// Provenance URL recorded on every observation
    #[serde(default)]
    pub url: Option<String>,
    pub kind: SourceKind,
    #[serde(default)]
    pub unit: MeasureUnit,
    /// Presence threshold on the raw measure; strictly-greater comparison
    #[serde(default)]
    pub epsilon: f64,
    /// Features at or below this base measure (square meters / meters) are
    /// confirmed-absence markers and are stripped before aggregation
    #[serde(default)]
    pub absence_marker_max_measure: Option<f64>,
    /// No trustworthy footprint: drop surveyed-absent rows instead of
    /// emitting them as confirmed absence
    #[serde(default)]
    pub presence_only: bool,
    /// Drop an observation when a later-year job of this source surveyed
    /// the same site (configurable business rule, off by default)
    #[serde(default)]
    pub supersede_overlapped_years: bool,
    pub year_rule: YearRule,
    #[serde(rename = "dataset", default)]
    pub datasets: Vec<DatasetConfig>,
}

/// The declarative run manifest
#[derive(Debug, Clone, Deserialize)]
pub struct RunManifest {
    /// Container layer path
    pub containers: PathBuf,
    /// Reference network layer path
    pub network: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("synth_results")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("scratch")
}

impl RunManifest {
    /// Load and validate a manifest, resolving paths against its directory
    pub fn from_path(path: &Path) -> SynthResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SynthError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut manifest: RunManifest = toml::from_str(&text)
            .map_err(|e| SynthError::Config(format!("cannot parse {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.resolve_paths(base);
        manifest.validate()?;
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.containers, base);
        resolve(&mut self.network, base);
        resolve(&mut self.output_dir, base);
        resolve(&mut self.scratch_dir, base);
        for source in &mut self.sources {
            for dataset in &mut source.datasets {
                if let Some(survey) = dataset.survey.as_mut() {
                    resolve(survey, base);
                }
                if let Some(footprint) = dataset.footprint.as_mut() {
                    resolve(footprint, base);
                }
                if let Some(table) = dataset.table.as_mut() {
                    resolve(table, base);
                }
            }
        }
    }

    /// Structural validation; per-dataset data problems surface later as
    /// isolated job failures
    pub fn validate(&self) -> SynthResult<()> {
        for source in &self.sources {
            if source.datasets.is_empty() {
                return Err(SynthError::Config(format!(
                    "source {} has no datasets",
                    source.name
                )));
            }
            for dataset in &source.datasets {
                match source.kind {
                    SourceKind::AreaSurvey | SourceKind::LineSurvey => {
                        if dataset.survey.is_none() {
                            return Err(SynthError::Config(format!(
                                "dataset {}/{} needs a survey layer",
                                source.name, dataset.name
                            )));
                        }
                        if dataset.footprint.is_none() && !source.presence_only {
                            return Err(SynthError::Config(format!(
                                "dataset {}/{} has no footprint; only presence-only \
                                 sources may omit one",
                                source.name, dataset.name
                            )));
                        }
                    }
                    SourceKind::Tabular => {
                        if dataset.table.is_none() {
                            return Err(SynthError::Config(format!(
                                "dataset {}/{} needs a table",
                                source.name, dataset.name
                            )));
                        }
                    }
                }
            }
            if let Some(threshold) = source.absence_marker_max_measure {
                if threshold < 0.0 {
                    return Err(SynthError::Config(format!(
                        "source {}: absence marker threshold must be >= 0",
                        source.name
                    )));
                }
            }
            if let YearRule::Fixed { year } = source.year_rule {
                if !(1000..=9999).contains(&year) {
                    return Err(SynthError::Config(format!(
                        "source {}: fixed year {year} is not a four-digit year",
                        source.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
