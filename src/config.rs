//! TOML run configuration.
//!
//! ```toml
//! output = "resonant_wavelengths.csv"
//!
//! [loader]
//! delimiter = ";"
//! wl_multiplier = 1.0
//!
//! [batch]
//! output_dir = "output"
//! batch_size = 50
//! ignore_errors = true
//! extra_columns = ["temperature"]
//!
//! [[stages]]
//! kind = "filter"
//! window_length = 45
//! polyorder = 3
//!
//! [[stages]]
//! kind = "interpolate"
//! wl_step = 0.5e-12
//! wl_limits = [1.49e-6, 1.62e-6]
//!
//! [[stages]]
//! kind = "detect_valley"
//! prominence = 5.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::batch::BatchOptions;
use crate::data::loader::LoaderOptions;
use crate::data::model::MetadataValue;
use crate::error::{Error, Result};
use crate::pipeline::{LogSink, Pipeline, Stage};
use crate::stages::{FilterConfig, InterpolateConfig, MaskConfig, ValleyConfig};

/// Root of a run configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct RunConfig {
    /// Final export destination; format follows the extension.
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub loader: LoaderOptions,

    #[serde(default)]
    pub batch: BatchOptions,

    /// Pipeline stages, in execution order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// One `[[stages]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    Filter(FilterConfig),
    Interpolate(InterpolateConfig),
    Mask(MaskConfig),
    DetectValley(ValleyConfig),
    MaxPower,
    Annotate {
        fields: BTreeMap<String, MetadataValue>,
    },
    /// Log a summary line per record.
    Report,
}

impl From<StageConfig> for Stage {
    fn from(config: StageConfig) -> Self {
        match config {
            StageConfig::Filter(c) => Stage::Filter(c),
            StageConfig::Interpolate(c) => Stage::Interpolate(c),
            StageConfig::Mask(c) => Stage::Mask(c),
            StageConfig::DetectValley(c) => Stage::DetectValley(c),
            StageConfig::MaxPower => Stage::MaxPower,
            StageConfig::Annotate { fields } => Stage::Annotate(fields),
            StageConfig::Report => Stage::Sink(Arc::new(LogSink)),
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the validated pipeline described by `[[stages]]`.
    pub fn pipeline(&self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(Error::InvalidStageConfig {
                stage: "pipeline",
                message: "no stages configured".to_string(),
            });
        }
        Pipeline::new(self.stages.iter().cloned().map(Stage::from).collect())
    }
}
