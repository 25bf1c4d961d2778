use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::data::model::{MetadataValue, SpectrumRecord};
use crate::error::Result;
use crate::stages::power::record_max_power;
use crate::stages::{FilterConfig, InterpolateConfig, MaskConfig, ValleyConfig};

// ---------------------------------------------------------------------------
// Sinks – stages run only for their side effect
// ---------------------------------------------------------------------------

/// Consumer of a spectrum that produces nothing the pipeline keeps
/// (a plot, a report line, ...).
pub trait SpectrumSink: fmt::Debug + Send + Sync {
    fn consume(&self, record: &SpectrumRecord) -> Result<()>;
}

/// Logs a one-line summary of each record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SpectrumSink for LogSink {
    fn consume(&self, record: &SpectrumRecord) -> Result<()> {
        let domain = record
            .domain()
            .map(|(lo, hi)| format!("[{lo:e}, {hi:e}]"))
            .unwrap_or_else(|| "[]".to_string());
        match record.valley() {
            Some((wl, power)) => info!(
                "{}: {} samples over {domain}, valley at {wl:e} ({power})",
                record.name,
                record.len()
            ),
            None => info!("{}: {} samples over {domain}", record.name, record.len()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stage – closed set of pipeline steps
// ---------------------------------------------------------------------------

/// One pipeline step with its configuration.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Savitzky–Golay smoothing of the power channel.
    Filter(FilterConfig),
    /// Resampling onto a uniform wavelength grid.
    Interpolate(InterpolateConfig),
    /// Inclusive wavelength window.
    Mask(MaskConfig),
    /// Resonant valley detection.
    DetectValley(ValleyConfig),
    /// Global maximum power and its wavelength.
    MaxPower,
    /// Fixed measurand fields (temperature, strain, ...) merged into the
    /// metadata.
    Annotate(BTreeMap<String, MetadataValue>),
    Sink(Arc<dyn SpectrumSink>),
}

/// What a stage hands back to the pipeline.
#[derive(Debug, Clone)]
pub enum StageOutput {
    /// Replaces the current record.
    Record(SpectrumRecord),
    /// A measured point; metadata was updated in place.
    Point { wavelength: f64, power: f64 },
    /// Side effect only.
    Nothing,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(_) => "filter",
            Stage::Interpolate(_) => "interpolate",
            Stage::Mask(_) => "mask",
            Stage::DetectValley(_) => "detect_valley",
            Stage::MaxPower => "max_power",
            Stage::Annotate(_) => "annotate",
            Stage::Sink(_) => "sink",
        }
    }

    /// Record-independent parameter checks.
    pub fn validate(&self) -> Result<()> {
        match self {
            Stage::Filter(config) => config.check("<pipeline>", None),
            Stage::Interpolate(config) => config.check(),
            Stage::DetectValley(config) => config.check(),
            Stage::Mask(_) | Stage::MaxPower | Stage::Annotate(_) | Stage::Sink(_) => Ok(()),
        }
    }

    pub fn apply(&self, record: &mut SpectrumRecord) -> Result<StageOutput> {
        let output = match self {
            Stage::Filter(config) => StageOutput::Record(config.apply(record)?),
            Stage::Interpolate(config) => StageOutput::Record(config.apply(record)?),
            Stage::Mask(config) => StageOutput::Record(config.apply(record)),
            Stage::DetectValley(config) => {
                let (wavelength, power) = config.apply(record)?;
                StageOutput::Point { wavelength, power }
            }
            Stage::MaxPower => {
                let (wavelength, power) = record_max_power(record)?;
                StageOutput::Point { wavelength, power }
            }
            Stage::Annotate(fields) => {
                record.set_additional_info(fields.clone());
                StageOutput::Nothing
            }
            Stage::Sink(sink) => {
                sink.consume(record)?;
                StageOutput::Nothing
            }
        };
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered, immutable list of stages applied to each record.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline, rejecting stages with invalid parameters.
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        for stage in &stages {
            stage.validate()?;
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Fold the stages over `record`, left to right. The first failing
    /// stage ends the run and its error is returned unchanged.
    pub fn run_one(&self, record: SpectrumRecord) -> Result<SpectrumRecord> {
        let mut current = record;
        for stage in &self.stages {
            debug!("{}: {}", current.name, stage.name());
            if let StageOutput::Record(next) = stage.apply(&mut current)? {
                current = next;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::model::{RESONANT_WL, RESONANT_WL_POWER};
    use crate::error::Error;

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }

    impl SpectrumSink for Recorder {
        fn consume(&self, record: &SpectrumRecord) -> Result<()> {
            self.seen.lock().unwrap().push(record.len());
            Ok(())
        }
    }

    fn dip_record() -> SpectrumRecord {
        let wl: Vec<f64> = (0..=200).map(|i| 1540.0 + i as f64 * 0.1).collect();
        let power = wl
            .iter()
            .map(|&x| -10.0 - 20.0 / (1.0 + ((x - 1550.0) / 0.5).powi(2)))
            .collect();
        SpectrumRecord::new("dip", wl, power).unwrap()
    }

    #[test]
    fn test_full_pipeline() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::new(vec![
            Stage::Annotate(BTreeMap::from([("temp".to_string(), MetadataValue::Integer(20))])),
            Stage::Filter(FilterConfig::new(5, 2)),
            Stage::Mask(MaskConfig::new(1545.0, 1555.0)),
            Stage::Interpolate(InterpolateConfig::new(0.05).with_limits(1545.0, 1555.0)),
            Stage::DetectValley(ValleyConfig::new(5.0)),
            Stage::MaxPower,
            Stage::Sink(recorder.clone()),
        ])
        .unwrap();

        let out = pipeline.run_one(dip_record()).unwrap();
        assert_eq!(out.len(), 200);
        let (wl, _) = out.valley().unwrap();
        assert!((wl - 1550.0).abs() <= 0.05);
        assert!(out.metadata.contains_key(RESONANT_WL_POWER));
        assert_eq!(out.metadata["temp"], MetadataValue::Integer(20));
        assert_eq!(*recorder.seen.lock().unwrap(), vec![200]);
    }

    #[test]
    fn test_sink_leaves_record_unchanged() {
        let pipeline = Pipeline::new(vec![Stage::Sink(Arc::new(LogSink))]).unwrap();
        let rec = dip_record();
        let out = pipeline.run_one(rec.clone()).unwrap();
        assert_eq!(out.power(), rec.power());
        assert!(out.shares_wavelength_with(&rec));
    }

    #[test]
    fn test_failure_short_circuits() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::new(vec![
            Stage::Mask(MaskConfig::new(1600.0, 1700.0)),
            Stage::DetectValley(ValleyConfig::new(5.0)),
            Stage::Sink(recorder.clone()),
        ])
        .unwrap();
        let err = pipeline.run_one(dip_record()).unwrap_err();
        assert!(matches!(err, Error::NoValleyFound { .. }));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_survives_later_transforms() {
        let pipeline = Pipeline::new(vec![
            Stage::DetectValley(ValleyConfig::new(5.0)),
            Stage::Mask(MaskConfig::new(1541.0, 1542.0)),
        ])
        .unwrap();
        let out = pipeline.run_one(dip_record()).unwrap();
        assert!(out.metadata.contains_key(RESONANT_WL));
    }

    #[test]
    fn test_invalid_stage_rejected_at_construction() {
        let err = Pipeline::new(vec![Stage::Filter(FilterConfig::new(4, 1))]).unwrap_err();
        assert!(matches!(err, Error::FilterConfig { .. }));
        let err =
            Pipeline::new(vec![Stage::Interpolate(InterpolateConfig::new(-1.0))]).unwrap_err();
        assert!(matches!(err, Error::InvalidStageConfig { .. }));
    }
}
