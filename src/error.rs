use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, transforming, or exporting spectra.
#[derive(Debug, Error)]
pub enum Error {
    /// Source file is malformed or a value could not be parsed.
    #[error("failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// Wavelength and power channels differ in length.
    #[error("'{name}' has {wavelength} wavelengths but {power} power values")]
    ChannelMismatch {
        name: String,
        wavelength: usize,
        power: usize,
    },

    /// Invalid Savitzky–Golay parameters for the record being smoothed.
    #[error("invalid smoothing parameters for '{name}': {message}")]
    FilterConfig { name: String, message: String },

    /// Wavelength channel is not strictly ascending.
    #[error("'{name}' has a repeated or out-of-order wavelength at {wavelength:e}")]
    UnorderedWavelength { name: String, wavelength: f64 },

    /// Requested resampling grid leaves the measured wavelength domain.
    #[error("grid point {point:e} for '{name}' lies outside [{lo:e}, {hi:e}]")]
    InterpolationDomain {
        name: String,
        point: f64,
        lo: f64,
        hi: f64,
    },

    /// No valley cleared the prominence threshold.
    #[error("no valleys found for '{name}' with prominence >= {prominence}")]
    NoValleyFound {
        name: String,
        prominence: f64,
        /// Set when the stage was configured to let the runner skip this record.
        recoverable: bool,
    },

    /// Output path extension does not name a known format.
    #[error("unsupported export format: .{extension}")]
    ExportFormat { extension: String },

    #[error("invalid {stage} configuration: {message}")]
    InvalidStageConfig { stage: &'static str, message: String },

    #[error("{stage} needs at least {needed} samples, '{name}' has {got}")]
    InsufficientSamples {
        stage: &'static str,
        name: String,
        needed: usize,
        got: usize,
    },

    /// Row is missing a column the table requires.
    #[error("row is missing required column '{0}'")]
    Schema(String),

    #[error("sink failed for '{name}': {message}")]
    Sink { name: String, message: String },

    /// A record failed and the batch policy stopped the run.
    #[error("batch aborted at {}: {cause}", source_path.display())]
    BatchAborted {
        source_path: PathBuf,
        #[source]
        cause: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether the runner may skip the offending record even when the batch
    /// is configured to abort on failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoValleyFound {
                recoverable: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
