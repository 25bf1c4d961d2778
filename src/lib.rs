//! Batch extraction of resonant wavelengths from fiber-optic reflection
//! spectra.
//!
//! ```text
//!  file ─▶ loader ─▶ SpectrumRecord ─▶ Pipeline(stage₁ … stageₙ)
//!                                            │
//!                                            ▼
//!                          ResultTable row ─▶ checkpoint / export
//! ```
//!
//! A [`BatchRunner`] owns the table and the checkpoint file; each source
//! is loaded, folded through the [`Pipeline`], and appended as one row.

pub mod batch;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod stages;
pub mod table;

pub use batch::{BatchOptions, BatchReport, BatchRunner, RecordOutcome};
pub use config::RunConfig;
pub use data::loader::{load_spectrum, LoaderOptions};
pub use data::model::{MetadataValue, SpectrumRecord};
pub use error::{Error, Result};
pub use pipeline::{LogSink, Pipeline, SpectrumSink, Stage, StageOutput};
pub use table::{ExportFormat, ResultTable};
