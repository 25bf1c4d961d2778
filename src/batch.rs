use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::Deserialize;

use crate::data::loader::{load_spectrum, LoaderOptions};
use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::table::{ExportFormat, ResultTable};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Batch-level policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Directory holding the checkpoint file; created on demand.
    pub output_dir: PathBuf,
    /// Checkpoint file name inside `output_dir`; its extension picks the
    /// format, a bare stem gets `.csv`.
    pub checkpoint_name: String,
    /// Rows appended between checkpoint writes.
    pub batch_size: usize,
    /// Skip failing sources instead of aborting the batch.
    pub ignore_errors: bool,
    /// Columns exported after `name, resonant_wl, resonant_wl_power`.
    pub extra_columns: Vec<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            checkpoint_name: "checkpoint.csv".to_string(),
            batch_size: 50,
            ignore_errors: false,
            extra_columns: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-record and per-batch results
// ---------------------------------------------------------------------------

/// Result of running one source through the loader and pipeline.
#[derive(Debug)]
pub enum RecordOutcome {
    Completed(SpectrumRecord),
    Failed(Error),
}

/// A source that failed and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub source: PathBuf,
    pub reason: String,
}

/// Summary of one [`BatchRunner::run`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Sources handed to the pipeline.
    pub processed: usize,
    /// Rows appended to the table.
    pub completed: usize,
    pub skipped: Vec<SkippedSource>,
    /// Checkpoint writes, including the final one.
    pub checkpoints: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Finished,
    Aborted,
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Drives the pipeline over many sources and owns the result table and
/// checkpoint file.
#[derive(Debug)]
pub struct BatchRunner {
    pipeline: Pipeline,
    loader: LoaderOptions,
    options: BatchOptions,
    checkpoint: PathBuf,
    checkpoint_format: ExportFormat,
    table: ResultTable,
    state: BatchState,
}

impl BatchRunner {
    pub fn new(
        pipeline: Pipeline,
        loader: LoaderOptions,
        options: BatchOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::InvalidStageConfig {
                stage: "batch",
                message: "batch_size must be at least 1".to_string(),
            });
        }
        let (checkpoint, checkpoint_format) =
            ExportFormat::resolve(&options.output_dir.join(&options.checkpoint_name))?;
        let table = ResultTable::new(options.extra_columns.iter().cloned());
        Ok(Self {
            pipeline,
            loader,
            options,
            checkpoint,
            checkpoint_format,
            table,
            state: BatchState::Idle,
        })
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn into_table(self) -> ResultTable {
        self.table
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.clone()
    }

    /// Load one source and run it through the pipeline.
    pub fn process_one(&self, source: &Path) -> RecordOutcome {
        let result =
            load_spectrum(source, &self.loader).and_then(|record| self.pipeline.run_one(record));
        match result {
            Ok(record) => RecordOutcome::Completed(record),
            Err(err) => RecordOutcome::Failed(err),
        }
    }

    /// Process `sources` in order, appending a row per completed record.
    ///
    /// A checkpoint is written every `batch_size` rows and once more when
    /// the loop ends. A failing source is skipped when `ignore_errors` is
    /// set (or the failure is recoverable); otherwise the batch stops with
    /// [`Error::BatchAborted`] and the rows appended so far are kept.
    ///
    /// Calling `run` again continues appending to the same table, so an
    /// aborted batch can be resumed with its unprocessed sources.
    pub fn run<P: AsRef<Path>>(&mut self, sources: &[P]) -> Result<BatchReport> {
        self.state = BatchState::Running;
        let result = self.run_sources(sources);
        self.state = match result {
            Ok(_) => BatchState::Finished,
            Err(_) => BatchState::Aborted,
        };
        result
    }

    fn run_sources<P: AsRef<Path>>(&mut self, sources: &[P]) -> Result<BatchReport> {
        std::fs::create_dir_all(&self.options.output_dir)?;
        let mut report = BatchReport::default();
        let mut abort = None;
        let total = sources.len();

        for (i, source) in sources.iter().enumerate() {
            let source = source.as_ref();
            info!("processing {}/{total}: {}", i + 1, source.display());
            report.processed += 1;

            match self.process_one(source) {
                RecordOutcome::Completed(record) => {
                    self.table.append_record(&record)?;
                    report.completed += 1;
                    if self.table.len() % self.options.batch_size == 0 {
                        self.write_checkpoint()?;
                        report.checkpoints += 1;
                    }
                }
                RecordOutcome::Failed(err)
                    if self.options.ignore_errors || err.is_recoverable() =>
                {
                    warn!("skipping {}: {err}", source.display());
                    report.skipped.push(SkippedSource {
                        source: source.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
                RecordOutcome::Failed(err) => {
                    error!("aborting batch at {}: {err}", source.display());
                    abort = Some(Error::BatchAborted {
                        source_path: source.to_path_buf(),
                        cause: Box::new(err),
                    });
                    break;
                }
            }
        }

        self.write_checkpoint()?;
        report.checkpoints += 1;

        match abort {
            Some(err) => Err(err),
            None => {
                info!(
                    "batch finished: {} rows, {} skipped",
                    report.completed,
                    report.skipped.len()
                );
                Ok(report)
            }
        }
    }

    /// Overwrite the checkpoint with the current table. The file is written
    /// beside the target and renamed into place.
    pub fn write_checkpoint(&self) -> Result<PathBuf> {
        let path = self.checkpoint_path();
        let partial = path.with_extension("partial");
        self.table.write(&partial, self.checkpoint_format)?;
        std::fs::rename(&partial, &path)?;
        info!("checkpoint: {} rows -> {}", self.table.len(), path.display());
        Ok(path)
    }

    /// Export the table, format chosen by extension.
    pub fn export(&self, path: &Path) -> Result<PathBuf> {
        self.table.export(path)
    }
}
