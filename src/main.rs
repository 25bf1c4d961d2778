//! # process-spectra
//!
//! Runs a TOML-configured pipeline over reflection spectrum files and
//! writes one row of resonance data per file.
//!
//! ```bash
//! process-spectra run --config pipeline.toml data/spectra/
//! process-spectra check --config pipeline.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use process_spectra::{BatchRunner, RunConfig, Stage};

/// Resonant wavelength extraction for fiber-optic sensor spectra
#[derive(Parser)]
#[command(name = "process-spectra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process spectrum files (or directories of them) in order
    Run {
        /// Pipeline configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Final export path; overrides `output` from the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip failing files instead of aborting
        #[arg(long)]
        ignore_errors: bool,

        /// Rows between checkpoint writes
        #[arg(short = 'b', long)]
        batch_size: Option<usize>,

        /// Spectrum files or directories
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Validate a configuration file and list its stages
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            config,
            output,
            ignore_errors,
            batch_size,
            inputs,
        } => run(&config, output, ignore_errors, batch_size, &inputs),
        Commands::Check { config } => check(&config),
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_file(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}

fn run(
    config_path: &Path,
    output: Option<PathBuf>,
    ignore_errors: bool,
    batch_size: Option<usize>,
    inputs: &[PathBuf],
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if ignore_errors {
        config.batch.ignore_errors = true;
    }
    if let Some(size) = batch_size {
        config.batch.batch_size = size;
    }
    let output = output.or_else(|| config.output.clone());

    let sources = expand_inputs(inputs)?;
    if sources.is_empty() {
        bail!("no spectrum files found in the given inputs");
    }

    let pipeline = config.pipeline().context("Invalid pipeline")?;
    let mut runner = BatchRunner::new(pipeline, config.loader.clone(), config.batch.clone())?;
    let outcome = runner.run(sources.as_slice());

    // Export whatever completed, even when the batch aborted.
    if let Some(path) = output {
        let written = runner
            .export(&path)
            .with_context(|| format!("Failed to export results to {}", path.display()))?;
        info!("wrote {} rows to {}", runner.table().len(), written.display());
    }

    let report = outcome.context("Batch aborted")?;
    info!(
        "{} of {} files processed, {} skipped, checkpoint at {}",
        report.completed,
        report.processed,
        report.skipped.len(),
        runner.checkpoint_path().display()
    );
    Ok(())
}

fn check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = config.pipeline().context("Invalid pipeline")?;
    println!("{} stages:", pipeline.stages().len());
    for (i, stage) in pipeline.stages().iter().enumerate() {
        match stage {
            Stage::Sink(sink) => println!("  {}. sink {sink:?}", i + 1),
            _ => println!("  {}. {} {stage:?}", i + 1, stage.name()),
        }
    }
    Ok(())
}

/// Files are taken as given; directories contribute their files in name
/// order.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = std::fs::read_dir(input)
                .with_context(|| format!("Failed to list {}", input.display()))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.retain(|p| p.is_file());
            entries.sort();
            sources.extend(entries);
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}
