//! End-to-end batch runs over synthetic spectrum files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use process_spectra::batch::BatchState;
use process_spectra::stages::{FilterConfig, InterpolateConfig, ValleyConfig};
use process_spectra::{
    BatchOptions, BatchRunner, Error, LoaderOptions, MetadataValue, Pipeline, SpectrumRecord,
    SpectrumSink, Stage,
};
use tempfile::{tempdir, TempDir};

const CENTERS: [f64; 6] = [1540.0, 1544.0, 1548.0, 1552.0, 1556.0, 1560.0];

/// Write a 1530–1570 nm spectrum with one dip, alternating file layouts.
fn write_spectrum(dir: &Path, index: usize, center: f64) -> PathBuf {
    let mut lines: Vec<String> = (0..=400)
        .map(|i| {
            let wl = 1530.0 + i as f64 * 0.1;
            let power = -10.0 - 20.0 / (1.0 + ((wl - center) / 0.6).powi(2));
            if index % 2 == 0 {
                format!("{wl:.4};{power:.6}")
            } else {
                format!("{:.4};{:.6E}", wl, power).replace('.', ",")
            }
        })
        .collect();
    if index % 2 == 1 {
        lines.reverse();
    }
    let path = dir.join(format!("spectrum_{index:02}.txt"));
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn write_malformed(dir: &Path, index: usize) -> PathBuf {
    let path = dir.join(format!("spectrum_{index:02}.txt"));
    fs::write(&path, "1530,0;-10,0\n1530,1;not-a-number\n").unwrap();
    path
}

fn stages() -> Vec<Stage> {
    vec![
        Stage::Filter(FilterConfig::new(7, 2)),
        Stage::Interpolate(InterpolateConfig::new(0.05).with_limits(1535.0, 1565.0)),
        Stage::DetectValley(ValleyConfig::new(5.0)),
    ]
}

fn runner(
    out: &TempDir,
    batch_size: usize,
    ignore_errors: bool,
    stages: Vec<Stage>,
) -> BatchRunner {
    let options = BatchOptions {
        output_dir: out.path().join("output"),
        batch_size,
        ignore_errors,
        ..Default::default()
    };
    BatchRunner::new(Pipeline::new(stages).unwrap(), LoaderOptions::default(), options).unwrap()
}

fn checkpoint_rows(path: &Path) -> Option<usize> {
    let text = fs::read_to_string(path).ok()?;
    Some(text.lines().count() - 1)
}

fn resonant_wavelengths(runner: &BatchRunner) -> Vec<f64> {
    runner
        .table()
        .column("resonant_wl")
        .unwrap()
        .into_iter()
        .map(|v| v.as_f64().unwrap())
        .collect()
}

#[test]
fn test_six_dips_in_input_order() {
    let data = tempdir().unwrap();
    let sources: Vec<PathBuf> = CENTERS
        .iter()
        .enumerate()
        .map(|(i, &c)| write_spectrum(data.path(), i, c))
        .collect();

    let mut runner = runner(&data, 50, false, stages());
    let report = runner.run(&sources).unwrap();

    assert_eq!(report.completed, 6);
    assert!(report.skipped.is_empty());
    assert_eq!(runner.state(), BatchState::Finished);
    assert_eq!(runner.table().len(), 6);
    for (found, expected) in resonant_wavelengths(&runner).iter().zip(CENTERS) {
        assert!((found - expected).abs() <= 0.1, "{found} vs {expected}");
    }
    let names: Vec<String> = runner
        .table()
        .column("name")
        .unwrap()
        .into_iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(names[0], "spectrum_00");
    assert_eq!(names[5], "spectrum_05");
    assert_eq!(checkpoint_rows(&runner.checkpoint_path()), Some(6));
}

#[test]
fn test_malformed_source_aborts_batch() {
    let data = tempdir().unwrap();
    let sources: Vec<PathBuf> = CENTERS
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if i == 3 {
                write_malformed(data.path(), i)
            } else {
                write_spectrum(data.path(), i, c)
            }
        })
        .collect();

    let mut runner = runner(&data, 50, false, stages());
    let err = runner.run(&sources).unwrap_err();

    match err {
        Error::BatchAborted { source_path, cause } => {
            assert_eq!(source_path, sources[3]);
            assert!(matches!(*cause, Error::Load { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(runner.state(), BatchState::Aborted);
    assert_eq!(runner.table().len(), 3);
    assert_eq!(checkpoint_rows(&runner.checkpoint_path()), Some(3));

    // Resuming with the unprocessed sources keeps appending in order.
    let report = runner.run(&sources[4..]).unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(runner.table().len(), 5);
}

#[test]
fn test_malformed_source_skipped_when_ignoring_errors() {
    let data = tempdir().unwrap();
    let sources: Vec<PathBuf> = CENTERS
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if i == 3 {
                write_malformed(data.path(), i)
            } else {
                write_spectrum(data.path(), i, c)
            }
        })
        .collect();

    let mut runner = runner(&data, 50, true, stages());
    let report = runner.run(&sources).unwrap();

    assert_eq!(report.processed, 6);
    assert_eq!(report.completed, 5);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].source, sources[3]);
    assert_eq!(runner.table().len(), 5);

    let expected: Vec<f64> = CENTERS
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 3)
        .map(|(_, &c)| c)
        .collect();
    for (found, expected) in resonant_wavelengths(&runner).iter().zip(expected) {
        assert!((found - expected).abs() <= 0.1);
    }
}

#[test]
fn test_recoverable_valley_failure_is_skipped() {
    let data = tempdir().unwrap();
    let good = write_spectrum(data.path(), 0, 1550.0);
    let flat = data.path().join("flat.txt");
    let body: Vec<String> = (0..=400)
        .map(|i| format!("{:.1};-10", 1530.0 + i as f64 * 0.1))
        .collect();
    fs::write(&flat, body.join("\n")).unwrap();

    let valley = ValleyConfig {
        prominence: 5.0,
        ignore_errors: true,
    };
    let mut runner = runner(&data, 50, false, vec![Stage::DetectValley(valley)]);
    let report = runner.run(&[flat, good]).unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped.len(), 1);
}

/// Records how many rows the checkpoint file held as each record went by.
#[derive(Debug)]
struct CheckpointProbe {
    path: PathBuf,
    seen: Mutex<Vec<Option<usize>>>,
}

impl SpectrumSink for CheckpointProbe {
    fn consume(&self, _record: &SpectrumRecord) -> process_spectra::Result<()> {
        self.seen.lock().unwrap().push(checkpoint_rows(&self.path));
        Ok(())
    }
}

#[test]
fn test_checkpoint_cadence() {
    let data = tempdir().unwrap();
    let sources: Vec<PathBuf> = CENTERS[..5]
        .iter()
        .enumerate()
        .map(|(i, &c)| write_spectrum(data.path(), i, c))
        .collect();

    let probe = Arc::new(CheckpointProbe {
        path: data.path().join("output").join("checkpoint.csv"),
        seen: Mutex::new(Vec::new()),
    });
    let mut stages = stages();
    stages.push(Stage::Sink(probe.clone()));

    let mut runner = runner(&data, 2, false, stages);
    let report = runner.run(&sources).unwrap();

    // The 3rd record sees the checkpoint written after the 2nd, the 5th
    // sees the one written after the 4th.
    assert_eq!(
        *probe.seen.lock().unwrap(),
        vec![None, None, Some(2), Some(2), Some(4)]
    );
    assert_eq!(report.checkpoints, 3);
    assert_eq!(checkpoint_rows(&runner.checkpoint_path()), Some(5));
}

#[test]
fn test_extra_columns_and_export() {
    let data = tempdir().unwrap();
    let source = write_spectrum(data.path(), 0, 1550.0);

    let mut stages = stages();
    stages.insert(
        0,
        Stage::Annotate([("temperature".to_string(), MetadataValue::Integer(25))].into()),
    );
    stages.push(Stage::MaxPower);
    let options = BatchOptions {
        output_dir: data.path().join("output"),
        extra_columns: vec!["temperature".to_string(), "max_power".to_string()],
        ..Default::default()
    };
    let pipeline = Pipeline::new(stages).unwrap();
    let mut runner = BatchRunner::new(pipeline, LoaderOptions::default(), options).unwrap();
    runner.run(&[source]).unwrap();

    let written = runner.export(&data.path().join("final")).unwrap();
    let text = fs::read_to_string(&written).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("name,resonant_wl,resonant_wl_power,temperature,max_power")
    );
    let row: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(row[0], "spectrum_00");
    assert_eq!(row[3], "25");
    assert!(row[4].parse::<f64>().unwrap() > -10.5);

    assert!(matches!(
        runner.export(&data.path().join("final.ods")),
        Err(Error::ExportFormat { .. })
    ));
}
