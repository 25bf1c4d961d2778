use std::path::Path;

use log::debug;
use serde::Deserialize;

use super::model::SpectrumRecord;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How to read a two-column spectrum text file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Column separator, `;` for OptiSystem exports.
    pub delimiter: char,
    /// Factor applied to every wavelength, e.g. `1e-9` to turn nanometres
    /// into metres.
    pub wl_multiplier: f64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            delimiter: ';',
            wl_multiplier: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a spectrum from a delimited `wavelength<sep>power` text file.
///
/// Both columns tolerate decimal commas (`1,55`) and uppercase exponents
/// (`1.55E-06`). The record is named after the file stem and its samples
/// come out strictly ascending in wavelength: a descending file is
/// reversed, repeated or shuffled wavelengths are rejected.
pub fn load_spectrum(path: &Path, options: &LoaderOptions) -> Result<SpectrumRecord> {
    let load_err = |message: String| Error::Load {
        path: path.to_path_buf(),
        message,
    };

    let delimiter = u8::try_from(options.delimiter)
        .map_err(|_| load_err(format!("delimiter '{}' is not ASCII", options.delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| load_err(e.to_string()))?;

    let mut wavelength = Vec::new();
    let mut power = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(|e| load_err(format!("row {row_no}: {e}")))?;
        if record.len() != 2 {
            return Err(load_err(format!(
                "row {row_no}: expected 2 columns, found {}",
                record.len()
            )));
        }
        let wl = parse_number(&record[0])
            .ok_or_else(|| load_err(format!("row {row_no}: '{}' is not a number", &record[0])))?;
        let p = parse_number(&record[1])
            .ok_or_else(|| load_err(format!("row {row_no}: '{}' is not a number", &record[1])))?;
        wavelength.push(wl * options.wl_multiplier);
        power.push(p);
    }

    if wavelength.is_empty() {
        return Err(load_err("file contains no samples".to_string()));
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let record = SpectrumRecord::new(name, wavelength, power)?;

    if let Some(w) = record.wavelength().windows(2).find(|w| w[0] >= w[1]) {
        let message = if w[0] == w[1] {
            format!("wavelength {:e} appears twice in a row", w[0])
        } else {
            "wavelengths are neither ascending nor descending".to_string()
        };
        return Err(load_err(message));
    }

    debug!("loaded {} ({} samples)", record.name, record.len());
    Ok(record)
}

/// Parse a number after normalising decimal commas and uppercase exponents.
fn parse_number(text: &str) -> Option<f64> {
    let normalized = text.replace(',', ".").replace('E', "e");
    normalized.parse::<f64>().ok()
}
