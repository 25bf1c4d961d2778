use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ArrowWriter;

use crate::data::model::{MetadataValue, SpectrumRecord, RESONANT_WL, RESONANT_WL_POWER};
use crate::error::{Error, Result};

/// Column holding the record name; the only column a row must fill.
pub const NAME_COLUMN: &str = "name";

// ---------------------------------------------------------------------------
// Export format
// ---------------------------------------------------------------------------

/// Output format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    Parquet,
}

impl ExportFormat {
    pub const DEFAULT_EXTENSION: &'static str = "csv";

    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            "json" => Ok(ExportFormat::Json),
            "parquet" | "pq" => Ok(ExportFormat::Parquet),
            _ => Err(Error::ExportFormat {
                extension: extension.to_string(),
            }),
        }
    }

    /// Resolve the destination format. A bare stem gets `.csv` appended.
    pub fn resolve(path: &Path) -> Result<(PathBuf, Self)> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Ok((path.to_path_buf(), Self::from_extension(ext)?)),
            None => Ok((
                path.with_extension(Self::DEFAULT_EXTENSION),
                ExportFormat::Csv,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultTable
// ---------------------------------------------------------------------------

/// Append-only table of per-record results with a fixed column set:
/// `name, resonant_wl, resonant_wl_power` followed by any extra columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<MetadataValue>>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ResultTable {
    pub fn new<I, S>(extra_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns: Vec<String> = [NAME_COLUMN, RESONANT_WL, RESONANT_WL_POWER]
            .iter()
            .map(|c| c.to_string())
            .collect();
        for column in extra_columns {
            let column = column.into();
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<MetadataValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&MetadataValue>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Append a metadata snapshot. Columns it lacks are left null; keys
    /// outside the column set are dropped.
    pub fn append(&mut self, snapshot: &BTreeMap<String, MetadataValue>) -> Result<()> {
        match snapshot.get(NAME_COLUMN) {
            Some(v) if !v.is_null() => {}
            _ => return Err(Error::Schema(NAME_COLUMN.to_string())),
        }
        let dropped: Vec<&String> = snapshot
            .keys()
            .filter(|k| !self.columns.contains(*k))
            .collect();
        if !dropped.is_empty() {
            debug!("not exporting metadata keys {dropped:?}");
        }
        let row = self
            .columns
            .iter()
            .map(|c| snapshot.get(c).cloned().unwrap_or(MetadataValue::Null))
            .collect();
        self.rows.push(row);
        Ok(())
    }

    /// Append the record's name and metadata as a row.
    pub fn append_record(&mut self, record: &SpectrumRecord) -> Result<()> {
        let mut snapshot = record.metadata.clone();
        snapshot.insert(
            NAME_COLUMN.to_string(),
            MetadataValue::String(record.name.clone()),
        );
        self.append(&snapshot)
    }

    /// Write the table to `path`, picking the format from its extension.
    /// Returns the path actually written.
    pub fn export(&self, path: &Path) -> Result<PathBuf> {
        let (path, format) = ExportFormat::resolve(path)?;
        self.write(&path, format)?;
        Ok(path)
    }

    /// Write the table to `path` in `format`, ignoring the extension.
    pub fn write(&self, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Csv => self.write_delimited(path, b','),
            ExportFormat::Tsv => self.write_delimited(path, b'\t'),
            ExportFormat::Json => self.write_json(path),
            ExportFormat::Parquet => self.write_parquet(path),
        }
    }

    fn write_delimited(&self, path: &Path, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        let objects: Vec<BTreeMap<&str, &MetadataValue>> = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter())
                    .collect()
            })
            .collect();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &objects)?;
        writer.flush()?;
        Ok(())
    }

    fn write_parquet(&self, path: &Path) -> Result<()> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (idx, name) in self.columns.iter().enumerate() {
            let cells: Vec<&MetadataValue> = self.rows.iter().map(|row| &row[idx]).collect();
            let (data_type, array) = column_array(&cells);
            fields.push(Field::new(name, data_type, true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

/// Narrowest Arrow type holding every non-null cell: integers, floats
/// (integers widened), booleans, otherwise text.
fn column_array(cells: &[&MetadataValue]) -> (DataType, ArrayRef) {
    let present = || cells.iter().filter(|v| !v.is_null());

    if present().all(|v| matches!(v, MetadataValue::Integer(_))) && present().next().is_some() {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        return (DataType::Int64, Arc::new(Int64Array::from(values)));
    }
    if present().all(|v| v.as_f64().is_some()) {
        let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
        return (DataType::Float64, Arc::new(Float64Array::from(values)));
    }
    if present().all(|v| matches!(v, MetadataValue::Bool(_))) {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return (DataType::Boolean, Arc::new(BooleanArray::from(values)));
    }
    let values: Vec<Option<String>> = cells
        .iter()
        .map(|v| (!v.is_null()).then(|| v.to_string()))
        .collect();
    (DataType::Utf8, Arc::new(StringArray::from(values)))
}
