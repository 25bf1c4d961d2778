use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata key holding the resonant (valley) wavelength.
pub const RESONANT_WL: &str = "resonant_wl";
/// Metadata key holding the power at the resonant wavelength.
pub const RESONANT_WL_POWER: &str = "resonant_wl_power";
/// Metadata key holding the global maximum power.
pub const MAX_POWER: &str = "max_power";
/// Metadata key holding the wavelength of the global maximum power.
pub const MAX_POWER_WL: &str = "max_power_wl";

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a result row
// ---------------------------------------------------------------------------

/// A dynamically-typed scalar attached to a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            // Shortest text that parses back to the same value.
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => Ok(()),
        }
    }
}

impl MetadataValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

// ---------------------------------------------------------------------------
// SpectrumRecord – one reflection spectrum and what we learned about it
// ---------------------------------------------------------------------------

/// A single spectrum: wavelength/power samples plus accumulated metadata.
///
/// Samples are kept in two parallel channels ordered by ascending
/// wavelength. The wavelength channel is shared between records derived
/// from each other when a stage leaves it untouched.
#[derive(Debug, Clone)]
pub struct SpectrumRecord {
    /// Identifier, usually the source file stem.
    pub name: String,
    wavelength: Arc<[f64]>,
    power: Vec<f64>,
    /// Per-record scalars: valley position, measurands, ...
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl SpectrumRecord {
    /// Build a record, reversing the channels if they arrive in descending
    /// wavelength order.
    pub fn new(
        name: impl Into<String>,
        mut wavelength: Vec<f64>,
        mut power: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if wavelength.len() != power.len() {
            return Err(Error::ChannelMismatch {
                name,
                wavelength: wavelength.len(),
                power: power.len(),
            });
        }
        if let (Some(first), Some(last)) = (wavelength.first(), wavelength.last()) {
            if first > last {
                wavelength.reverse();
                power.reverse();
            }
        }
        Ok(Self {
            name,
            wavelength: wavelength.into(),
            power,
            metadata: BTreeMap::new(),
        })
    }

    /// Override the derived name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Wavelength channel, ascending.
    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    /// Power channel, aligned with [`wavelength`](Self::wavelength).
    pub fn power(&self) -> &[f64] {
        &self.power
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.power.len()
    }

    /// Whether the record holds no samples.
    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// `(first, last)` wavelength, if any samples exist.
    pub fn domain(&self) -> Option<(f64, f64)> {
        Some((*self.wavelength.first()?, *self.wavelength.last()?))
    }

    /// Iterate `(wavelength, power)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelength.iter().copied().zip(self.power.iter().copied())
    }

    /// Resonant valley recorded by the valley stage, if any.
    pub fn valley(&self) -> Option<(f64, f64)> {
        let wl = self.metadata.get(RESONANT_WL)?.as_f64()?;
        let power = self.metadata.get(RESONANT_WL_POWER)?.as_f64()?;
        Some((wl, power))
    }

    /// Merge fields into the metadata, overwriting existing keys.
    pub fn set_additional_info<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        for (key, value) in fields {
            self.metadata.insert(key.into(), value.into());
        }
    }

    /// New record with a replaced power channel, sharing this wavelength
    /// channel. Caller guarantees equal length.
    pub(crate) fn with_power(&self, power: Vec<f64>) -> Self {
        debug_assert_eq!(power.len(), self.wavelength.len());
        Self {
            name: self.name.clone(),
            wavelength: Arc::clone(&self.wavelength),
            power,
            metadata: self.metadata.clone(),
        }
    }

    /// New record over a different (already ascending) sample set, keeping
    /// name and metadata. Caller guarantees equal length.
    pub(crate) fn with_samples(&self, wavelength: Vec<f64>, power: Vec<f64>) -> Self {
        debug_assert_eq!(power.len(), wavelength.len());
        Self {
            name: self.name.clone(),
            wavelength: wavelength.into(),
            power,
            metadata: self.metadata.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn shares_wavelength_with(&self, other: &SpectrumRecord) -> bool {
        Arc::ptr_eq(&self.wavelength, &other.wavelength)
    }
}
