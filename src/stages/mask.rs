use serde::Deserialize;

use crate::data::model::SpectrumRecord;

// ---------------------------------------------------------------------------
// Wavelength window
// ---------------------------------------------------------------------------

/// Keep only samples whose wavelength lies in an inclusive window.
/// The limits may be given in either order.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MaskConfig {
    pub wl_limits: (f64, f64),
}

impl MaskConfig {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { wl_limits: (lo, hi) }
    }

    /// Indices of samples passing the window, in record order.
    pub fn selected_indices(&self, record: &SpectrumRecord) -> Vec<usize> {
        let (a, b) = self.wl_limits;
        let (lo, hi) = (a.min(b), a.max(b));
        record
            .wavelength()
            .iter()
            .enumerate()
            .filter(|(_, wl)| (lo..=hi).contains(*wl))
            .map(|(i, _)| i)
            .collect()
    }

    /// Masked copy of `record`. An empty window yields an empty record.
    pub fn apply(&self, record: &SpectrumRecord) -> SpectrumRecord {
        let indices = self.selected_indices(record);
        let wavelength = indices.iter().map(|&i| record.wavelength()[i]).collect();
        let power = indices.iter().map(|&i| record.power()[i]).collect();
        record.with_samples(wavelength, power)
    }
}
