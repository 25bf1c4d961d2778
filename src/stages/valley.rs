use log::warn;
use serde::Deserialize;

use crate::data::model::{SpectrumRecord, RESONANT_WL, RESONANT_WL_POWER};
use crate::error::{Error, Result};

/// Resonant valley detection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ValleyConfig {
    /// Minimum prominence (in power units) a valley must have.
    #[serde(default = "default_prominence")]
    pub prominence: f64,
    /// Let the batch runner skip a record without a valley even when the
    /// batch aborts on other failures.
    #[serde(default)]
    pub ignore_errors: bool,
}

fn default_prominence() -> f64 {
    5.0
}

impl Default for ValleyConfig {
    fn default() -> Self {
        Self {
            prominence: default_prominence(),
            ignore_errors: false,
        }
    }
}

impl ValleyConfig {
    pub fn new(prominence: f64) -> Self {
        Self {
            prominence,
            ..Default::default()
        }
    }

    pub fn check(&self) -> Result<()> {
        if !(self.prominence.is_finite() && self.prominence >= 0.0) {
            return Err(Error::InvalidStageConfig {
                stage: "detect_valley",
                message: format!("prominence must be finite and >= 0, got {}", self.prominence),
            });
        }
        Ok(())
    }

    /// Locate the most prominent valley, store it in the record's metadata
    /// and return `(wavelength, power)`.
    ///
    /// Among equally prominent valleys the one at the shortest wavelength
    /// wins.
    pub fn apply(&self, record: &mut SpectrumRecord) -> Result<(f64, f64)> {
        self.check()?;
        let inverted: Vec<f64> = record.power().iter().map(|p| -p).collect();
        let peaks = find_peaks(&inverted, self.prominence);

        let Some(first) = peaks.first() else {
            return Err(Error::NoValleyFound {
                name: record.name.clone(),
                prominence: self.prominence,
                recoverable: self.ignore_errors,
            });
        };
        if peaks.len() > 1 {
            warn!(
                "found {} valleys for '{}', keeping the most prominent",
                peaks.len(),
                record.name
            );
        }

        let best = peaks
            .iter()
            .fold(first, |best, p| if p.prominence > best.prominence { p } else { best });
        let wl = record.wavelength()[best.index];
        let power = record.power()[best.index];
        record.set_additional_info([(RESONANT_WL, wl), (RESONANT_WL_POWER, power)]);
        Ok((wl, power))
    }
}

// ---------------------------------------------------------------------------
// Peak finding
// ---------------------------------------------------------------------------

/// A local maximum and how far it stands out from its surroundings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub prominence: f64,
}

/// Local maxima of `x` whose prominence is at least `min_prominence`, in
/// ascending index order.
///
/// Flat-topped maxima report the middle of the plateau (rounding down).
/// Endpoints are never peaks.
pub fn find_peaks(x: &[f64], min_prominence: f64) -> Vec<Peak> {
    local_maxima(x)
        .into_iter()
        .map(|index| Peak {
            index,
            prominence: prominence(x, index),
        })
        .filter(|p| p.prominence >= min_prominence)
        .collect()
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Height of `x[peak]` above the higher of the two lowest points reachable
/// on either side before meeting a higher sample.
fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];

    let mut left_min = height;
    for &v in x[..=peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = height;
    for &v in &x[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Baseline -10 dBm with Lorentzian dips of `(center, depth)`.
    fn dips(centers: &[(f64, f64)]) -> SpectrumRecord {
        let wl: Vec<f64> = (0..=400).map(|i| 1530.0 + i as f64 * 0.1).collect();
        let power = wl
            .iter()
            .map(|&x| {
                -10.0
                    - centers
                        .iter()
                        .map(|&(c, depth)| depth / (1.0 + ((x - c) / 0.4).powi(2)))
                        .sum::<f64>()
            })
            .collect();
        SpectrumRecord::new("dips", wl, power).unwrap()
    }

    #[test]
    fn test_single_dip() {
        let mut rec = dips(&[(1550.0, 20.0)]);
        let (wl, power) = ValleyConfig::new(5.0).apply(&mut rec).unwrap();
        assert!((wl - 1550.0).abs() <= 0.1);
        assert!((power + 30.0).abs() < 1e-6);
        assert_eq!(rec.valley(), Some((wl, power)));
    }

    #[test]
    fn test_most_prominent_dip_wins() {
        let mut rec = dips(&[(1540.0, 8.0), (1555.0, 25.0), (1560.0, 12.0)]);
        let (wl, _) = ValleyConfig::new(5.0).apply(&mut rec).unwrap();
        assert!((wl - 1555.0).abs() <= 0.1);
    }

    #[test]
    fn test_equal_prominence_takes_shortest_wavelength() {
        let power = vec![0.0, -5.0, 0.0, -5.0, 0.0];
        let wl = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut rec = SpectrumRecord::new("tie", wl, power).unwrap();
        let (wl, _) = ValleyConfig::new(1.0).apply(&mut rec).unwrap();
        assert_eq!(wl, 2.0);
    }

    #[test]
    fn test_flat_signal_has_no_valley() {
        let wl: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let mut rec = SpectrumRecord::new("flat", wl, vec![-10.0; 50]).unwrap();
        let err = ValleyConfig::new(5.0).apply(&mut rec).unwrap_err();
        assert!(matches!(err, Error::NoValleyFound { recoverable: false, .. }));
        assert!(rec.valley().is_none());
    }

    #[test]
    fn test_shallow_dip_below_threshold() {
        let mut rec = dips(&[(1550.0, 3.0)]);
        let config = ValleyConfig {
            prominence: 5.0,
            ignore_errors: true,
        };
        let err = config.apply(&mut rec).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_plateau_reports_middle() {
        let x = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        let peaks = find_peaks(&x, 0.0);
        assert_eq!(peaks, vec![Peak { index: 3, prominence: 3.0 }]);
    }

    #[test]
    fn test_prominence_uses_higher_base() {
        let x = [0.0, 5.0, 2.0, 8.0, 1.0];
        let peaks = find_peaks(&x, 0.0);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0], Peak { index: 1, prominence: 3.0 });
        assert_eq!(peaks[1], Peak { index: 3, prominence: 7.0 });
    }
}
