use serde::Deserialize;

use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Savitzky–Golay smoothing of the power channel
// ---------------------------------------------------------------------------

/// Parameters of the local-polynomial smoothing filter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FilterConfig {
    /// Number of samples in each fit window; odd and positive.
    pub window_length: usize,
    /// Degree of the fitted polynomial; below `window_length`.
    pub polyorder: usize,
}

impl FilterConfig {
    pub fn new(window_length: usize, polyorder: usize) -> Self {
        Self {
            window_length,
            polyorder,
        }
    }

    /// Check the parameters, against `samples` when a record is known.
    pub fn check(&self, name: &str, samples: Option<usize>) -> Result<()> {
        let fail = |message: String| {
            Err(Error::FilterConfig {
                name: name.to_string(),
                message,
            })
        };
        if self.window_length == 0 || self.window_length % 2 == 0 {
            return fail(format!(
                "window_length must be a positive odd number, got {}",
                self.window_length
            ));
        }
        if self.polyorder >= self.window_length {
            return fail(format!(
                "polyorder {} must be less than window_length {}",
                self.polyorder, self.window_length
            ));
        }
        if let Some(n) = samples {
            if self.window_length > n {
                return fail(format!(
                    "window_length {} exceeds the {n} available samples",
                    self.window_length
                ));
            }
        }
        Ok(())
    }

    /// Smooth the power channel. Wavelengths are shared with the input and
    /// the sample count is unchanged.
    pub fn apply(&self, record: &SpectrumRecord) -> Result<SpectrumRecord> {
        self.check(&record.name, Some(record.len()))?;
        let smoothed = savgol_filter(record.power(), self.window_length, self.polyorder);
        Ok(record.with_power(smoothed))
    }
}

/// Savitzky–Golay filter. Edges are handled by evaluating the polynomial
/// fitted to the first (last) full window, as `scipy.signal.savgol_filter`
/// does in `interp` mode. Requires an odd `window <= y.len()` and
/// `polyorder < window`.
pub fn savgol_filter(y: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
    let n = y.len();
    let half = window / 2;
    let mut out = vec![0.0; n];

    let center = savgol_weights(half, polyorder, 0.0);
    for i in half..n - half {
        out[i] = dot(&center, &y[i - half..i + half + 1]);
    }

    let head = &y[..window];
    let tail = &y[n - window..];
    for i in 0..half {
        let lead = savgol_weights(half, polyorder, i as f64 - half as f64);
        out[i] = dot(&lead, head);
        let trail = savgol_weights(half, polyorder, (i + 1) as f64);
        out[n - half + i] = dot(&trail, tail);
    }
    out
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Least-squares weights that evaluate, at offset `t` from the window
/// centre, the degree-`polyorder` polynomial fitted to `2 * half + 1`
/// equally spaced samples.
fn savgol_weights(half: usize, polyorder: usize, t: f64) -> Vec<f64> {
    let order = polyorder + 1;
    // Offsets are scaled to [-1, 1] to keep the normal equations well
    // conditioned; the fitted polynomial is the same.
    let scale = half.max(1) as f64;
    let xs: Vec<f64> = (0..=2 * half)
        .map(|j| (j as f64 - half as f64) / scale)
        .collect();

    let mut gram = vec![vec![0.0; order]; order];
    for (k, row) in gram.iter_mut().enumerate() {
        for (l, cell) in row.iter_mut().enumerate() {
            *cell = xs.iter().map(|x| x.powi((k + l) as i32)).sum();
        }
    }
    let target: Vec<f64> = (0..order).map(|k| (t / scale).powi(k as i32)).collect();
    let coeffs = solve(gram, target);

    xs.iter()
        .map(|x| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * x.powi(k as i32))
                .sum()
        })
        .collect()
}

/// Gaussian elimination with partial pivoting on a small dense system.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}
