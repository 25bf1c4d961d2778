use serde::Deserialize;

use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};

/// Interpolant used to resample a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    Linear,
    Nearest,
    Previous,
    Next,
    /// Natural cubic spline.
    #[default]
    Cubic,
}

impl InterpolationKind {
    fn min_samples(self) -> usize {
        match self {
            InterpolationKind::Cubic => 4,
            _ => 2,
        }
    }
}

/// Resample onto `wl_limits.0, wl_limits.0 + wl_step, ...` up to (not
/// including) `wl_limits.1`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct InterpolateConfig {
    pub wl_step: f64,
    /// Defaults to the record's own first and last wavelength.
    #[serde(default)]
    pub wl_limits: Option<(f64, f64)>,
    #[serde(default)]
    pub method: InterpolationKind,
}

impl InterpolateConfig {
    pub fn new(wl_step: f64) -> Self {
        Self {
            wl_step,
            wl_limits: None,
            method: InterpolationKind::default(),
        }
    }

    pub fn with_limits(mut self, lo: f64, hi: f64) -> Self {
        self.wl_limits = Some((lo, hi));
        self
    }

    pub fn with_method(mut self, method: InterpolationKind) -> Self {
        self.method = method;
        self
    }

    pub fn check(&self) -> Result<()> {
        let invalid = |message: String| {
            Err(Error::InvalidStageConfig {
                stage: "interpolate",
                message,
            })
        };
        if !(self.wl_step.is_finite() && self.wl_step > 0.0) {
            return invalid(format!("wl_step must be positive, got {}", self.wl_step));
        }
        if let Some((lo, hi)) = self.wl_limits {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return invalid(format!("wl_limits ({lo}, {hi}) are not an ascending range"));
            }
        }
        Ok(())
    }

    pub fn apply(&self, record: &SpectrumRecord) -> Result<SpectrumRecord> {
        self.check()?;
        let needed = self.method.min_samples();
        let (first, last) = match record.domain() {
            Some(domain) if record.len() >= needed => domain,
            _ => {
                return Err(Error::InsufficientSamples {
                    stage: "interpolate",
                    name: record.name.clone(),
                    needed,
                    got: record.len(),
                })
            }
        };
        if let Some(w) = record.wavelength().windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::UnorderedWavelength {
                name: record.name.clone(),
                wavelength: w[1],
            });
        }

        let (lo, hi) = self.wl_limits.unwrap_or((first, last));
        let count = grid_len(lo, hi, self.wl_step);
        if count > 0.0 {
            // The grid is monotonic, so its end points bound every sample.
            let end = lo + (count - 1.0) * self.wl_step;
            if let Some(point) = [lo, end].into_iter().find(|&x| x < first || x > last) {
                return Err(Error::InterpolationDomain {
                    name: record.name.clone(),
                    point,
                    lo: first,
                    hi: last,
                });
            }
        }
        let max_points = (record.len() * MAX_UPSAMPLING).max(MIN_GRID_CAPACITY);
        if count > max_points as f64 {
            return Err(Error::InvalidStageConfig {
                stage: "interpolate",
                message: format!(
                    "wl_step {:e} asks for {count:e} points from {} samples of '{}'",
                    self.wl_step,
                    record.len(),
                    record.name
                ),
            });
        }

        let grid = uniform_grid(lo, self.wl_step, count as usize);
        let interpolant = Interpolant::new(record.wavelength(), record.power(), self.method);
        let power = grid.iter().map(|&x| interpolant.eval(x)).collect();
        Ok(record.with_samples(grid, power))
    }
}

/// Upper bound on grid points per input sample.
const MAX_UPSAMPLING: usize = 1024;
/// Grids up to this size are always allowed, however short the record.
const MIN_GRID_CAPACITY: usize = 1 << 20;

/// Number of points in `lo, lo + step, ...` strictly below `hi`, as a float
/// so absurd requests can be rejected before allocating.
fn grid_len(lo: f64, hi: f64, step: f64) -> f64 {
    ((hi - lo) / step).ceil().max(0.0)
}

fn uniform_grid(lo: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| lo + i as f64 * step).collect()
}

// ---------------------------------------------------------------------------
// Interpolant over strictly ascending knots
// ---------------------------------------------------------------------------

struct Interpolant<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    kind: InterpolationKind,
    /// Spline second derivatives, in units of the normalised abscissa.
    curvature: Vec<f64>,
    origin: f64,
    scale: f64,
}

impl<'a> Interpolant<'a> {
    fn new(xs: &'a [f64], ys: &'a [f64], kind: InterpolationKind) -> Self {
        let n = xs.len();
        let origin = xs[0];
        // Knot spacing in metres is ~1e-12; work in units of the mean step.
        let scale = (xs[n - 1] - origin) / (n - 1) as f64;
        let mut interp = Self {
            xs,
            ys,
            kind,
            curvature: Vec::new(),
            origin,
            scale,
        };
        if kind == InterpolationKind::Cubic {
            interp.curvature = interp.natural_spline();
        }
        interp
    }

    fn u(&self, x: f64) -> f64 {
        (x - self.origin) / self.scale
    }

    /// Second derivatives of the natural cubic spline (Thomas algorithm).
    fn natural_spline(&self) -> Vec<f64> {
        let n = self.xs.len();
        let h: Vec<f64> = self
            .xs
            .windows(2)
            .map(|w| self.u(w[1]) - self.u(w[0]))
            .collect();
        let slope: Vec<f64> = (0..n - 1)
            .map(|i| (self.ys[i + 1] - self.ys[i]) / h[i])
            .collect();

        let m = n - 2;
        let mut diag = vec![0.0; m];
        let mut rhs = vec![0.0; m];
        for k in 0..m {
            diag[k] = 2.0 * (h[k] + h[k + 1]);
            rhs[k] = 6.0 * (slope[k + 1] - slope[k]);
        }
        for k in 1..m {
            let factor = h[k] / diag[k - 1];
            diag[k] -= factor * h[k];
            rhs[k] -= factor * rhs[k - 1];
        }
        let mut curvature = vec![0.0; n];
        for k in (0..m).rev() {
            let upper = if k + 1 < m { h[k + 1] * curvature[k + 2] } else { 0.0 };
            curvature[k + 1] = (rhs[k] - upper) / diag[k];
        }
        curvature
    }

    fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let k = self
            .xs
            .partition_point(|&v| v <= x)
            .saturating_sub(1)
            .min(n - 2);
        let (x0, x1) = (self.xs[k], self.xs[k + 1]);
        let (y0, y1) = (self.ys[k], self.ys[k + 1]);

        match self.kind {
            InterpolationKind::Linear => y0 + (y1 - y0) * (x - x0) / (x1 - x0),
            InterpolationKind::Nearest => {
                if x - x0 <= x1 - x {
                    y0
                } else {
                    y1
                }
            }
            InterpolationKind::Previous => {
                if x >= x1 {
                    y1
                } else {
                    y0
                }
            }
            InterpolationKind::Next => {
                if x <= x0 {
                    y0
                } else {
                    y1
                }
            }
            InterpolationKind::Cubic => {
                let h = self.u(x1) - self.u(x0);
                let d = self.u(x) - self.u(x0);
                let (m0, m1) = (self.curvature[k], self.curvature[k + 1]);
                let b = (y1 - y0) / h - h * (2.0 * m0 + m1) / 6.0;
                y0 + b * d + m0 / 2.0 * d * d + (m1 - m0) / (6.0 * h) * d * d * d
            }
        }
    }
}
