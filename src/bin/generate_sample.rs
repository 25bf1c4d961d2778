//! Writes synthetic reflection spectra in OptiSystem's text layout:
//! `wavelength;power`, descending wavelength, decimal commas and uppercase
//! exponents. Each spectrum has one Lorentzian dip at a known centre.
//!
//! Layout: `<out_dir>/spectra/*.txt` plus `<out_dir>/pipeline.toml`, so
//! `process-spectra run -c <out_dir>/pipeline.toml <out_dir>/spectra`
//! works out of the box.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(name = "generate-sample", about = "Generate synthetic FBG/LPG spectra")]
struct Args {
    /// Output directory
    #[arg(default_value = "sample_spectra")]
    out_dir: PathBuf,

    /// Number of spectra
    #[arg(short = 'n', long, default_value_t = 12)]
    count: usize,

    /// PRNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

const WL_START_M: f64 = 1.50e-6;
const WL_STOP_M: f64 = 1.60e-6;
const SAMPLES: usize = 4001;
const BASELINE_DBM: f64 = -10.0;
const DIP_DEPTH_DB: f64 = 25.0;
const DIP_HWHM_M: f64 = 0.8e-9;
const NOISE_SIGMA_DB: f64 = 0.05;

fn lorentzian_dip(wl: f64, center: f64) -> f64 {
    DIP_DEPTH_DB / (1.0 + ((wl - center) / DIP_HWHM_M).powi(2))
}

/// Seeded detector noise: SplitMix64 stream, Gaussian samples by the
/// Marsaglia polar method with the spare value cached.
struct DetectorNoise {
    counter: u64,
    spare: Option<f64>,
}

impl DetectorNoise {
    fn seeded(seed: u64) -> Self {
        Self {
            counter: seed,
            spare: None,
        }
    }

    fn next_bits(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.counter;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn uniform(&mut self) -> f64 {
        (self.next_bits() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Zero-mean sample with standard deviation `sigma_db`.
    fn sample(&mut self, sigma_db: f64) -> f64 {
        if let Some(z) = self.spare.take() {
            return z * sigma_db;
        }
        loop {
            let u = 2.0 * self.uniform() - 1.0;
            let v = 2.0 * self.uniform() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let factor = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * factor);
                return u * factor * sigma_db;
            }
        }
    }
}

/// `1.5e-6` → `1,5E-06`, the way OptiSystem writes numbers.
fn optisystem_number(v: f64) -> String {
    let formatted = format!("{v:.6E}");
    let (mantissa, exponent) = formatted.split_once('E').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}E{sign}{:02}", mantissa.replace('.', ","), exponent.abs())
}

const PIPELINE_TOML: &str = r#"output = "resonant_wavelengths.csv"

[batch]
output_dir = "output"
batch_size = 5
ignore_errors = true

[[stages]]
kind = "filter"
window_length = 21
polyorder = 3

[[stages]]
kind = "interpolate"
wl_step = 0.5e-11
wl_limits = [1.51e-6, 1.59e-6]

[[stages]]
kind = "detect_valley"
prominence = 5.0

[[stages]]
kind = "max_power"

[[stages]]
kind = "report"
"#;

fn main() -> Result<()> {
    let args = Args::parse();
    let mut noise = DetectorNoise::seeded(args.seed);
    let spectra_dir = args.out_dir.join("spectra");
    fs::create_dir_all(&spectra_dir)
        .with_context(|| format!("creating {}", spectra_dir.display()))?;

    let step = (WL_STOP_M - WL_START_M) / (SAMPLES - 1) as f64;
    // Descending, as the instrument exports it.
    let wavelengths: Vec<f64> = (0..SAMPLES).map(|i| WL_STOP_M - i as f64 * step).collect();

    for k in 0..args.count {
        let slot = 0.06e-6 / args.count.max(1) as f64;
        let center = 1.52e-6 + (k as f64 + noise.uniform()) * slot;
        let path = spectra_dir.join(format!("spectrum_{k:03}.txt"));
        let mut out = BufWriter::new(fs::File::create(&path)?);
        for &wl in &wavelengths {
            let power = BASELINE_DBM - lorentzian_dip(wl, center) + noise.sample(NOISE_SIGMA_DB);
            writeln!(out, "{};{}", optisystem_number(wl), optisystem_number(power))?;
        }
        out.flush()?;
        println!("{}: dip at {center:.6e} m", path.display());
    }

    let config_path = args.out_dir.join("pipeline.toml");
    fs::write(&config_path, PIPELINE_TOML)?;
    println!(
        "Wrote {} spectra ({SAMPLES} samples each) and {}",
        args.count,
        config_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optisystem_number_format() {
        assert_eq!(optisystem_number(1.5e-6), "1,500000E-06");
        assert_eq!(optisystem_number(-35.25), "-3,525000E+01");
    }

    #[test]
    fn test_noise_is_seeded_and_centred() {
        let mut a = DetectorNoise::seeded(7);
        let mut b = DetectorNoise::seeded(7);
        let xs: Vec<f64> = (0..10_000).map(|_| a.sample(1.0)).collect();
        let ys: Vec<f64> = (0..10_000).map(|_| b.sample(1.0)).collect();
        assert_eq!(xs, ys);

        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.1, "variance {var}");
        assert!((0..1000).all(|_| (0.0..1.0).contains(&a.uniform())));
    }
}
