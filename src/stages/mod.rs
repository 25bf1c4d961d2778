//! Spectrum transformations applied by the pipeline.
//!
//! Record-producing stages (`smooth`, `interpolate`, `mask`) return a new
//! [`SpectrumRecord`](crate::data::model::SpectrumRecord); measuring stages
//! (`valley`, `power`) write their findings into the record's metadata.

pub mod interpolate;
pub mod mask;
pub mod power;
pub mod smooth;
pub mod valley;

pub use interpolate::{InterpolateConfig, InterpolationKind};
pub use mask::MaskConfig;
pub use smooth::FilterConfig;
pub use valley::ValleyConfig;
