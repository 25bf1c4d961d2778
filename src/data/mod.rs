/// Data layer: spectrum records and how they are read from disk.
///
/// Architecture:
/// ```text
///  wavelength;power .txt
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  normalise + parse → SpectrumRecord (ascending)
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ SpectrumRecord  │  wavelength/power channels, metadata
///   └────────────────┘
/// ```

pub mod loader;
pub mod model;
