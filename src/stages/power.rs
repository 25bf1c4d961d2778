use crate::data::model::{SpectrumRecord, MAX_POWER, MAX_POWER_WL};
use crate::error::{Error, Result};

/// Record the highest power sample (first one on ties) and its wavelength
/// in the metadata. Useful context next to the valley depth.
pub fn record_max_power(record: &mut SpectrumRecord) -> Result<(f64, f64)> {
    let Some((wl, power)) = record
        .samples()
        .reduce(|best, s| if s.1 > best.1 { s } else { best })
    else {
        return Err(Error::InsufficientSamples {
            stage: "max_power",
            name: record.name.clone(),
            needed: 1,
            got: 0,
        });
    };
    record.set_additional_info([(MAX_POWER, power), (MAX_POWER_WL, wl)]);
    Ok((wl, power))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_maximum_is_recorded() {
        let wl = vec![1.0, 2.0, 3.0, 4.0];
        let mut rec = SpectrumRecord::new("p", wl, vec![-5.0, -1.0, -3.0, -1.0]).unwrap();
        assert_eq!(record_max_power(&mut rec).unwrap(), (2.0, -1.0));
        assert_eq!(rec.metadata[MAX_POWER].as_f64(), Some(-1.0));
        assert_eq!(rec.metadata[MAX_POWER_WL].as_f64(), Some(2.0));
    }

    #[test]
    fn test_empty_record_fails() {
        let mut rec = SpectrumRecord::new("p", vec![], vec![]).unwrap();
        assert!(record_max_power(&mut rec).is_err());
    }
}
