//! Exposure metadata read from the EXIF block of a RAW container.
//!
//! rawloader decodes the mosaic and levels but not the capture settings, so
//! exposure bias, ISO and exposure time are taken from EXIF here.

use std::io::Cursor;

use exif::{Exif, In, Reader, Tag, Value};
use tracing::debug;

/// Capture settings that drive bracketed merging and hot-pixel sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureInfo {
    /// Exposure bias in hundredths of an EV.
    pub exposure_bias: i32,
    /// ISO multiplied by exposure time in seconds; 0 when either is missing.
    pub iso_exposure_time: f64,
}

impl ExposureInfo {
    pub fn from_exif(exif: &Exif) -> Self {
        let exposure_bias = rational_field(exif, Tag::ExposureBiasValue)
            .map_or(0, |ev| (ev * 100.0).round() as i32);
        let iso = exif
            .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0));
        let exposure_time = rational_field(exif, Tag::ExposureTime);

        let iso_exposure_time = match (iso, exposure_time) {
            (Some(iso), Some(time)) => f64::from(iso) * time,
            _ => 0.0,
        };

        Self {
            exposure_bias,
            iso_exposure_time,
        }
    }
}

fn rational_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let value = match &field.value {
        Value::Rational(values) => values.first()?.to_f64(),
        Value::SRational(values) => values.first()?.to_f64(),
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Reads exposure settings from a RAW file, falling back to zeros when the
/// container carries no readable EXIF.
pub fn read_exposure_info(data: &[u8]) -> ExposureInfo {
    match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => ExposureInfo::from_exif(&exif),
        Err(e) => {
            debug!(error = %e, "No EXIF exposure data, assuming 0 EV bias");
            ExposureInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Field, Rational, SRational};

    fn exif_container(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut buffer = Cursor::new(Vec::new());
        writer.write(&mut buffer, true).unwrap();
        buffer.into_inner()
    }

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    #[test]
    fn test_reads_bias_iso_and_exposure_time() {
        let data = exif_container(&[
            field(Tag::ExposureBiasValue, Value::SRational(vec![SRational { num: -2, denom: 3 }])),
            field(Tag::PhotographicSensitivity, Value::Short(vec![400])),
            field(Tag::ExposureTime, Value::Rational(vec![Rational { num: 1, denom: 50 }])),
        ]);

        let info = read_exposure_info(&data);

        assert_eq!(info.exposure_bias, -67);
        assert!((info.iso_exposure_time - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_exposure_time_gives_zero_product() {
        let data = exif_container(&[
            field(Tag::ExposureBiasValue, Value::SRational(vec![SRational { num: 1, denom: 1 }])),
            field(Tag::PhotographicSensitivity, Value::Short(vec![100])),
        ]);

        let info = read_exposure_info(&data);

        assert_eq!(info.exposure_bias, 100);
        assert_eq!(info.iso_exposure_time, 0.0);
    }

    #[test]
    fn test_zero_denominator_is_ignored() {
        let data = exif_container(&[field(
            Tag::ExposureBiasValue,
            Value::SRational(vec![SRational { num: 1, denom: 0 }]),
        )]);

        assert_eq!(read_exposure_info(&data).exposure_bias, 0);
    }

    #[test]
    fn test_unreadable_container_defaults() {
        assert_eq!(read_exposure_info(b"not a raw file"), ExposureInfo::default());
    }
}
