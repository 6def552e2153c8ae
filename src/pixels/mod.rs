//! Native pixel data: extraction from a record, PNG export and re-attachment.

pub mod censor;

pub use censor::{
    censor_image, filter_detections, hide_text, CensorMode, CensorOptions, FillColor,
    TextDetection, TextDetector,
};

use crate::record::{Element, ElementValue, Record, Scalar};
use crate::{DeidError, Result};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::path::Path;

const MONOCHROME1: &str = "MONOCHROME1";

fn corrupt(reason: impl Into<String>) -> DeidError {
    DeidError::CorruptImage(reason.into())
}

fn int_attribute(record: &Record, tag: Tag) -> Option<i64> {
    match record.get(tag)?.value() {
        ElementValue::Single(Scalar::Int(i)) => Some(*i),
        ElementValue::Single(Scalar::Text(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_attribute(record: &Record, tag: Tag, name: &str) -> Result<u32> {
    int_attribute(record, tag)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| corrupt(format!("missing or invalid {name}")))
}

/// A single frame of native pixel data, one `u16` per sample.
///
/// Samples are interleaved (`R G B R G B ...`) when there are 3 samples per
/// pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    width: u32,
    height: u32,
    samples_per_pixel: u16,
    bits_allocated: u16,
    bits_stored: u16,
    inverted: bool,
    samples: Vec<u16>,
}

impl PixelArray {
    /// Grayscale array with 16 bits allocated and stored.
    pub fn from_gray16(width: u32, height: u32, samples: Vec<u16>) -> Result<Self> {
        Self::new(width, height, 1, 16, 16, samples)
    }

    pub fn new(
        width: u32,
        height: u32,
        samples_per_pixel: u16,
        bits_allocated: u16,
        bits_stored: u16,
        samples: Vec<u16>,
    ) -> Result<Self> {
        if !matches!(samples_per_pixel, 1 | 3) {
            return Err(corrupt(format!(
                "unsupported samples per pixel: {samples_per_pixel}"
            )));
        }
        if !matches!(bits_allocated, 8 | 16) {
            return Err(corrupt(format!(
                "unsupported bits allocated: {bits_allocated}"
            )));
        }
        if bits_stored == 0 || bits_stored > bits_allocated {
            return Err(corrupt(format!("unsupported bits stored: {bits_stored}")));
        }
        if samples_per_pixel == 3 && bits_allocated != 8 {
            return Err(corrupt("color images must have 8 bits allocated"));
        }
        let expected = width as usize * height as usize * samples_per_pixel as usize;
        if samples.len() != expected {
            return Err(corrupt(format!(
                "expected {} samples, got {}",
                expected,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            inverted: false,
            samples,
        })
    }

    /// Extracts the pixel array of a record holding native pixel data.
    ///
    /// Only single-frame images with 8 or 16 bits allocated and 1 or 3
    /// interleaved samples per pixel are supported.
    pub fn from_record(record: &Record) -> Result<Self> {
        let width = required_attribute(record, tags::COLUMNS, "Columns")?;
        let height = required_attribute(record, tags::ROWS, "Rows")?;
        let bits_allocated = required_attribute(record, tags::BITS_ALLOCATED, "BitsAllocated")?;
        let bits_stored = int_attribute(record, tags::BITS_STORED)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(bits_allocated);
        let samples_per_pixel = int_attribute(record, tags::SAMPLES_PER_PIXEL).unwrap_or(1);

        if let Some(frames) = int_attribute(record, tags::NUMBER_OF_FRAMES) {
            if frames != 1 {
                return Err(corrupt(format!("{frames} frames, only one is supported")));
            }
        }
        if int_attribute(record, tags::PLANAR_CONFIGURATION).unwrap_or(0) != 0 {
            return Err(corrupt("planar pixel data is not supported"));
        }

        let bytes = match record.get(tags::PIXEL_DATA).map(Element::value) {
            Some(ElementValue::Single(Scalar::Bytes(bytes))) => bytes,
            Some(ElementValue::Encapsulated { .. }) => {
                return Err(corrupt("encapsulated pixel data is not supported"))
            }
            _ => return Err(corrupt("no native pixel data")),
        };

        let samples_per_pixel = u16::try_from(samples_per_pixel)
            .map_err(|_| corrupt(format!("invalid samples per pixel: {samples_per_pixel}")))?;
        let bits_allocated = u16::try_from(bits_allocated)
            .map_err(|_| corrupt(format!("invalid bits allocated: {bits_allocated}")))?;
        let bits_stored = u16::try_from(bits_stored)
            .map_err(|_| corrupt(format!("invalid bits stored: {bits_stored}")))?;

        let count = width as usize * height as usize * samples_per_pixel as usize;
        let little_endian = record.encoding().map_or(true, |e| e.little_endian);
        let samples = match bits_allocated {
            8 => bytes.iter().take(count).map(|&b| u16::from(b)).collect::<Vec<_>>(),
            16 => bytes
                .chunks_exact(2)
                .take(count)
                .map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if little_endian {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                })
                .collect(),
            other => return Err(corrupt(format!("unsupported bits allocated: {other}"))),
        };

        let mut pixels = Self::new(
            width,
            height,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            samples,
        )?;
        pixels.inverted = record
            .get(tags::PHOTOMETRIC_INTERPRETATION)
            .and_then(|e| e.value().to_text())
            .is_some_and(|p| p.trim() == MONOCHROME1);
        Ok(pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn bits_allocated(&self) -> u16 {
        self.bits_allocated
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut Vec<u16> {
        &mut self.samples
    }

    /// Largest value a sample can hold.
    pub fn max_value(&self) -> u16 {
        ((1u32 << self.bits_stored) - 1) as u16
    }

    /// Raw pixel data bytes, as stored in the `PixelData` attribute.
    pub fn to_bytes(&self, little_endian: bool) -> Vec<u8> {
        match self.bits_allocated {
            8 => self.samples.iter().map(|&s| s as u8).collect(),
            _ => self
                .samples
                .iter()
                .flat_map(|&s| {
                    if little_endian {
                        s.to_le_bytes()
                    } else {
                        s.to_be_bytes()
                    }
                })
                .collect(),
        }
    }

    /// `PixelData (7FE0,0010)` element holding this array.
    pub fn to_element(&self, little_endian: bool) -> Element {
        let vr = if self.bits_allocated == 8 { VR::OB } else { VR::OW };
        Element::new(
            tags::PIXEL_DATA,
            vr,
            ElementValue::Single(Scalar::Bytes(self.to_bytes(little_endian))),
        )
    }

    /// Replaces the pixel data of `record` by this array.
    pub fn attach_to(&self, record: &mut Record) {
        let little_endian = record.encoding().map_or(true, |e| e.little_endian);
        record.insert(self.to_element(little_endian));
    }

    /// 8-bit rendition of the array.
    ///
    /// Grayscale samples are scaled so that the darkest pixel is 0 and the
    /// brightest 255, MONOCHROME1 images being inverted first.
    pub fn to_image(&self) -> Result<DynamicImage> {
        if self.samples_per_pixel == 3 {
            let raw = self.samples.iter().map(|&s| s as u8).collect();
            return RgbImage::from_raw(self.width, self.height, raw)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| corrupt("pixel buffer does not match image size"));
        }

        let max_value = self.max_value();
        let values: Vec<u16> = self
            .samples
            .iter()
            .map(|&s| if self.inverted { max_value.saturating_sub(s) } else { s })
            .collect();
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        let range = f64::from(max - min).max(1.0);
        let raw = values
            .iter()
            .map(|&v| (f64::from(v - min) / range * 255.0).round() as u8)
            .collect();
        GrayImage::from_raw(self.width, self.height, raw)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| corrupt("pixel buffer does not match image size"))
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.to_image()?
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| DeidError::Write(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_record(bits: u16, data: Vec<u8>) -> Record {
        let mut record = Record::new();
        record.insert(Element::text(tags::TRANSFER_SYNTAX_UID, VR::UI, "1.2.840.10008.1.2.1"));
        record.insert(Element::text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"));
        for (tag, value) in [
            (tags::ROWS, 2),
            (tags::COLUMNS, 3),
            (tags::BITS_ALLOCATED, i64::from(bits)),
            (tags::BITS_STORED, i64::from(bits)),
            (tags::SAMPLES_PER_PIXEL, 1),
        ] {
            record.insert(Element::new(tag, VR::US, ElementValue::Single(Scalar::Int(value))));
        }
        record.insert(Element::new(
            tags::PIXEL_DATA,
            if bits == 8 { VR::OB } else { VR::OW },
            ElementValue::Single(Scalar::Bytes(data)),
        ));
        record
    }

    #[test]
    fn test_from_record_16_bits() {
        let data = vec![0, 0, 1, 0, 2, 0, 0, 1, 255, 255, 3, 0];
        let pixels = PixelArray::from_record(&gray_record(16, data.clone())).unwrap();
        assert_eq!(pixels.width(), 3);
        assert_eq!(pixels.height(), 2);
        assert_eq!(pixels.samples(), &[0, 1, 2, 256, 65535, 3]);
        assert_eq!(pixels.to_bytes(true), data);
    }

    #[test]
    fn test_from_record_8_bits_with_padding() {
        let pixels = PixelArray::from_record(&gray_record(8, vec![1, 2, 3, 4, 5, 6, 0])).unwrap();
        assert_eq!(pixels.samples(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(pixels.max_value(), 255);
    }

    #[test]
    fn test_from_record_errors() {
        let short = gray_record(16, vec![0; 4]);
        assert!(matches!(
            PixelArray::from_record(&short),
            Err(DeidError::CorruptImage(_))
        ));

        let mut multi_frame = gray_record(8, vec![0; 6]);
        multi_frame.insert(Element::text(tags::NUMBER_OF_FRAMES, VR::IS, "3"));
        assert!(matches!(
            PixelArray::from_record(&multi_frame),
            Err(DeidError::CorruptImage(_))
        ));

        let mut encapsulated = gray_record(8, vec![0; 6]);
        encapsulated.insert(Element::new(
            tags::PIXEL_DATA,
            VR::OB,
            ElementValue::Encapsulated {
                offset_table: vec![],
                fragments: vec![vec![0; 6]],
            },
        ));
        assert!(matches!(
            PixelArray::from_record(&encapsulated),
            Err(DeidError::CorruptImage(_))
        ));

        let mut twelve_bits = gray_record(8, vec![0; 6]);
        twelve_bits.insert(Element::new(
            tags::BITS_ALLOCATED,
            VR::US,
            ElementValue::Single(Scalar::Int(12)),
        ));
        assert!(PixelArray::from_record(&twelve_bits).is_err());
    }

    #[test]
    fn test_attach_to_record() {
        let mut record = gray_record(16, vec![0; 12]);
        let pixels = PixelArray::from_gray16(3, 2, vec![7; 6]).unwrap();
        pixels.attach_to(&mut record);
        assert_eq!(PixelArray::from_record(&record).unwrap().samples(), &[7; 6]);
        assert_eq!(record.get(tags::PIXEL_DATA).unwrap().vr(), VR::OW);
    }

    #[test]
    fn test_to_image_normalizes() {
        let pixels = PixelArray::from_gray16(3, 1, vec![100, 150, 200]).unwrap();
        let image = pixels.to_image().unwrap().into_luma8();
        assert_eq!(image.into_raw(), vec![0, 128, 255]);
    }

    #[test]
    fn test_to_image_inverts_monochrome1() {
        let mut record = gray_record(8, vec![0, 0, 0, 255, 255, 255]);
        record.insert(Element::text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME1"));
        let image = PixelArray::from_record(&record)
            .unwrap()
            .to_image()
            .unwrap()
            .into_luma8();
        assert_eq!(image.into_raw(), vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        PixelArray::from_gray16(3, 2, vec![0, 1, 2, 3, 4, 5])
            .unwrap()
            .save_png(&path)
            .unwrap();
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }
}
