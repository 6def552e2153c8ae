//! Censoring of burned-in text, on top of an external OCR capability.

use super::PixelArray;
use crate::config::AuthorizedWords;
use crate::{DeidError, Result};
use garde::Validate;
use image::{imageops, ImageBuffer, Luma, Pixel, Rgb};
use log::{debug, info};
use serde::{Deserialize, Serialize};

const BLUR_SIGMA: f32 = 1.0;

/// A word found on an image by an OCR backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    /// Corners of the word, clockwise from the top-left one, as `(x, y)`.
    pub bounding_box: [(f64, f64); 4],
    pub text: String,
    pub confidence: f64,
}

impl TextDetection {
    pub fn new(bounding_box: [(f64, f64); 4], text: impl Into<String>, confidence: f64) -> Self {
        Self {
            bounding_box,
            text: text.into(),
            confidence,
        }
    }
}

/// An OCR backend.
pub trait TextDetector: Send + Sync {
    fn detect_text(&self, pixels: &PixelArray, languages: &[String]) -> Result<Vec<TextDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CensorMode {
    #[default]
    Rectangle,
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillColor {
    #[default]
    Black,
    White,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
pub struct CensorOptions {
    #[garde(skip)]
    pub mode: CensorMode,
    #[garde(skip)]
    pub color: FillColor,
    /// Pixels added on each side of a detected word.
    #[garde(range(max = 10_000))]
    pub margin: u32,
    /// Detections are ignored altogether when the first one is not more
    /// confident than this.
    #[garde(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,
    #[garde(range(min = 1, max = 100))]
    pub blur_passes: u32,
    #[garde(length(min = 1), inner(length(min = 1)))]
    pub languages: Vec<String>,
}

impl Default for CensorOptions {
    fn default() -> Self {
        Self {
            mode: CensorMode::Rectangle,
            color: FillColor::Black,
            margin: 300,
            min_confidence: 0.3,
            blur_passes: 30,
            languages: vec!["fr".into()],
        }
    }
}

/// Drops the detections that must stay visible.
///
/// Everything is dropped when the first detection has a confidence of at most
/// `min_confidence`, i.e. the image most likely has no text at all. Words in
/// `authorized_words` are dropped too.
pub fn filter_detections(
    detections: Vec<TextDetection>,
    authorized_words: &AuthorizedWords,
    min_confidence: f64,
) -> Vec<TextDetection> {
    match detections.first() {
        Some(first) if first.confidence > min_confidence => {}
        _ => return Vec::new(),
    }

    detections
        .into_iter()
        .filter(|detection| {
            let authorized = authorized_words.contains(&detection.text);
            if authorized {
                info!("Ignoring word {}", detection.text.to_uppercase());
            }
            !authorized
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Region {
    /// Box spanned by the top-left and bottom-right corners of `detection`,
    /// grown by `margin` and clipped to the image.
    fn around(detection: &TextDetection, margin: u32, width: u32, height: u32) -> Option<Self> {
        let (x1, y1) = detection.bounding_box[0];
        let (x2, y2) = detection.bounding_box[2];
        let margin = f64::from(margin);

        let clip = |v: f64, max: u32| v.clamp(0.0, f64::from(max)) as u32;
        let left = clip(x1.min(x2).floor() - margin, width);
        let right = clip(x1.max(x2).ceil() + margin, width);
        let top = clip(y1.min(y2).floor() - margin, height);
        let bottom = clip(y1.max(y2).ceil() + margin, height);

        (right > left && bottom > top).then_some(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

fn fill_region(pixels: &mut PixelArray, region: Region, value: u16) {
    let width = pixels.width() as usize;
    let channels = usize::from(pixels.samples_per_pixel());
    let samples = pixels.samples_mut();
    for y in region.y..region.y + region.height {
        let start = (y as usize * width + region.x as usize) * channels;
        let end = start + region.width as usize * channels;
        samples[start..end].fill(value);
    }
}

fn blur_buffer<P>(buffer: &mut ImageBuffer<P, Vec<u16>>, region: Region, passes: u32)
where
    P: Pixel<Subpixel = u16> + 'static,
{
    let mut cut =
        imageops::crop_imm(&*buffer, region.x, region.y, region.width, region.height).to_image();
    for _ in 0..passes {
        cut = imageops::blur(&cut, BLUR_SIGMA);
    }
    imageops::replace(buffer, &cut, i64::from(region.x), i64::from(region.y));
}

fn blur_region(pixels: &mut PixelArray, region: Region, passes: u32) -> Result<()> {
    let (width, height) = (pixels.width(), pixels.height());
    let samples = std::mem::take(pixels.samples_mut());
    let mismatch = || DeidError::CorruptImage("pixel buffer does not match image size".into());

    let blurred = if pixels.samples_per_pixel() == 3 {
        let mut buffer =
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, samples).ok_or_else(mismatch)?;
        blur_buffer(&mut buffer, region, passes);
        buffer.into_raw()
    } else {
        let mut buffer =
            ImageBuffer::<Luma<u16>, _>::from_raw(width, height, samples).ok_or_else(mismatch)?;
        blur_buffer(&mut buffer, region, passes);
        buffer.into_raw()
    };
    *pixels.samples_mut() = blurred;
    Ok(())
}

/// Hides the words of `detections` on `pixels`.
///
/// Words of at most one character are left alone. Returns the number of
/// hidden words.
pub fn hide_text(
    pixels: &mut PixelArray,
    detections: &[TextDetection],
    options: &CensorOptions,
) -> Result<usize> {
    let fill = match options.color {
        FillColor::Black => 0,
        FillColor::White => pixels.max_value(),
    };

    let mut hidden = 0;
    for detection in detections {
        if detection.text.chars().count() <= 1 {
            continue;
        }
        let Some(region) =
            Region::around(detection, options.margin, pixels.width(), pixels.height())
        else {
            continue;
        };

        match options.mode {
            CensorMode::Rectangle => fill_region(pixels, region, fill),
            CensorMode::Blur => blur_region(pixels, region, options.blur_passes)?,
        }
        debug!("Hid {:?} at {:?}", detection.text, region);
        hidden += 1;
    }
    Ok(hidden)
}

/// Detects, filters and hides the text burned into `pixels`.
pub fn censor_image<D>(
    pixels: &mut PixelArray,
    detector: &D,
    authorized_words: &AuthorizedWords,
    options: &CensorOptions,
) -> Result<usize>
where
    D: TextDetector + ?Sized,
{
    options
        .validate()
        .map_err(|e| DeidError::Config(format!("invalid censor options: {e}")))?;
    let detections = detector.detect_text(pixels, &options.languages)?;
    let detections = filter_detections(detections, authorized_words, options.min_confidence);
    hide_text(pixels, &detections, options)
}
