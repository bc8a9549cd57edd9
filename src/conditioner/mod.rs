// src/conditioner/mod.rs

//! Image conditioning for photographed receipts.
//!
//! Every stage reads one arena buffer and writes a fresh one, so the caller's
//! image is never touched. Pixels are RGBA, row-major, addressed as
//! `(y * width + x) * CHANNELS + channel`.

mod crop;
mod encode;
mod levels;
mod rotate;
mod threshold;

pub use encode::{EncodedImage, OutputFormat, encode};
pub use rotate::rotate;

use image::RgbaImage;
use image::imageops::FilterType;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Bytes per pixel in every buffer this module produces.
pub const CHANNELS: usize = 4;

#[derive(Debug, Error)]
pub enum ConditionError {
    /// Empty, truncated or undecodable input. Fatal to the scan attempt.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("failed to encode conditioned image: {0}")]
    Encode(#[source] image::ImageError),
}

/// An RGBA raster owned by one scan attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ReceiptImage {
    /// Wrap a raw RGBA buffer. Fails when a side is zero or the buffer
    /// length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ConditionError> {
        if width == 0 || height == 0 {
            return Err(ConditionError::InvalidImage(format!(
                "empty raster ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(ConditionError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height} RGBA needs {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A raster where every pixel has the same colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, ConditionError> {
        let count = width as usize * height as usize;
        Self::from_rgba(width, height, rgba.repeat(count))
    }

    /// Decode any format the `image` crate understands (JPEG, PNG, WebP, ...).
    pub fn decode(bytes: &[u8]) -> Result<Self, ConditionError> {
        if bytes.is_empty() {
            return Err(ConditionError::InvalidImage("no image data".to_string()));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ConditionError::InvalidImage(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA at `(x, y)`, or `None` outside the raster.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width && y < self.height).then(|| self.pixel(x, y))
    }

    /// Unchecked variant for in-range loops; panics outside the raster.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.index(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub(crate) fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// Same dimensions, new buffer. Stages only ever hand in a buffer they
    /// allocated from `self.pixels.len()`.
    fn with_pixels(&self, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    fn to_rgba_image(&self) -> Result<RgbaImage, ConditionError> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            ConditionError::InvalidImage("raster does not match its dimensions".to_string())
        })
    }
}

/// Rec. 709 luma of an RGB triple, rounded to the nearest level.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.2126 * f32::from(r) + 0.7152 * f32::from(g) + 0.0722 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

/// Conditioning switches. Defaults reproduce the "photocopy" look the
/// scanner applies before OCR: downscale to 3000 px, grayscale, strong
/// contrast, a little extra brightness and a sharpen pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConditionOptions {
    /// Only applied when the source is wider; never upscales.
    pub resize_target_width: Option<u32>,
    pub grayscale: bool,
    pub contrast_percent: f32,
    pub brightness_percent: f32,
    pub sharpen: bool,
    pub adaptive_threshold: bool,
    pub auto_crop: bool,
}

impl Default for ConditionOptions {
    fn default() -> Self {
        Self {
            resize_target_width: Some(3000),
            grayscale: true,
            contrast_percent: 160.0,
            brightness_percent: 110.0,
            sharpen: true,
            adaptive_threshold: false,
            auto_crop: false,
        }
    }
}

impl ConditionOptions {
    /// Every stage off: `condition` returns a copy of its input.
    pub fn identity() -> Self {
        Self {
            resize_target_width: None,
            grayscale: false,
            contrast_percent: 100.0,
            brightness_percent: 100.0,
            sharpen: false,
            adaptive_threshold: false,
            auto_crop: false,
        }
    }

    fn touches_levels(&self) -> bool {
        self.grayscale || self.contrast_percent != 100.0 || self.brightness_percent != 100.0
    }
}

/// Run the enabled stages in order: resize, levels, sharpen, auto-crop,
/// adaptive threshold.
pub fn condition(
    image: &ReceiptImage,
    options: &ConditionOptions,
) -> Result<ReceiptImage, ConditionError> {
    let mut current = match options.resize_target_width {
        Some(target) => resize_to_width(image, target)?,
        None => image.clone(),
    };

    if options.touches_levels() {
        current = levels::apply_levels(
            &current,
            options.grayscale,
            options.contrast_percent,
            options.brightness_percent,
        );
    }
    if options.sharpen {
        current = levels::sharpen(&current);
    }
    if options.auto_crop {
        current = crop::auto_crop(&current);
    }
    if options.adaptive_threshold {
        current = threshold::adaptive_threshold(&current);
    }

    debug!(
        from = %format!("{}x{}", image.width, image.height),
        to = %format!("{}x{}", current.width, current.height),
        "Conditioned receipt image"
    );
    Ok(current)
}

fn resize_to_width(image: &ReceiptImage, target: u32) -> Result<ReceiptImage, ConditionError> {
    let target = target.max(1);
    if image.width <= target {
        return Ok(image.clone());
    }

    let scale = f64::from(target) / f64::from(image.width);
    let height = ((f64::from(image.height) * scale).round() as u32).max(1);
    let resized = image::imageops::resize(&image.to_rgba_image()?, target, height, FilterType::Triangle);
    ReceiptImage::from_rgba(target, height, resized.into_raw())
}
