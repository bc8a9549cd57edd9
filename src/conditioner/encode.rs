// src/conditioner/encode.rs

use super::{ConditionError, ReceiptImage};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;

/// Compressed format handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy; alpha is dropped. Quality is clamped to 1..=100.
    Jpeg { quality: u8 },
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 90 }
    }
}

/// Encoded raster plus the MIME type an engine needs to read it.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

pub fn encode(image: &ReceiptImage, format: OutputFormat) -> Result<EncodedImage, ConditionError> {
    let rgba = image.to_rgba_image()?;
    let mut bytes = Vec::new();

    let mime = match format {
        OutputFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(ConditionError::Encode)?;
            "image/jpeg"
        }
        OutputFormat::Png => {
            rgba.write_with_encoder(PngEncoder::new(&mut bytes))
                .map_err(ConditionError::Encode)?;
            "image/png"
        }
    };

    Ok(EncodedImage { bytes, mime })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_output_decodes_to_same_size() {
        let img = ReceiptImage::filled(17, 9, [240, 240, 240, 0]).unwrap();
        let jpeg = encode(&img, OutputFormat::default()).unwrap();
        assert_eq!(jpeg.mime, "image/jpeg");
        assert_eq!(&jpeg.bytes[..2], &[0xFF, 0xD8]);

        let back = ReceiptImage::decode(&jpeg.bytes).unwrap();
        assert_eq!(back.dimensions(), (17, 9));
        assert_eq!(back.pixel(8, 4)[3], 255);
    }

    #[test]
    fn test_png_output_is_lossless() {
        let img = ReceiptImage::from_rgba(2, 1, vec![1, 2, 3, 4, 250, 251, 252, 253]).unwrap();
        let png = encode(&img, OutputFormat::Png).unwrap();
        assert_eq!(png.mime, "image/png");
        assert_eq!(ReceiptImage::decode(&png.bytes).unwrap(), img);
    }
}
