// src/conditioner/crop.rs

use super::{CHANNELS, ReceiptImage, luma};
use tracing::debug;

/// Distance between sampled pixels when looking for ink.
const GRID_STRIDE: usize = 15;
/// Samples darker than this luma count as ink.
const INK_LUMA: u8 = 120;
/// Padding added around the ink box on every side.
const MARGIN: u32 = 50;
/// Smaller crops are discarded; a near-empty ink mask must not collapse the page.
const MIN_SIDE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct InkBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Bounding box of ink on a coarse sampling grid, `None` on a blank page.
pub(super) fn ink_bounds(image: &ReceiptImage) -> Option<InkBounds> {
    let mut bounds: Option<InkBounds> = None;

    for y in (0..image.height()).step_by(GRID_STRIDE) {
        for x in (0..image.width()).step_by(GRID_STRIDE) {
            let [r, g, b, _] = image.pixel(x, y);
            if luma(r, g, b) >= INK_LUMA {
                continue;
            }
            bounds = Some(match bounds {
                None => InkBounds {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(b) => InkBounds {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
            });
        }
    }

    bounds
}

/// Crop to the padded ink box, or return the image unchanged when there is
/// no ink or the box would be smaller than `MIN_SIDE` on either side.
pub(super) fn auto_crop(image: &ReceiptImage) -> ReceiptImage {
    let Some(ink) = ink_bounds(image) else {
        debug!("Auto-crop: no ink found, keeping full image");
        return image.clone();
    };

    let x0 = ink.min_x.saturating_sub(MARGIN);
    let y0 = ink.min_y.saturating_sub(MARGIN);
    let x1 = (ink.max_x + MARGIN).min(image.width() - 1);
    let y1 = (ink.max_y + MARGIN).min(image.height() - 1);
    let width = x1 - x0 + 1;
    let height = y1 - y0 + 1;

    if width < MIN_SIDE || height < MIN_SIDE {
        debug!(width, height, "Auto-crop: ink box below minimum size, keeping full image");
        return image.clone();
    }

    let row_bytes = width as usize * CHANNELS;
    let src = image.pixels();
    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for y in y0..=y1 {
        let start = image.index(x0, y);
        out.extend_from_slice(&src[start..start + row_bytes]);
    }

    ReceiptImage {
        width,
        height,
        pixels: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn page_with_block(w: u32, h: u32, x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> ReceiptImage {
        let mut pixels = WHITE.repeat((w * h) as usize);
        for py in y {
            for px in x.clone() {
                let o = (py * w + px) as usize * CHANNELS;
                pixels[o..o + 3].fill(0);
            }
        }
        ReceiptImage::from_rgba(w, h, pixels).unwrap()
    }

    #[test]
    fn test_blank_page_has_no_ink() {
        let blank = ReceiptImage::filled(300, 300, WHITE).unwrap();
        assert_eq!(ink_bounds(&blank), None);
        assert_eq!(auto_crop(&blank), blank);
    }

    #[test]
    fn test_crop_to_padded_ink_box() {
        let page = page_with_block(600, 700, 150..451, 150..451);
        assert_eq!(
            ink_bounds(&page),
            Some(InkBounds {
                min_x: 150,
                min_y: 150,
                max_x: 450,
                max_y: 450
            })
        );

        let out = auto_crop(&page);
        assert_eq!(out.dimensions(), (401, 401));
        assert_eq!(out.pixel(0, 0), WHITE);
        assert_eq!(out.pixel(50, 50), [0, 0, 0, 255]);
    }

    #[test]
    fn test_small_ink_spot_keeps_full_image() {
        let page = page_with_block(600, 600, 295..305, 295..305);
        let out = auto_crop(&page);
        assert_eq!(out.dimensions(), (600, 600));
    }

    #[test]
    fn test_box_is_clamped_to_image_bounds() {
        let page = page_with_block(260, 240, 0..260, 0..240);
        let out = auto_crop(&page);
        assert_eq!(out.dimensions(), (260, 240));
    }
}
