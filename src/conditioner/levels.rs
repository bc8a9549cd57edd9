// src/conditioner/levels.rs

use super::{CHANNELS, ReceiptImage, luma};

/// Edge-enhancing kernel, applied to colour channels only.
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

/// Contrast then brightness on the unit range, clamped after each step,
/// precomputed for every input level.
fn tone_curve(contrast: f32, brightness: f32) -> [u8; 256] {
    let mut curve = [0u8; 256];
    for (level, slot) in curve.iter_mut().enumerate() {
        let mut v = level as f32 / 255.0;
        v = ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
        v = (v * brightness).clamp(0.0, 1.0);
        *slot = (v * 255.0).round() as u8;
    }
    curve
}

/// Grayscale (optional), contrast and brightness as one per-pixel pass.
/// Alpha is copied through.
pub(super) fn apply_levels(
    image: &ReceiptImage,
    grayscale: bool,
    contrast_percent: f32,
    brightness_percent: f32,
) -> ReceiptImage {
    let curve = tone_curve(
        contrast_percent.max(0.0) / 100.0,
        brightness_percent.max(0.0) / 100.0,
    );
    let src = image.pixels();
    let mut out = vec![0u8; src.len()];

    for (s, d) in src.chunks_exact(CHANNELS).zip(out.chunks_exact_mut(CHANNELS)) {
        if grayscale {
            let y = curve[luma(s[0], s[1], s[2]) as usize];
            d[..3].fill(y);
        } else {
            d[0] = curve[s[0] as usize];
            d[1] = curve[s[1] as usize];
            d[2] = curve[s[2] as usize];
        }
        d[3] = s[3];
    }

    image.with_pixels(out)
}

/// 3x3 sharpen over interior pixels. The outermost rows and columns keep
/// their source values; every pixel comes out fully opaque.
pub(super) fn sharpen(image: &ReceiptImage) -> ReceiptImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src = image.pixels();
    let mut out = src.to_vec();

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            for c in 0..3 {
                let mut sum = 0i32;
                for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                    for (kx, weight) in row.iter().enumerate() {
                        let idx = ((y + ky - 1) * w + (x + kx - 1)) * CHANNELS + c;
                        sum += i32::from(src[idx]) * weight;
                    }
                }
                out[(y * w + x) * CHANNELS + c] = sum.clamp(0, 255) as u8;
            }
        }
    }

    for alpha in out.iter_mut().skip(3).step_by(CHANNELS) {
        *alpha = 255;
    }

    image.with_pixels(out)
}
