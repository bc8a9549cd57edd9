// src/conditioner/threshold.rs

//! Local-mean (Bradley) binarisation backed by a summed-area table.

use super::{CHANNELS, ReceiptImage, luma};

/// Window side is the image width divided by this.
const WINDOW_DIVISOR: usize = 16;
/// A pixel must be this much darker than its neighbourhood mean to be ink.
const SENSITIVITY: f64 = 0.12;

pub(super) fn luma_plane(image: &ReceiptImage) -> Vec<u8> {
    image
        .pixels()
        .chunks_exact(CHANNELS)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect()
}

/// Summed-area table with a zero guard row and column:
/// `table[(y + 1) * (w + 1) + (x + 1)]` is the sum of `plane[..=y][..=x]`.
fn integral_image(plane: &[u8], w: usize, h: usize) -> Vec<u64> {
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += u64::from(plane[y * w + x]);
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

pub(super) fn half_window(width: usize) -> usize {
    (width / WINDOW_DIVISOR).max(1) / 2
}

/// Black when `luma * count <= sum * (1 - SENSITIVITY)`, white otherwise.
pub(super) fn binarize(luma: u8, count: usize, sum: u64) -> u8 {
    if f64::from(luma) * count as f64 <= sum as f64 * (1.0 - SENSITIVITY) {
        0
    } else {
        255
    }
}

pub(super) fn adaptive_threshold(image: &ReceiptImage) -> ReceiptImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let plane = luma_plane(image);
    let table = integral_image(&plane, w, h);
    let stride = w + 1;
    let half = half_window(w);
    let mut out = vec![0u8; plane.len() * CHANNELS];

    for y in 0..h {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half).min(w - 1);
            let count = (x1 - x0 + 1) * (y1 - y0 + 1);
            let sum = table[(y1 + 1) * stride + x1 + 1] + table[y0 * stride + x0]
                - table[y0 * stride + x1 + 1]
                - table[(y1 + 1) * stride + x0];

            let value = binarize(plane[y * w + x], count, sum);
            let o = (y * w + x) * CHANNELS;
            out[o..o + 3].fill(value);
            out[o + 3] = 255;
        }
    }

    image.with_pixels(out)
}
