// src/conditioner/rotate.rs

use super::{CHANNELS, ReceiptImage};

/// Rotate clockwise by `degrees` (negative turns counter-clockwise).
///
/// Multiples of 90 are exact quarter turns that swap width and height at
/// 90 and 270. Any other angle rotates about the centre onto a canvas of
/// the same size with bilinear sampling; corners that fall outside the
/// source become transparent.
pub fn rotate(image: &ReceiptImage, degrees: f64) -> ReceiptImage {
    if !degrees.is_finite() {
        return image.clone();
    }

    let normalized = degrees.rem_euclid(360.0);
    let quarters = (normalized / 90.0).round();
    if (normalized - quarters * 90.0).abs() > 1e-9 {
        return rotate_free(image, normalized.to_radians());
    }

    match quarters as u32 % 4 {
        0 => image.clone(),
        1 => remap(image, true, |x, y, _, h| (h - 1 - y, x)),
        2 => remap(image, false, |x, y, w, h| (w - 1 - x, h - 1 - y)),
        _ => remap(image, true, |x, y, w, _| (y, w - 1 - x)),
    }
}

/// Move every source pixel to `target(x, y, w, h)` on a new canvas.
fn remap(
    image: &ReceiptImage,
    swap_sides: bool,
    target: impl Fn(usize, usize, usize, usize) -> (usize, usize),
) -> ReceiptImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let (out_w, out_h) = if swap_sides { (h, w) } else { (w, h) };
    let src = image.pixels();
    let mut out = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            let (nx, ny) = target(x, y, w, h);
            let s = (y * w + x) * CHANNELS;
            let d = (ny * out_w + nx) * CHANNELS;
            out[d..d + CHANNELS].copy_from_slice(&src[s..s + CHANNELS]);
        }
    }

    ReceiptImage {
        width: out_w as u32,
        height: out_h as u32,
        pixels: out,
    }
}

fn rotate_free(image: &ReceiptImage, theta: f64) -> ReceiptImage {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let (sin, cos) = theta.sin_cos();
    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;
    let mut out = vec![0u8; image.pixels().len()];

    for y in 0..h {
        for x in 0..w {
            // Inverse map the destination pixel centre back into the source.
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let sx = dx * cos + dy * sin + cx - 0.5;
            let sy = -dx * sin + dy * cos + cy - 0.5;

            if sx < -0.5 || sy < -0.5 || sx >= w as f64 - 0.5 || sy >= h as f64 - 0.5 {
                continue;
            }

            let d = (y * w + x) * CHANNELS;
            out[d..d + CHANNELS].copy_from_slice(&sample_bilinear(image, sx, sy));
        }
    }

    image.with_pixels(out)
}

fn sample_bilinear(image: &ReceiptImage, sx: f64, sy: f64) -> [u8; 4] {
    let max_x = image.width() as f64 - 1.0;
    let max_y = image.height() as f64 - 1.0;
    let sx = sx.clamp(0.0, max_x);
    let sy = sy.clamp(0.0, max_y);
    let x0 = sx.floor();
    let y0 = sy.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let fx = sx - x0;
    let fy = sy - y0;

    let p00 = image.pixel(x0 as u32, y0 as u32);
    let p10 = image.pixel(x1 as u32, y0 as u32);
    let p01 = image.pixel(x0 as u32, y1 as u32);
    let p11 = image.pixel(x1 as u32, y1 as u32);

    let mut px = [0u8; 4];
    for c in 0..CHANNELS {
        let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
        let bottom = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
        px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    px
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [u8; 4] = [255, 0, 0, 255];
    const B: [u8; 4] = [0, 255, 0, 255];
    const C: [u8; 4] = [0, 0, 255, 255];

    fn strip() -> ReceiptImage {
        // A B C in one row.
        ReceiptImage::from_rgba(3, 1, [A, B, C].concat()).unwrap()
    }

    #[test]
    fn test_quarter_turn_is_clockwise() {
        let out = rotate(&strip(), 90.0);
        assert_eq!(out.dimensions(), (1, 3));
        assert_eq!(out.pixel(0, 0), A);
        assert_eq!(out.pixel(0, 2), C);
    }

    #[test]
    fn test_half_turn_reverses() {
        let out = rotate(&strip(), 180.0);
        assert_eq!(out.dimensions(), (3, 1));
        assert_eq!(out.pixel(0, 0), C);
        assert_eq!(out.pixel(2, 0), A);
    }

    #[test]
    fn test_three_quarter_turn_is_counter_clockwise() {
        let out = rotate(&strip(), 270.0);
        assert_eq!(out.dimensions(), (1, 3));
        assert_eq!(out.pixel(0, 0), C);
        assert_eq!(out.pixel(0, 2), A);
        assert_eq!(rotate(&strip(), -90.0), out);
    }

    #[test]
    fn test_90_then_270_restores_image() {
        let mut pixels = Vec::new();
        for i in 0..(5 * 3) {
            pixels.extend_from_slice(&[i as u8, (i * 7) as u8, (i * 13) as u8, 255]);
        }
        let img = ReceiptImage::from_rgba(5, 3, pixels).unwrap();
        let back = rotate(&rotate(&img, 90.0), 270.0);
        assert_eq!(back, img);
    }

    #[test]
    fn test_full_turns_are_identity() {
        assert_eq!(rotate(&strip(), 0.0), strip());
        assert_eq!(rotate(&strip(), 360.0), strip());
        assert_eq!(rotate(&strip(), -720.0), strip());
    }

    #[test]
    fn test_arbitrary_angle_keeps_canvas_and_centre() {
        let img = ReceiptImage::filled(41, 21, [200, 100, 50, 255]).unwrap();
        let out = rotate(&img, 33.0);
        assert_eq!(out.dimensions(), (41, 21));
        assert_eq!(out.pixel(20, 10), [200, 100, 50, 255]);
        // Far corner maps outside the source.
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_non_finite_angle_is_a_no_op() {
        assert_eq!(rotate(&strip(), f64::NAN), strip());
        assert_eq!(rotate(&strip(), f64::INFINITY), strip());
    }
}
