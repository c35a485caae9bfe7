//! Pixel reveal: negate → normalise → sharpen.
//!
//! White-on-white (or near-white) text differs from the background by a few
//! levels at most. Negating turns the page dark, stretching the luminance
//! histogram spreads those few levels across the full 0–255 range, and a mild
//! sharpen restores glyph edges blurred by the stretch.
//!
//! Every step is a pure function of its input buffer, so [`reveal`] is
//! deterministic and safe to run on many pages at once.

use crate::pipeline::encode::encode_png;
use image::{Rgba, RgbaImage};

/// Fraction of pixels clipped at each end of the histogram when normalising.
const NORMALISE_CLIP: f64 = 0.01;

/// Mild 3×3 sharpening kernel (centre-weighted, sums to 24).
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[-1, -1, -1], [-1, 32, -1], [-1, -1, -1]];
const SHARPEN_DIVISOR: i32 = 24;

/// Run the full reveal and PNG-encode the result.
pub fn reveal(page: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut img = page.clone();
    negate(&mut img);
    normalise(&mut img);
    let img = sharpen(&img);
    encode_png(&img)
}

/// Invert the colour channels, leaving alpha alone.
pub fn negate(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        *pixel = Rgba([255 - r, 255 - g, 255 - b, a]);
    }
}

fn luma(p: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = p.0;
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

/// Stretch luminance so the 1st..99th percentile spans 0..255.
///
/// Each colour channel is mapped with the same linear function, preserving
/// hue. A flat image (no spread) is left unchanged.
pub fn normalise(img: &mut RgbaImage) {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return;
    }

    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[luma(p) as usize] += 1;
    }

    let clip = (total as f64 * NORMALISE_CLIP) as u64;
    let low = percentile_from_bottom(&histogram, clip);
    let high = percentile_from_top(&histogram, clip);
    if high <= low {
        return;
    }

    let low = low as i32;
    let span = high as i32 - low;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        let stretched = ((v as i32 - low) * 255 + span / 2) / span;
        *slot = stretched.clamp(0, 255) as u8;
    }

    for pixel in img.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        *pixel = Rgba([lut[r as usize], lut[g as usize], lut[b as usize], a]);
    }
}

fn percentile_from_bottom(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (v, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            return v as u8;
        }
    }
    u8::MAX
}

fn percentile_from_top(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (v, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            return v as u8;
        }
    }
    0
}

/// Convolve the colour channels with [`SHARPEN_KERNEL`]; edges are clamped.
pub fn sharpen(img: &RgbaImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    for y in 0..height {
        for x in 0..width {
            let mut acc = [0i32; 3];
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                let sy = (y as i64 + ky as i64 - 1).clamp(0, height as i64 - 1) as u32;
                for (kx, weight) in row.iter().enumerate() {
                    let sx = (x as i64 + kx as i64 - 1).clamp(0, width as i64 - 1) as u32;
                    let src = img.get_pixel(sx, sy);
                    for (c, slot) in acc.iter_mut().enumerate() {
                        *slot += src[c] as i32 * weight;
                    }
                }
            }
            let channel = |v: i32| -> u8 {
                let rounded = if v >= 0 {
                    (v + SHARPEN_DIVISOR / 2) / SHARPEN_DIVISOR
                } else {
                    (v - SHARPEN_DIVISOR / 2) / SHARPEN_DIVISOR
                };
                rounded.clamp(0, 255) as u8
            };
            let alpha = img.get_pixel(x, y)[3];
            out.put_pixel(
                x,
                y,
                Rgba([channel(acc[0]), channel(acc[1]), channel(acc[2]), alpha]),
            );
        }
    }
    out
}
