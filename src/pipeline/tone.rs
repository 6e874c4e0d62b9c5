//! Perceptual dynamic-range compression (spec §4.D step 6).
//!
//! Remaps linear-light luminance into the narrower range the measured
//! Black/White panel colors actually produce, using precomputed sRGB
//! lookup tables the way the spec prescribes ("implementations use
//! precomputed ... for speed").

use image::RgbImage;
use once_cell::sync::Lazy;

use crate::store::palette::Rgb as PaletteRgb;

const YIELD_EVERY_N_PIXELS: usize = 2000;

/// 256-entry sRGB byte -> linear-light lookup table.
static SRGB_TO_LINEAR: Lazy<[f32; 256]> = Lazy::new(|| {
    let mut table = [0.0f32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let c = i as f32 / 255.0;
        *entry = if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        };
    }
    table
});

/// 4096-entry linear-light -> sRGB byte lookup table.
static LINEAR_TO_SRGB: Lazy<[u8; 4096]> = Lazy::new(|| {
    let mut table = [0u8; 4096];
    for (i, entry) in table.iter_mut().enumerate() {
        let v = i as f32 / 4095.0;
        let srgb = if v <= 0.0031308 {
            v * 12.92
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        };
        *entry = (srgb.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    table
});

#[inline]
fn srgb_to_linear(byte: u8) -> f32 {
    SRGB_TO_LINEAR[byte as usize]
}

#[inline]
fn linear_to_srgb(v: f32) -> u8 {
    let idx = (v.clamp(0.0, 1.0) * 4095.0).round() as usize;
    LINEAR_TO_SRGB[idx.min(4095)]
}

fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126729 * r + 0.7151522 * g + 0.0721750 * b
}

/// Whether the measured palette's luminance range is narrow enough that
/// compression would have any visible effect (§4.D: "when the display
/// palette's measured luminance range is narrower than [0,1]").
pub fn should_compress(black: PaletteRgb, white: PaletteRgb) -> bool {
    let black_y = luminance(
        srgb_to_linear(black.r),
        srgb_to_linear(black.g),
        srgb_to_linear(black.b),
    );
    let white_y = luminance(
        srgb_to_linear(white.r),
        srgb_to_linear(white.g),
        srgb_to_linear(white.b),
    );
    let range = white_y - black_y;
    black_y > 1e-4 || (1.0 - range) > 1e-4
}

/// Apply tone compression in place, yielding to the scheduler every
/// `YIELD_EVERY_N_PIXELS` pixels (§4.D step 6, §5).
pub async fn compress_dynamic_range(img: &mut RgbImage, black: PaletteRgb, white: PaletteRgb) {
    let black_y = luminance(
        srgb_to_linear(black.r),
        srgb_to_linear(black.g),
        srgb_to_linear(black.b),
    );
    let white_y = luminance(
        srgb_to_linear(white.r),
        srgb_to_linear(white.g),
        srgb_to_linear(white.b),
    );
    let range = white_y - black_y;

    let mut processed = 0usize;
    for pixel in img.pixels_mut() {
        let lr = srgb_to_linear(pixel[0]);
        let lg = srgb_to_linear(pixel[1]);
        let lb = srgb_to_linear(pixel[2]);

        let y = luminance(lr, lg, lb);
        let compressed_y = black_y + y * range;

        let (nr, ng, nb) = if y > 1e-6 {
            let factor = compressed_y / y;
            (lr * factor, lg * factor, lb * factor)
        } else {
            (black_y, black_y, black_y)
        };

        pixel[0] = linear_to_srgb(nr);
        pixel[1] = linear_to_srgb(ng);
        pixel[2] = linear_to_srgb(nb);

        processed += 1;
        if processed % YIELD_EVERY_N_PIXELS == 0 {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theoretical_black_and_white_need_no_compression() {
        let black = PaletteRgb::new(0, 0, 0);
        let white = PaletteRgb::new(255, 255, 255);
        assert!(!should_compress(black, white));
    }

    #[test]
    fn narrower_measured_range_requires_compression() {
        let black = PaletteRgb::new(20, 20, 20);
        let white = PaletteRgb::new(230, 230, 230);
        assert!(should_compress(black, white));
    }

    #[tokio::test]
    async fn compression_maps_full_range_into_measured_range() {
        let black = PaletteRgb::new(40, 40, 40);
        let white = PaletteRgb::new(220, 220, 220);

        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([0, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([255, 255, 255]));

        compress_dynamic_range(&mut img, black, white).await;

        let black_out = *img.get_pixel(0, 0);
        let white_out = *img.get_pixel(1, 0);
        // Pure black should land near the measured black point, pure
        // white near the measured white point.
        assert!(black_out[0] <= black.r + 2);
        assert!(white_out[0] >= white.r - 2);
    }
}
