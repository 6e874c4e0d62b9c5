//! Error-diffusion dithering to the fixed 6-color palette (spec §4.D
//! step 7, §8 testable property 3).

use image::RgbImage;

use crate::store::palette::{Palette, PaletteIndex, PALETTE_INDICES};
use crate::store::settings::DitherAlgorithm;

const YIELD_EVERY_N_PIXELS: usize = 2000;

type Rgbf = (f32, f32, f32);

/// A kernel entry: offset and weight (already divided by the kernel's
/// denominator).
type KernelEntry = (i32, i32, f32);

fn kernel_for(algorithm: DitherAlgorithm) -> &'static [KernelEntry] {
    match algorithm {
        DitherAlgorithm::FloydSteinberg => &[
            (1, 0, 7.0 / 16.0),
            (-1, 1, 3.0 / 16.0),
            (0, 1, 5.0 / 16.0),
            (1, 1, 1.0 / 16.0),
        ],
        DitherAlgorithm::Stucki => &[
            (1, 0, 8.0 / 42.0),
            (2, 0, 4.0 / 42.0),
            (-2, 1, 2.0 / 42.0),
            (-1, 1, 4.0 / 42.0),
            (0, 1, 8.0 / 42.0),
            (1, 1, 4.0 / 42.0),
            (2, 1, 2.0 / 42.0),
            (-2, 2, 1.0 / 42.0),
            (-1, 2, 2.0 / 42.0),
            (0, 2, 4.0 / 42.0),
            (1, 2, 2.0 / 42.0),
            (2, 2, 1.0 / 42.0),
        ],
        DitherAlgorithm::Burkes => &[
            (1, 0, 8.0 / 32.0),
            (2, 0, 4.0 / 32.0),
            (-2, 1, 2.0 / 32.0),
            (-1, 1, 4.0 / 32.0),
            (0, 1, 8.0 / 32.0),
            (1, 1, 4.0 / 32.0),
            (2, 1, 2.0 / 32.0),
        ],
        DitherAlgorithm::Sierra => &[
            (1, 0, 5.0 / 32.0),
            (2, 0, 3.0 / 32.0),
            (-2, 1, 2.0 / 32.0),
            (-1, 1, 4.0 / 32.0),
            (0, 1, 5.0 / 32.0),
            (1, 1, 4.0 / 32.0),
            (2, 1, 2.0 / 32.0),
            (-1, 2, 2.0 / 32.0),
            (0, 2, 3.0 / 32.0),
            (1, 2, 2.0 / 32.0),
        ],
    }
}

/// Three rolling rows of accumulated error, uniform across kernels of
/// depth 1 (Floyd-Steinberg, Burkes) and depth 2 (Stucki, Sierra) — see
/// the design note in spec §9.
struct ErrorRows {
    width: usize,
    rows: [Vec<Rgbf>; 3],
}

impl ErrorRows {
    fn new(width: usize) -> Self {
        Self {
            width,
            rows: [
                vec![(0.0, 0.0, 0.0); width],
                vec![(0.0, 0.0, 0.0); width],
                vec![(0.0, 0.0, 0.0); width],
            ],
        }
    }

    /// Distribute `err * weight` onto `(x + dx, current_row + dy)`.
    /// Out-of-bounds targets are silently dropped (§4.D step 7).
    fn add(&mut self, x: usize, dx: i32, dy: i32, err: Rgbf, weight: f32) {
        let nx = x as i32 + dx;
        if nx < 0 || nx as usize >= self.width || !(0..=2).contains(&dy) {
            return;
        }
        let entry = &mut self.rows[dy as usize][nx as usize];
        entry.0 += err.0 * weight;
        entry.1 += err.1 * weight;
        entry.2 += err.2 * weight;
    }

    fn shift(&mut self) {
        let width = self.width;
        let next0 = std::mem::replace(&mut self.rows[1], vec![(0.0, 0.0, 0.0); width]);
        let next1 = std::mem::replace(&mut self.rows[2], vec![(0.0, 0.0, 0.0); width]);
        self.rows[0] = next0;
        self.rows[1] = next1;
        // self.rows[2] already holds the fresh zero row from the replace above.
    }
}

/// Find the nearest palette color by squared Euclidean distance, ties
/// breaking to the lower index (§8 property 3).
pub fn find_closest_color(palette: &Palette, r: f32, g: f32, b: f32) -> PaletteIndex {
    PALETTE_INDICES
        .iter()
        .copied()
        .min_by_key(|&idx| {
            let c = palette.get(idx);
            let dr = r - c.r as f32;
            let dg = g - c.g as f32;
            let db = b - c.b as f32;
            // Compare as integers via a fixed-point cast to get a total
            // order `min_by_key` can use; squared distance is always
            // non-negative and bounded well under i64 range here.
            (dr * dr + dg * dg + db * db) as i64
        })
        .expect("PALETTE_INDICES is non-empty")
}

/// Dither `img` against the measured palette, writing the corresponding
/// theoretical color for each output pixel (§4.D step 7).
pub async fn dither_image(
    img: &RgbImage,
    measured: Palette,
    theoretical: Palette,
    algorithm: DitherAlgorithm,
) -> RgbImage {
    let (width, height) = img.dimensions();
    let kernel = kernel_for(algorithm);
    let mut errors = ErrorRows::new(width as usize);
    let mut out = RgbImage::new(width, height);
    let mut processed = 0usize;

    for y in 0..height {
        for x in 0..width {
            let xi = x as usize;
            let pixel = img.get_pixel(x, y);
            let err = errors.rows[0][xi];

            let value: Rgbf = (
                pixel[0] as f32 + err.0,
                pixel[1] as f32 + err.1,
                pixel[2] as f32 + err.2,
            );
            let clamped = (
                value.0.clamp(0.0, 255.0),
                value.1.clamp(0.0, 255.0),
                value.2.clamp(0.0, 255.0),
            );

            let chosen = find_closest_color(&measured, clamped.0, clamped.1, clamped.2);
            let measured_color = measured.get(chosen);
            let out_color = theoretical.get(chosen);
            out.put_pixel(x, y, image::Rgb([out_color.r, out_color.g, out_color.b]));

            let new_err: Rgbf = (
                value.0 - measured_color.r as f32,
                value.1 - measured_color.g as f32,
                value.2 - measured_color.b as f32,
            );

            for &(dx, dy, weight) in kernel {
                errors.add(xi, dx, dy, new_err, weight);
            }

            processed += 1;
            if processed % YIELD_EVERY_N_PIXELS == 0 {
                tokio::task::yield_now().await;
            }
        }
        errors.shift();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::palette::{Rgb, THEORETICAL_PALETTE};

    #[test]
    fn closest_color_ties_break_to_lower_index() {
        // Equidistant between Black (idx 0) and White (idx 1) at 127.5;
        // use the exact midpoint so the tie is genuine.
        let palette = THEORETICAL_PALETTE;
        let chosen = find_closest_color(&palette, 127.5, 127.5, 127.5);
        assert_eq!(chosen, PaletteIndex::Black);
    }

    #[test]
    fn closest_color_is_argmin_distance() {
        let palette = THEORETICAL_PALETTE;
        assert_eq!(find_closest_color(&palette, 250.0, 10.0, 5.0), PaletteIndex::Red);
        assert_eq!(find_closest_color(&palette, 5.0, 250.0, 5.0), PaletteIndex::Green);
    }

    #[tokio::test]
    async fn dithered_output_only_contains_theoretical_colors() {
        let img = RgbImage::from_pixel(40, 30, image::Rgb([128, 128, 128]));
        let out = dither_image(
            &img,
            THEORETICAL_PALETTE,
            THEORETICAL_PALETTE,
            DitherAlgorithm::FloydSteinberg,
        )
        .await;

        for pixel in out.pixels() {
            let rgb = Rgb::new(pixel[0], pixel[1], pixel[2]);
            assert!(THEORETICAL_PALETTE.colors.contains(&rgb));
        }
    }

    #[tokio::test]
    async fn first_pixel_matches_naive_closest_color() {
        let img = RgbImage::from_pixel(10, 10, image::Rgb([128, 128, 128]));
        let out = dither_image(
            &img,
            THEORETICAL_PALETTE,
            THEORETICAL_PALETTE,
            DitherAlgorithm::FloydSteinberg,
        )
        .await;

        let expected = find_closest_color(&THEORETICAL_PALETTE, 128.0, 128.0, 128.0);
        let expected_rgb = THEORETICAL_PALETTE.get(expected);
        let first = out.get_pixel(0, 0);
        assert_eq!(*first, image::Rgb([expected_rgb.r, expected_rgb.g, expected_rgb.b]));
    }

    #[tokio::test]
    async fn dither_is_deterministic_across_runs() {
        let img = RgbImage::from_pixel(80, 60, image::Rgb([128, 128, 128]));
        let a = dither_image(&img, THEORETICAL_PALETTE, THEORETICAL_PALETTE, DitherAlgorithm::FloydSteinberg).await;
        let b = dither_image(&img, THEORETICAL_PALETTE, THEORETICAL_PALETTE, DitherAlgorithm::FloydSteinberg).await;
        assert_eq!(a.into_raw(), b.into_raw());
    }
}
