//! Cover-fit resize and 90° orientation rotation (spec §4.D steps 4-5).

use image::{GenericImageView, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Portrait,
    Landscape,
}

fn orientation_of(width: u32, height: u32) -> Orientation {
    if height > width {
        Orientation::Portrait
    } else {
        Orientation::Landscape
    }
}

/// Fit `src` to exactly `display_width` x `display_height`, rotating 90°
/// clockwise first when the source and display orientations differ so
/// the final result fills the display exactly (§4.D steps 4-5, and the
/// open question in §9: resize order is unconditional on the rotated
/// target, no conditional fallback).
pub fn fit_and_orient(src: &RgbImage, display_width: u32, display_height: u32) -> RgbImage {
    let (src_w, src_h) = src.dimensions();
    let src_orientation = orientation_of(src_w, src_h);
    let display_orientation = orientation_of(display_width, display_height);

    if src_orientation != display_orientation {
        // Target the rotated dimensions first so step 5's 90° turn lands
        // exactly on display_width x display_height.
        let cover = cover_fit(src, display_height, display_width);
        rotate90_clockwise(&cover)
    } else {
        cover_fit(src, display_width, display_height)
    }
}

/// Scale so the image covers the target rectangle, then center-crop.
/// Nearest-neighbor resampling by design (§4.D step 4: source is
/// photographic, speed and memory dominate quality here).
fn cover_fit(src: &RgbImage, target_width: u32, target_height: u32) -> RgbImage {
    let (src_w, src_h) = src.dimensions();
    let scale = (target_width as f64 / src_w as f64).max(target_height as f64 / src_h as f64);

    let scaled_w = ((src_w as f64) * scale).round().max(1.0) as u32;
    let scaled_h = ((src_h as f64) * scale).round().max(1.0) as u32;

    let resized = image::imageops::resize(src, scaled_w, scaled_h, image::imageops::FilterType::Nearest);

    let crop_x = scaled_w.saturating_sub(target_width) / 2;
    let crop_y = scaled_h.saturating_sub(target_height) / 2;

    image::imageops::crop_imm(&resized, crop_x, crop_y, target_width, target_height).to_image()
}

/// Rotate 90° clockwise: `(x, y) -> (height - 1 - y, x)`, width/height
/// swapped (§4.D step 5, spelled out explicitly rather than delegated to
/// a library rotation so the mapping matches the spec literally).
fn rotate90_clockwise(src: &RgbImage) -> RgbImage {
    let (width, height) = src.dimensions();
    let mut out = RgbImage::new(height, width);

    for y in 0..height {
        for x in 0..width {
            let pixel = *src.get_pixel(x, y);
            out.put_pixel(height - 1 - y, x, pixel);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn same_orientation_skips_rotation() {
        let src = RgbImage::from_pixel(1600, 900, Rgb([10, 20, 30]));
        let out = fit_and_orient(&src, 800, 480);
        assert_eq!(out.dimensions(), (800, 480));
    }

    #[test]
    fn differing_orientation_rotates_to_exact_display_size() {
        // Portrait source, landscape display.
        let src = RgbImage::from_pixel(600, 1200, Rgb([1, 2, 3]));
        let out = fit_and_orient(&src, 800, 480);
        assert_eq!(out.dimensions(), (800, 480));
    }

    #[test]
    fn rotate90_clockwise_maps_corners_correctly() {
        let mut src = RgbImage::new(3, 2); // width=3, height=2
        src.put_pixel(0, 0, Rgb([1, 0, 0])); // top-left
        src.put_pixel(2, 0, Rgb([2, 0, 0])); // top-right
        src.put_pixel(0, 1, Rgb([3, 0, 0])); // bottom-left

        let out = rotate90_clockwise(&src);
        assert_eq!(out.dimensions(), (2, 3));
        // top-left of src ends up at (height-1-0, 0) = (1, 0)
        assert_eq!(*out.get_pixel(1, 0), Rgb([1, 0, 0]));
        // top-right of src ends up at (height-1-0, 2) = (1, 2)
        assert_eq!(*out.get_pixel(1, 2), Rgb([2, 0, 0]));
        // bottom-left of src ends up at (height-1-1, 0) = (0, 0)
        assert_eq!(*out.get_pixel(0, 0), Rgb([3, 0, 0]));
    }
}
