//! PNG output encoding and the already-processed fast path (spec §4.D
//! steps 2 and 8).

use std::io::Cursor;

use image::RgbImage;
use png::{BitDepth, ColorType, Encoder};

use crate::error::CoreError;
use crate::store::palette::Palette;

/// True when `img` already matches the display's exact dimensions and
/// every pixel is one of the six theoretical colors — the case where a
/// previously processed frame is re-submitted and steps 3 through 7 can
/// be skipped outright (§4.D step 2).
pub fn is_already_processed(
    img: &RgbImage,
    display_width: u32,
    display_height: u32,
    theoretical: &Palette,
) -> bool {
    if img.dimensions() != (display_width, display_height) {
        return false;
    }
    img.pixels().all(|p| {
        theoretical
            .colors
            .iter()
            .any(|c| c.r == p[0] && c.g == p[1] && c.b == p[2])
    })
}

/// Encode `img` as an 8-bit RGB, non-interlaced PNG (§4.D step 8).
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, CoreError> {
    let (width, height) = img.dimensions();
    let mut buf = Vec::new();
    {
        let mut encoder = Encoder::new(Cursor::new(&mut buf), width, height);
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| CoreError::EncodeError(e.to_string()))?;
        writer
            .write_image_data(img.as_raw())
            .map_err(|e| CoreError::EncodeError(e.to_string()))?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::palette::THEORETICAL_PALETTE;

    #[test]
    fn already_processed_requires_exact_dims_and_palette_colors() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        assert!(is_already_processed(&img, 4, 4, &THEORETICAL_PALETTE));
        assert!(!is_already_processed(&img, 8, 8, &THEORETICAL_PALETTE));

        let mut mixed = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        mixed.put_pixel(0, 0, image::Rgb([17, 18, 19]));
        assert!(!is_already_processed(&mixed, 4, 4, &THEORETICAL_PALETTE));
    }

    #[test]
    fn encodes_and_decodes_back_to_the_same_pixels() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        img.put_pixel(2, 1, image::Rgb([0, 0, 255]));

        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().into_rgb8();
        assert_eq!(decoded, img);
    }
}
