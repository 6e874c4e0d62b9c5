//! Decode to RGB888 (spec §4.D step 3).

use image::{DynamicImage, GenericImageView};

use super::format::ImageFormat;
use crate::error::CoreError;

/// Memory ceiling after which decoded/resized buffers are rejected
/// (§4.D failure taxonomy `InvalidSize`, "still larger than the memory
/// ceiling of ~6 MiB").
pub const MEMORY_CEILING_BYTES: usize = 6 * 1024 * 1024;

/// Decode `data` (already sniffed/declared as `format`) to an RGB8 image.
///
/// JPEG sources scaled more than 4x/2x over the display target are
/// downsampled immediately after decode so later stages never hold the
/// full-resolution buffer (the practical effect of the "output-scale
/// hint" §4.D describes — the `image` crate's JPEG decoder has no public
/// partial-IDCT hint, so the saving is realized as an immediate resize
/// rather than a cheaper decode).
pub fn decode_to_rgb8(
    data: &[u8],
    format: ImageFormat,
    display_width: u32,
    display_height: u32,
) -> Result<image::RgbImage, CoreError> {
    let image_format = match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Bmp => image::ImageFormat::Bmp,
    };

    let decoded = image::load_from_memory_with_format(data, image_format)
        .map_err(|e| classify_decode_error(e))?;

    let rgb = match format {
        ImageFormat::Jpeg => downscale_if_oversized(decoded, display_width, display_height),
        // PNG/BMP: strip 16-bit, alpha, expand, palette->RGB all happen
        // inside `to_rgb8`.
        _ => decoded,
    };

    let (w, h) = rgb.dimensions();
    let rgb8 = rgb.into_rgb8();

    let estimated_bytes = w as usize * h as usize * 3;
    if estimated_bytes > MEMORY_CEILING_BYTES {
        return Err(CoreError::InvalidSize(format!(
            "decoded image {w}x{h} ({estimated_bytes} bytes) exceeds the {MEMORY_CEILING_BYTES} byte ceiling"
        )));
    }

    Ok(rgb8)
}

fn classify_decode_error(e: image::ImageError) -> CoreError {
    match e {
        image::ImageError::Limits(_) => CoreError::OutOfMemory(e.to_string()),
        other => CoreError::DecodeError(other.to_string()),
    }
}

/// Request 1/4 scale when source exceeds 4x the display in either axis,
/// 1/2 scale when it exceeds 2x, else leave untouched (§4.D step 3).
fn downscale_if_oversized(img: DynamicImage, display_width: u32, display_height: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let ratio_w = w as f64 / display_width as f64;
    let ratio_h = h as f64 / display_height as f64;
    let max_ratio = ratio_w.max(ratio_h);

    let divisor = if max_ratio > 4.0 {
        4
    } else if max_ratio > 2.0 {
        2
    } else {
        1
    };

    if divisor == 1 {
        return img;
    }

    img.resize(
        (w / divisor).max(1),
        (h / divisor).max(1),
        image::imageops::FilterType::Triangle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_small_images_untouched() {
        let img = DynamicImage::new_rgb8(900, 600);
        let out = downscale_if_oversized(img, 800, 480);
        assert_eq!(out.dimensions(), (900, 600));
    }

    #[test]
    fn requests_half_scale_past_2x() {
        let img = DynamicImage::new_rgb8(1700, 1000);
        let out = downscale_if_oversized(img, 800, 480);
        assert_eq!(out.dimensions(), (850, 500));
    }

    #[test]
    fn requests_quarter_scale_past_4x() {
        let img = DynamicImage::new_rgb8(3300, 2000);
        let out = downscale_if_oversized(img, 800, 480);
        assert_eq!(out.dimensions(), (825, 500));
    }
}
