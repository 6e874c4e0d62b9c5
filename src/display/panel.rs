//! The e-paper panel itself is an external collaborator (spec §1: "The
//! e-paper panel driver, modeled as a `Display::push_frame(buf)` that
//! blocks ~30 s"). `Panel` is that abstract boundary; `SimulatedPanel`
//! is the stand-in this crate ships so the gate above it has something
//! real to drive. A production build swaps in a real SPI/GPIO driver
//! behind the same trait — out of scope here.

use std::time::Duration;

use image::RgbImage;

use crate::error::CoreError;
use crate::pipeline::dither::find_closest_color;
use crate::store::palette::{Palette, PaletteIndex, PALETTE_INDICES};

/// Default panel dimensions (spec §1: "800×480").
pub const DISPLAY_WIDTH: u32 = 800;
pub const DISPLAY_HEIGHT: u32 = 480;

/// Hardware packs 7 color slots at 4 bits/pixel, 2 pixels per byte;
/// index 4 ("Orange", per the Waveshare EPD7IN3E command set) is never
/// produced by this pipeline but still occupies a slot in the packed
/// buffer, so the mapping below reconstructs it (spec §3: "index 4
/// Reserved (unused)").
fn hardware_nibble(idx: PaletteIndex) -> u8 {
    match idx {
        PaletteIndex::Black => 0,
        PaletteIndex::White => 1,
        PaletteIndex::Yellow => 2,
        PaletteIndex::Red => 3,
        PaletteIndex::Blue => 5,
        PaletteIndex::Green => 6,
    }
}

fn buffer_size(width: u32, height: u32) -> usize {
    (width as usize * height as usize).div_ceil(2)
}

/// Pack an RGB image whose pixels are exactly the theoretical palette
/// colors into the panel's 4-bit/pixel wire format.
pub fn pack_frame(img: &RgbImage, theoretical: &Palette) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let mut buf = vec![0u8; buffer_size(width, height)];

    for (i, pixel) in img.pixels().enumerate() {
        let idx = PALETTE_INDICES
            .iter()
            .copied()
            .find(|&p| {
                let c = theoretical.get(p);
                c.r == pixel[0] && c.g == pixel[1] && c.b == pixel[2]
            })
            // Defensive fallback: a caller handed us a buffer that
            // wasn't dithered yet. Quantize against the theoretical
            // palette itself rather than panic.
            .unwrap_or_else(|| find_closest_color(theoretical, pixel[0] as f32, pixel[1] as f32, pixel[2] as f32));

        let nibble = hardware_nibble(idx);
        let byte_idx = i / 2;
        if i % 2 == 0 {
            buf[byte_idx] = nibble << 4;
        } else {
            buf[byte_idx] |= nibble;
        }
    }

    buf
}

/// Solid-color stripes, one per palette index, filling the display
/// (spec §4.E `show_calibration`).
pub fn calibration_pattern(theoretical: &Palette, width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    let stripe_height = (height / PALETTE_INDICES.len() as u32).max(1);

    for y in 0..height {
        let stripe = (y / stripe_height).min(PALETTE_INDICES.len() as u32 - 1) as usize;
        let color = theoretical.get(PALETTE_INDICES[stripe]);
        for x in 0..width {
            img.put_pixel(x, y, image::Rgb([color.r, color.g, color.b]));
        }
    }
    img
}

/// The panel boundary: push a packed frame to hardware. Blocks the
/// calling thread for the duration of the physical refresh.
pub trait Panel: Send + Sync {
    fn push_frame(&self, buffer: &[u8]) -> Result<(), CoreError>;
}

/// Stand-in for real hardware: validates buffer size and sleeps for the
/// duration a real e-paper refresh takes (spec: "blocks ~30 s").
pub struct SimulatedPanel {
    width: u32,
    height: u32,
    refresh_delay: Duration,
}

impl SimulatedPanel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            refresh_delay: Duration::from_secs(30),
        }
    }

    #[cfg(test)]
    pub fn with_delay(width: u32, height: u32, refresh_delay: Duration) -> Self {
        Self {
            width,
            height,
            refresh_delay,
        }
    }
}

impl Panel for SimulatedPanel {
    fn push_frame(&self, buffer: &[u8]) -> Result<(), CoreError> {
        let expected = buffer_size(self.width, self.height);
        if buffer.len() != expected {
            return Err(CoreError::InvalidSize(format!(
                "panel buffer {} bytes, expected {expected} for {}x{}",
                buffer.len(),
                self.width,
                self.height
            )));
        }
        tracing::info!(bytes = buffer.len(), "pushing frame to panel");
        std::thread::sleep(self.refresh_delay);
        tracing::info!("panel refresh complete");
        Ok(())
    }
}
