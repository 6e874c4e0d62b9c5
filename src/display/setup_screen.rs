//! The purple-checkerboard setup screen (spec §4.E `show_setup_screen`).
//!
//! Grounded on the same idea as `ozwaldorf-sawthat-frame`'s
//! `text.rs` — render device-identifying text onto the frame before the
//! first real image exists — but without pulling in `ab_glyph` and an
//! embedded font binary, since there's no font asset this crate can
//! safely ship. A small fixed-width bitmap font covers the fixed set of
//! characters the title and instructions need.

use image::{Rgb, RgbImage};

const TITLE: &str = "ESP32-PHOTOFRAME";
const INSTRUCTIONS: &[&str] = &[
    "CONNECT TO WIFI TO FINISH SETUP",
    "HOLD BOOT TO RESET",
];

const PURPLE: Rgb<u8> = Rgb([120, 40, 140]);
const CHECKER_CELL: u32 = 40;

/// 5x7 bitmap glyphs for the characters the title/instructions use.
/// Each row is a 5-bit mask, MSB-first, read top to bottom.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01111, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b01111],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01111, 0b10000, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00001, 0b00001, 0b00001, 0b00001, 0b10001, 0b10001, 0b01110],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        ' ' => [0; 7],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

/// Draw `text` with each glyph cell `scale`x`scale` pixels, centered
/// horizontally at `top`.
fn draw_text_centered(img: &mut RgbImage, text: &str, top: u32, scale: u32, color: Rgb<u8>) {
    let glyph_width = 5 * scale;
    let spacing = scale;
    let total_width = text.chars().count() as u32 * (glyph_width + spacing);
    let mut x = (img.width().saturating_sub(total_width)) / 2;

    for c in text.chars() {
        let rows = glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5u32 {
                if bits & (1 << (4 - col)) != 0 {
                    let px = x + col * scale;
                    let py = top + row as u32 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            if px + dx < img.width() && py + dy < img.height() {
                                img.put_pixel(px + dx, py + dy, color);
                            }
                        }
                    }
                }
            }
        }
        x += glyph_width + spacing;
    }
}

/// Auto-choose the largest glyph scale that fits `text` within
/// `max_width` (spec: "font scale is auto-chosen to fit").
fn fit_scale(text: &str, max_width: u32) -> u32 {
    let chars = text.chars().count().max(1) as u32;
    for scale in (1..=12).rev() {
        let width = chars * (5 * scale + scale);
        if width <= max_width {
            return scale;
        }
    }
    1
}

/// Paint the purple checkerboard background with the centered title and
/// instruction lines (spec §4.E).
pub fn render(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let dark = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0;
            let color = if dark {
                PURPLE
            } else {
                Rgb([
                    (PURPLE[0] as u32 * 3 / 4) as u8,
                    (PURPLE[1] as u32 * 3 / 4) as u8,
                    (PURPLE[2] as u32 * 3 / 4) as u8,
                ])
            };
            img.put_pixel(x, y, color);
        }
    }

    let margin = width / 10;
    let usable = width.saturating_sub(margin * 2).max(1);

    let title_scale = fit_scale(TITLE, usable);
    let title_top = height / 4;
    draw_text_centered(&mut img, TITLE, title_top, title_scale, Rgb([255, 255, 255]));

    let mut line_top = title_top + (7 * title_scale) + title_scale * 3;
    for line in INSTRUCTIONS {
        let scale = fit_scale(line, usable).min(title_scale.max(1) / 2 + 1).max(1);
        draw_text_centered(&mut img, line, line_top, scale, Rgb([255, 255, 255]));
        line_top += 7 * scale + scale * 2;
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_at_requested_dimensions() {
        let img = render(800, 480);
        assert_eq!(img.dimensions(), (800, 480));
    }

    #[test]
    fn fit_scale_shrinks_for_narrow_targets() {
        assert!(fit_scale(TITLE, 100) < fit_scale(TITLE, 2000));
    }

    #[test]
    fn checkerboard_background_uses_only_two_shades() {
        let img = render(160, 160);
        let mut shades = std::collections::HashSet::new();
        for p in img.pixels() {
            shades.insert((p[0], p[1], p[2]));
        }
        // Background shades plus white text pixels.
        assert!(shades.len() <= 3);
    }
}
