//! The image pipeline: decode, fit, tone-compress, dither, encode
//! (spec §4.D).

mod decode;
pub(crate) mod dither;
mod encode;
mod fit;
mod format;
mod tone;

pub use format::ImageFormat;

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

use crate::error::CoreError;
use crate::store::palette::{PaletteIndex, PaletteStore, PaletteWatch, THEORETICAL_PALETTE};
use crate::store::settings::SettingsStore;

/// Pipeline input: either bytes with an optional pre-declared format, or
/// a path to read and sniff.
pub enum PipelineInput {
    Bytes {
        data: Vec<u8>,
        declared_format: Option<ImageFormat>,
    },
    File(PathBuf),
}

/// Where the finished frame should land (§4.D: "Outputs: either a file
/// ... or an RGB888 buffer").
pub enum PipelineDestination {
    File(PathBuf),
    Rgb,
}

/// The produced frame.
pub enum PipelineOutput {
    File(PathBuf),
    Rgb(Vec<u8>),
}

pub struct ImagePipeline {
    palette_rx: PaletteWatch,
    settings_store: Arc<SettingsStore>,
    display_width: u32,
    display_height: u32,
}

impl ImagePipeline {
    pub fn new(
        palette_store: Arc<PaletteStore>,
        settings_store: Arc<SettingsStore>,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        Self {
            palette_rx: palette_store.subscribe(),
            settings_store,
            display_width,
            display_height,
        }
    }

    pub async fn process(
        &self,
        input: PipelineInput,
        destination: PipelineDestination,
    ) -> Result<PipelineOutput, CoreError> {
        let (data, declared_format) = match input {
            PipelineInput::Bytes { data, declared_format } => (data, declared_format),
            PipelineInput::File(path) => {
                let data = tokio::fs::read(&path).await?;
                (data, None)
            }
        };

        let fmt = match declared_format {
            Some(f) => f,
            None => format::sniff(&data)?,
        };

        let theoretical = THEORETICAL_PALETTE;
        let measured = *self.palette_rx.borrow();
        let settings = self.settings_store.load().await;

        let decoded = decode::decode_to_rgb8(&data, fmt, self.display_width, self.display_height)?;

        // Step 2: already-processed fast path. Only reachable for PNG,
        // and only when the decoded buffer already matches the display
        // exactly and uses only theoretical colors.
        let already_processed = matches!(fmt, ImageFormat::Png)
            && encode::is_already_processed(&decoded, self.display_width, self.display_height, &theoretical);

        let final_img: RgbImage = if already_processed {
            decoded
        } else {
            let mut fitted = fit::fit_and_orient(&decoded, self.display_width, self.display_height);

            let black = measured.get(PaletteIndex::Black);
            let white = measured.get(PaletteIndex::White);
            if settings.compress_dynamic_range && tone::should_compress(black, white) {
                tone::compress_dynamic_range(&mut fitted, black, white).await;
            }

            dither::dither_image(&fitted, measured, theoretical, settings.dither_algorithm).await
        };

        match destination {
            PipelineDestination::Rgb => Ok(PipelineOutput::Rgb(final_img.into_raw())),
            PipelineDestination::File(path) => {
                let bytes = if already_processed {
                    data
                } else {
                    encode::encode_png(&final_img)?
                };
                tokio::fs::write(&path, &bytes).await?;
                Ok(PipelineOutput::File(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NvsStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "photoframe-pipeline-test-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn test_pipeline(width: u32, height: u32) -> ImagePipeline {
        let dir = tempdir();
        let nvs = Arc::new(NvsStore::open(dir.join("nvs.json")).await.unwrap());
        let palette_store = Arc::new(PaletteStore::new(Arc::clone(&nvs)).await);
        let settings_store = Arc::new(SettingsStore::new(nvs));
        ImagePipeline::new(palette_store, settings_store, width, height)
    }

    #[tokio::test]
    async fn processes_a_plain_jpeg_into_an_rgb_buffer_of_exact_size() {
        let pipeline = test_pipeline(80, 48).await;

        let mut buf = Vec::new();
        let img = RgbImage::from_pixel(160, 120, image::Rgb([120, 130, 140]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();

        let out = pipeline
            .process(
                PipelineInput::Bytes {
                    data: buf,
                    declared_format: Some(ImageFormat::Jpeg),
                },
                PipelineDestination::Rgb,
            )
            .await
            .unwrap();

        match out {
            PipelineOutput::Rgb(bytes) => assert_eq!(bytes.len(), 80 * 48 * 3),
            PipelineOutput::File(_) => panic!("expected Rgb output"),
        }
    }

    #[tokio::test]
    async fn already_processed_png_round_trips_unchanged_bytes() {
        let pipeline = test_pipeline(4, 4).await;

        let img = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        let bytes = encode::encode_png(&img).unwrap();

        let dir = tempdir();
        let out_path = dir.join("out.png");
        let out = pipeline
            .process(
                PipelineInput::Bytes {
                    data: bytes.clone(),
                    declared_format: Some(ImageFormat::Png),
                },
                PipelineDestination::File(out_path.clone()),
            )
            .await
            .unwrap();

        match out {
            PipelineOutput::File(path) => {
                let written = std::fs::read(path).unwrap();
                assert_eq!(written, bytes);
            }
            PipelineOutput::Rgb(_) => panic!("expected File output"),
        }
    }

    #[tokio::test]
    async fn unsupported_bytes_fail_before_touching_the_filesystem() {
        let pipeline = test_pipeline(80, 48).await;
        let err = pipeline
            .process(
                PipelineInput::Bytes {
                    data: vec![0, 1, 2, 3],
                    declared_format: None,
                },
                PipelineDestination::Rgb,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFormat(_)));
    }
}
