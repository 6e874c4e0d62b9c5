//! Display gate: the single writer around the panel, the current-image
//! pointer file, and the calibration/setup screens (spec §4.E).

pub mod panel;
mod setup_screen;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use crate::error::CoreError;
use crate::store::palette::Palette;
use panel::Panel;

const MUTEX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Guards the panel, frame buffer, and current-image pointer file
/// (spec §3 "Ownership": "The Display gate exclusively owns the panel,
/// frame buffer, and current-image pointer").
pub struct DisplayGate {
    panel: Arc<dyn Panel>,
    mutex: tokio::sync::Mutex<()>,
    pointer_path: PathBuf,
    width: u32,
    height: u32,
}

impl DisplayGate {
    pub fn new(panel: Arc<dyn Panel>, pointer_path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            panel,
            mutex: tokio::sync::Mutex::new(()),
            pointer_path,
            width,
            height,
        }
    }

    /// Read `path` (dispatched by extension), push it, and atomically
    /// rewrite the current-image pointer on success (spec §4.E, §5
    /// ordering guarantee 2).
    pub async fn show(&self, path: &Path, theoretical: &Palette) -> Result<(), CoreError> {
        let _guard = self.acquire().await?;

        let data = tokio::fs::read(path).await?;
        let img = self.decode_for_panel(path, &data)?;
        self.push(&img, theoretical).await?;
        self.write_pointer(path).await?;
        Ok(())
    }

    /// Same as `show`, bypassing file I/O — for platforms with no SD
    /// card (spec §4.E).
    pub async fn show_rgb(&self, buf: &[u8], width: u32, height: u32, theoretical: &Palette) -> Result<(), CoreError> {
        if width != self.width || height != self.height {
            return Err(CoreError::InvalidSize(format!(
                "show_rgb buffer is {width}x{height}, display is {}x{}",
                self.width, self.height
            )));
        }
        let expected = width as usize * height as usize * 3;
        if buf.len() != expected {
            return Err(CoreError::InvalidSize(format!(
                "show_rgb buffer has {} bytes, expected {expected}",
                buf.len()
            )));
        }
        let img = RgbImage::from_raw(width, height, buf.to_vec())
            .ok_or_else(|| CoreError::InvalidSize("show_rgb buffer dimensions do not fit the given bytes".into()))?;

        let _guard = self.acquire().await?;
        self.push(&img, theoretical).await?;
        // show_rgb has no on-disk source path; the pointer is left
        // untouched, matching the "no current image" read behavior for
        // a purely in-memory push.
        Ok(())
    }

    /// Push a white frame and remove the current-image pointer.
    pub async fn clear(&self, theoretical: &Palette) -> Result<(), CoreError> {
        let _guard = self.acquire().await?;
        let white = theoretical.get(crate::store::palette::PaletteIndex::White);
        let img = RgbImage::from_pixel(self.width, self.height, image::Rgb([white.r, white.g, white.b]));
        self.push(&img, theoretical).await?;
        self.remove_pointer().await;
        Ok(())
    }

    /// Draw the built-in calibration pattern and push it (spec §4.E).
    pub async fn show_calibration(&self, theoretical: &Palette) -> Result<(), CoreError> {
        let _guard = self.acquire().await?;
        let img = panel::calibration_pattern(theoretical, self.width, self.height);
        self.push(&img, theoretical).await
    }

    /// Draw the purple checkerboard setup screen and push it (spec
    /// §4.E).
    pub async fn show_setup_screen(&self, theoretical: &Palette) -> Result<(), CoreError> {
        let _guard = self.acquire().await?;
        let img = setup_screen::render(self.width, self.height);
        self.push(&img, theoretical).await
    }

    /// Non-blocking try-acquire. §9 design note: TOCTOU-prone, never
    /// use this result to decide whether `show()` will succeed.
    pub fn is_busy(&self) -> bool {
        self.mutex.try_lock().is_err()
    }

    async fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, CoreError> {
        match tokio::time::timeout(MUTEX_ACQUIRE_TIMEOUT, self.mutex.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_elapsed) => Err(CoreError::Busy),
        }
    }

    async fn push(&self, img: &RgbImage, theoretical: &Palette) -> Result<(), CoreError> {
        let buffer = panel::pack_frame(img, theoretical);
        let panel = Arc::clone(&self.panel);
        tokio::task::spawn_blocking(move || panel.push_frame(&buffer))
            .await
            .map_err(|e| CoreError::InvalidState(format!("panel task panicked: {e}")))??;
        Ok(())
    }

    fn decode_for_panel(&self, path: &Path, data: &[u8]) -> Result<RgbImage, CoreError> {
        let is_bmp = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("bmp"))
            .unwrap_or(false);
        let format = if is_bmp { image::ImageFormat::Bmp } else { image::ImageFormat::Png };
        image::load_from_memory_with_format(data, format)
            .map(|d| d.into_rgb8())
            .map_err(|e| CoreError::DecodeError(e.to_string()))
    }

    async fn write_pointer(&self, path: &Path) -> Result<(), CoreError> {
        let tmp = self.pointer_path.with_extension("lnk.tmp");
        tokio::fs::write(&tmp, path.to_string_lossy().as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.pointer_path).await?;
        Ok(())
    }

    async fn remove_pointer(&self) {
        let _ = tokio::fs::remove_file(&self.pointer_path).await;
    }

    /// Current-image pointer contents, or `None` when absent (spec §3
    /// `CurrentImagePointer`: "Reading yields 'no current image' when
    /// absent").
    pub async fn current_image(&self) -> Option<PathBuf> {
        tokio::fs::read_to_string(&self.pointer_path)
            .await
            .ok()
            .map(|s| PathBuf::from(s.trim()))
    }
}
