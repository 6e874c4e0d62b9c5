//! Palette & Calibration Store (spec §4.A).
//!
//! Holds the theoretical (output) and measured (error-diffusion
//! reference) 6-color palettes. The theoretical palette is a compile-time
//! constant; the measured palette is user-calibrated and persisted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use super::NvsStore;

/// One palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Index into a `Palette`, fixed positions per spec §3 (index 4/"Reserved"
/// is intentionally absent here — see SPEC_FULL.md's supplementary note:
/// the hardware's reserved slot is reconstructed only at the panel-buffer
/// packing boundary, never consulted by pipeline code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PaletteIndex {
    Black = 0,
    White = 1,
    Yellow = 2,
    Red = 3,
    Blue = 4,
    Green = 5,
}

pub const PALETTE_INDICES: [PaletteIndex; 6] = [
    PaletteIndex::Black,
    PaletteIndex::White,
    PaletteIndex::Yellow,
    PaletteIndex::Red,
    PaletteIndex::Blue,
    PaletteIndex::Green,
];

/// Six RGB entries, one per `PaletteIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: [Rgb; 6],
}

impl Palette {
    pub fn get(&self, idx: PaletteIndex) -> Rgb {
        self.colors[idx as usize]
    }
}

/// The canonical output palette (§3): pixels written to the output buffer
/// or PNG always come from here, so re-ingestion of a processed PNG is
/// idempotent regardless of calibration.
pub const THEORETICAL_PALETTE: Palette = Palette {
    colors: [
        Rgb::new(0, 0, 0),
        Rgb::new(255, 255, 255),
        Rgb::new(255, 255, 0),
        Rgb::new(255, 0, 0),
        Rgb::new(0, 0, 255),
        Rgb::new(0, 255, 0),
    ],
};

/// Factory-default measured palette, used until the user calibrates.
/// Matches the theoretical palette until real panel measurements exist.
pub const DEFAULT_MEASURED_PALETTE: Palette = THEORETICAL_PALETTE;

/// On-disk representation of the measured palette (§6: "one binary blob
/// of 18 bytes, 6 colors x 3 channels" — represented here as a typed
/// array rather than a raw blob, since this implementation's NVS facade
/// is JSON, not flash pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSection {
    pub measured: [Rgb; 6],
}

impl Default for PaletteSection {
    fn default() -> Self {
        Self {
            measured: DEFAULT_MEASURED_PALETTE.colors,
        }
    }
}

/// Notifies the image pipeline that the measured palette changed, so it
/// can refresh its cached copy before the next frame (§4.A
/// `reload_into_pipeline`).
pub type PaletteWatch = watch::Receiver<Palette>;

/// The palette & calibration store.
pub struct PaletteStore {
    nvs: Arc<NvsStore>,
    tx: watch::Sender<Palette>,
}

impl PaletteStore {
    pub async fn new(nvs: Arc<NvsStore>) -> Self {
        let initial = nvs.snapshot().await.palette.measured;
        let (tx, _rx) = watch::channel(Palette { colors: initial });
        Self { nvs, tx }
    }

    /// Theoretical palette; a pure constant, never persisted.
    pub fn defaults(&self) -> Palette {
        THEORETICAL_PALETTE
    }

    /// Load the measured palette, falling back to defaults if the
    /// persisted blob is missing or malformed (§4.A).
    pub async fn load(&self) -> Palette {
        let doc = self.nvs.snapshot().await;
        Palette {
            colors: doc.palette.measured,
        }
    }

    /// Persist a new measured palette and notify subscribers
    /// (`reload_into_pipeline`).
    pub async fn save(&self, palette: Palette) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.palette.measured = palette.colors;
            })
            .await?;
        let _ = self.tx.send(palette);
        Ok(())
    }

    /// Subscribe to palette updates (consumed by the image pipeline).
    pub fn subscribe(&self) -> PaletteWatch {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_measured_palette() {
        let dir = tempdir();
        let nvs = Arc::new(NvsStore::open(dir.join("nvs.json")).await.unwrap());
        let store = PaletteStore::new(Arc::clone(&nvs)).await;

        let custom = Palette {
            colors: [
                Rgb::new(1, 2, 3),
                Rgb::new(250, 250, 250),
                Rgb::new(200, 190, 0),
                Rgb::new(150, 10, 5),
                Rgb::new(10, 40, 160),
                Rgb::new(30, 110, 60),
            ],
        };
        store.save(custom).await.unwrap();
        assert_eq!(store.load().await, custom);
    }

    #[tokio::test]
    async fn missing_store_falls_back_to_defaults() {
        let dir = tempdir();
        let nvs = Arc::new(NvsStore::open(dir.join("missing.json")).await.unwrap());
        let store = PaletteStore::new(nvs).await;
        assert_eq!(store.load().await, DEFAULT_MEASURED_PALETTE);
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "photoframe-test-{}-{}",
            std::process::id(),
            PALETTE_TEST_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    static PALETTE_TEST_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
}
