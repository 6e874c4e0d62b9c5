//! Processing Settings Store (spec §4.B).
//!
//! Persists the dither algorithm choice and a grab-bag of tunables the UI
//! exposes. Only `dither_algorithm` and `compress_dynamic_range` are
//! consumed by the pipeline in this spec; the rest round-trip verbatim.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::NvsStore;

/// Error-diffusion kernel choice (§3, §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherAlgorithm {
    FloydSteinberg,
    Stucki,
    Burkes,
    Sierra,
}

impl Default for DitherAlgorithm {
    fn default() -> Self {
        DitherAlgorithm::FloydSteinberg
    }
}

impl DitherAlgorithm {
    /// Parse the stable `ditherAlgorithm` JSON field, falling back to
    /// Floyd-Steinberg for any unrecognized value (§4.B).
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stucki" => DitherAlgorithm::Stucki,
            "burkes" => DitherAlgorithm::Burkes,
            "sierra" => DitherAlgorithm::Sierra,
            _ => DitherAlgorithm::FloydSteinberg,
        }
    }
}

/// Hand-written instead of derived so an unrecognized persisted value
/// falls back to Floyd-Steinberg (§4.B) rather than failing the whole
/// document's deserialization.
impl<'de> Deserialize<'de> for DitherAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(DitherAlgorithm::parse(&raw))
    }
}

/// Tone mode for dynamic-range compression (§3 `ProcessingSettings`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToneMode {
    Linear,
    Perceptual,
}

impl Default for ToneMode {
    fn default() -> Self {
        ToneMode::Perceptual
    }
}

/// Color-matching method, persisted verbatim for the UI (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMethod {
    Euclidean,
    WeightedEuclidean,
}

impl Default for ColorMethod {
    fn default() -> Self {
        ColorMethod::Euclidean
    }
}

/// Processing tunables. Only `dither_algorithm` and
/// `compress_dynamic_range` feed the pipeline; everything else is
/// opaque storage for the (out-of-scope) UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    #[serde(default)]
    pub dither_algorithm: DitherAlgorithm,
    #[serde(default = "default_exposure")]
    pub exposure: f32,
    #[serde(default = "default_unity")]
    pub saturation: f32,
    #[serde(default)]
    pub tone_mode: ToneMode,
    #[serde(default = "default_unity")]
    pub contrast: f32,
    #[serde(default = "default_unity")]
    pub strength: f32,
    #[serde(default)]
    pub shadow_boost: f32,
    #[serde(default)]
    pub highlight_compress: f32,
    #[serde(default = "default_midpoint")]
    pub midpoint: f32,
    #[serde(default)]
    pub color_method: ColorMethod,
    #[serde(default = "default_true")]
    pub compress_dynamic_range: bool,
}

fn default_exposure() -> f32 {
    0.0
}
fn default_unity() -> f32 {
    1.0
}
fn default_midpoint() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            dither_algorithm: DitherAlgorithm::default(),
            exposure: default_exposure(),
            saturation: default_unity(),
            tone_mode: ToneMode::default(),
            contrast: default_unity(),
            strength: default_unity(),
            shadow_boost: 0.0,
            highlight_compress: 0.0,
            midpoint: default_midpoint(),
            color_method: ColorMethod::default(),
            compress_dynamic_range: true,
        }
    }
}

/// The processing settings store.
pub struct SettingsStore {
    nvs: Arc<NvsStore>,
}

impl SettingsStore {
    pub fn new(nvs: Arc<NvsStore>) -> Self {
        Self { nvs }
    }

    pub fn defaults(&self) -> ProcessingSettings {
        ProcessingSettings::default()
    }

    pub async fn load(&self) -> ProcessingSettings {
        self.nvs.snapshot().await.processing
    }

    pub async fn save(&self, settings: ProcessingSettings) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.processing = settings;
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_dither_value_falls_back_to_floyd_steinberg() {
        assert_eq!(DitherAlgorithm::parse("garbage"), DitherAlgorithm::FloydSteinberg);
        assert_eq!(DitherAlgorithm::parse("stucki"), DitherAlgorithm::Stucki);
    }

    #[tokio::test]
    async fn round_trips_settings() {
        let dir = std::env::temp_dir().join(format!("photoframe-settings-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let nvs = Arc::new(crate::store::NvsStore::open(dir.join("nvs.json")).await.unwrap());
        let store = SettingsStore::new(nvs);

        let mut custom = ProcessingSettings::default();
        custom.dither_algorithm = DitherAlgorithm::Sierra;
        custom.exposure = 0.3;
        store.save(custom).await.unwrap();

        assert_eq!(store.load().await, custom);
    }
}
