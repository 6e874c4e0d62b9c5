//! Persisted key-value namespace (spec §3 "Ownership", §6).
//!
//! The real device models this as NVS flash with string/int/bool getters;
//! here it collapses onto one JSON document on disk, following the same
//! write-to-temp-then-rename discipline the teacher's `Config::save` uses
//! so a power loss mid-write never corrupts the file. Each higher-level
//! store (palette, processing settings, albums, rotation config) owns one
//! section of the document and is the only thing that mutates it.

pub mod albums;
pub mod palette;
pub mod rotation_config;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::store::palette::PaletteSection;
use crate::store::rotation_config::RotationConfig;
use crate::store::settings::ProcessingSettings;

/// Errors from the underlying persisted namespace.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read store file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse store JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Device identity fields (§6). Connection logic (WiFi, mDNS) is an
/// external collaborator; only the identity fields the core itself reads
/// (for the setup screen and logging) live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub timezone: String,
    /// 0 = landscape, 1 = portrait (§6 `disp_orient`).
    #[serde(default)]
    pub disp_orient: u8,
    #[serde(default)]
    pub disp_rot_deg: i32,
}

fn default_device_name() -> String {
    "ESP32-PhotoFrame".to_string()
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            timezone: String::new(),
            disp_orient: 0,
            disp_rot_deg: 0,
        }
    }
}

/// AI image-generation config (§3 `RotationConfig` AI sub-mode, §6 keys).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiSection {
    #[serde(default)]
    pub openai_key: String,
    #[serde(default)]
    pub google_key: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
}

/// Power/battery-path config (§4.J, §6 `deep_sleep`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSection {
    #[serde(default = "default_true")]
    pub deep_sleep: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PowerSection {
    fn default() -> Self {
        Self { deep_sleep: true }
    }
}

/// RTC-retained wake state (§3 `WakeRecord`), persisted here because this
/// implementation has no retained-RAM facility to lean on (design note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WakeSection {
    /// Zero means "not a scheduled wake."
    #[serde(default)]
    pub expected_wake_unix: i64,
}

/// The whole persisted namespace, one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NvsDocument {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub power: PowerSection,
    #[serde(default)]
    pub palette: PaletteSection,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub wake: WakeSection,
}

/// Handle to the persisted namespace, shared by every store.
pub struct NvsStore {
    path: PathBuf,
    doc: RwLock<NvsDocument>,
}

impl NvsStore {
    /// Open (or create in memory) the namespace backed by `path`.
    ///
    /// Mirrors `Config::load`: a missing or malformed file is not a hard
    /// error at this layer — every section has serde defaults, the same
    /// way NVS returns "not found" for an unset key and callers supply
    /// their own default.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NvsDocument::default(),
            Err(e) => return Err(StoreError::Read(e)),
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Read a consistent snapshot of the whole document.
    pub async fn snapshot(&self) -> NvsDocument {
        self.doc.read().await.clone()
    }

    /// Mutate the document in place, then persist it atomically.
    ///
    /// The closure runs under the write lock so the read-modify-write is
    /// atomic with respect to other in-process callers; §5 notes that
    /// multi-key persistence is not required to be atomic across
    /// concurrent *processes*, which this single-process core never has.
    pub async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut NvsDocument) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.doc.write().await;
        let result = f(&mut guard);
        let content = serde_json::to_string_pretty(&*guard)?;
        drop(guard);
        self.write_atomic(&content).await?;
        Ok(result)
    }

    async fn write_atomic(&self, content: &str) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Read(e));
        }
        Ok(())
    }
}
