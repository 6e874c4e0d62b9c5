//! `RotationConfig` data model (spec §3, §6) and its persistence.
//!
//! This is the one multi-field record the rotation engine (§4.F), the
//! sleep scheduler (§4.H), and the power coordinator (§4.J) all read; it
//! lives in its own section of the `NvsStore` document.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::NvsStore;

/// Where the next displayed image comes from (§3, §6 `rotation_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    SdCard,
    Url,
    Ai,
}

impl Default for RotationMode {
    fn default() -> Self {
        RotationMode::SdCard
    }
}

/// SDCard sub-mode (§3, §6 `sd_rot_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdCardMode {
    Random,
    Sequential,
}

impl Default for SdCardMode {
    fn default() -> Self {
        SdCardMode::Sequential
    }
}

/// A sleep-schedule window during which wakes are suppressed (§3, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSchedule {
    #[serde(default)]
    pub enabled: bool,
    /// Minutes since midnight.
    #[serde(default)]
    pub start_minutes: i32,
    /// Minutes since midnight.
    #[serde(default)]
    pub end_minutes: i32,
}

/// One extra HTTP header for the URL rotation mode (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraHeader {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationConfig {
    #[serde(default)]
    pub mode: RotationMode,
    /// Master switch for automatic rotation, distinct from `mode` (§6
    /// `auto_rotate`). Gates both the active-rotate task and
    /// `enter_sleep`'s timer-wake arming (§4.J).
    #[serde(default = "default_true")]
    pub auto_rotate: bool,
    #[serde(default)]
    pub sd_card_mode: SdCardMode,
    /// Seconds (§3 `interval`, default 3600).
    #[serde(default = "default_interval")]
    pub interval_seconds: u32,
    /// Wake at integer multiples of `interval_seconds` from midnight.
    #[serde(default)]
    pub aligned: bool,
    #[serde(default)]
    pub sleep_schedule: SleepSchedule,
    /// Last displayed index for `SdCardMode::Sequential`.
    #[serde(default)]
    pub last_index: i32,
    #[serde(default)]
    pub enabled_albums: String,

    // URL mode
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub extra_header: Option<ExtraHeader>,
    #[serde(default)]
    pub save_downloaded: bool,

    // AI mode
    #[serde(default)]
    pub ai_prompt: String,
    #[serde(default)]
    pub ai_provider: String,
    #[serde(default)]
    pub ai_model: String,

    /// Last-displayed path, owned exclusively by the rotation engine
    /// (§3 "Ownership"), used for the Random sub-mode's duplicate check.
    #[serde(default)]
    pub last_displayed_path: Option<String>,
}

fn default_interval() -> u32 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            mode: RotationMode::default(),
            auto_rotate: default_true(),
            sd_card_mode: SdCardMode::default(),
            interval_seconds: default_interval(),
            aligned: false,
            sleep_schedule: SleepSchedule::default(),
            last_index: -1,
            enabled_albums: "Default".to_string(),
            image_url: String::new(),
            bearer_token: None,
            extra_header: None,
            save_downloaded: false,
            ai_prompt: String::new(),
            ai_provider: String::new(),
            ai_model: String::new(),
            last_displayed_path: None,
        }
    }
}

impl Default for SleepSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            start_minutes: 0,
            end_minutes: 0,
        }
    }
}

/// The rotation config store: thin load/save over the shared namespace.
pub struct RotationConfigStore {
    nvs: Arc<NvsStore>,
}

impl RotationConfigStore {
    pub fn new(nvs: Arc<NvsStore>) -> Self {
        Self { nvs }
    }

    pub async fn load(&self) -> RotationConfig {
        self.nvs.snapshot().await.rotation
    }

    pub async fn save(&self, config: RotationConfig) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.rotation = config;
            })
            .await?;
        Ok(())
    }

    /// Persist just the last-displayed path (rotation engine's sole
    /// mutation path for this field, §3 "Ownership").
    pub async fn set_last_displayed_path(&self, path: &str) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.rotation.last_displayed_path = Some(path.to_string());
            })
            .await?;
        Ok(())
    }

    /// Persist just the sequential last-index.
    pub async fn set_last_index(&self, index: i32) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.rotation.last_index = index;
            })
            .await?;
        Ok(())
    }

    /// Persist the enabled-album set (lazy-pruned by rotation, §3).
    pub async fn set_enabled_albums(&self, csv: &str) -> Result<(), super::StoreError> {
        self.nvs
            .mutate(|doc| {
                doc.rotation.enabled_albums = csv.to_string();
            })
            .await?;
        Ok(())
    }
}
