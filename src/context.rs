//! Wires every store, the pipeline, the display gate, rotation, and the
//! power coordinator together in the initialization order spec §9
//! requires: Palette and Processing before Pipeline; Config (rotation,
//! albums) before Rotation and Power.

use std::path::PathBuf;
use std::sync::Arc;

use crate::display::panel::{Panel, SimulatedPanel, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::display::DisplayGate;
use crate::pipeline::ImagePipeline;
use crate::power::coordinator::{NullSleepHardware, PowerCoordinator, SleepHardware};
use crate::power::periodic::PeriodicTaskRegistry;
use crate::power::wake::{ButtonGpio, ButtonMap};
use crate::rotation::RotationEngine;
use crate::store::albums::AlbumStore;
use crate::store::palette::PaletteStore;
use crate::store::rotation_config::RotationConfigStore;
use crate::store::settings::SettingsStore;
use crate::store::{NvsStore, StoreError};

pub struct AppContext {
    pub nvs: Arc<NvsStore>,
    pub palette_store: Arc<PaletteStore>,
    pub settings_store: Arc<SettingsStore>,
    pub rotation_config: Arc<RotationConfigStore>,
    pub albums: Arc<AlbumStore>,
    pub pipeline: Arc<ImagePipeline>,
    pub display: Arc<DisplayGate>,
    pub rotation: Arc<RotationEngine>,
    pub periodic: Arc<PeriodicTaskRegistry>,
    pub power: Arc<PowerCoordinator>,
}

impl AppContext {
    /// Build the full dependency graph rooted at `config_path` (the NVS
    /// document) and `image_root` (the SDCard album tree).
    pub async fn bootstrap(config_path: &PathBuf, image_root: PathBuf) -> Result<Self, StoreError> {
        let nvs = Arc::new(NvsStore::open(config_path).await?);

        // Palette and Processing before Pipeline (spec §9 ordering).
        let palette_store = Arc::new(PaletteStore::new(Arc::clone(&nvs)).await);
        let settings_store = Arc::new(SettingsStore::new(Arc::clone(&nvs)));
        let pipeline = Arc::new(ImagePipeline::new(
            Arc::clone(&palette_store),
            Arc::clone(&settings_store),
            DISPLAY_WIDTH,
            DISPLAY_HEIGHT,
        ));

        // Config before Rotation and Power.
        let rotation_config = Arc::new(RotationConfigStore::new(Arc::clone(&nvs)));
        let albums = Arc::new(AlbumStore::new(image_root.clone(), Arc::clone(&rotation_config)));
        albums.ensure_default().map_err(|e| {
            StoreError::Read(std::io::Error::other(e.to_string()))
        })?;

        let panel: Arc<dyn Panel> = Arc::new(SimulatedPanel::new(DISPLAY_WIDTH, DISPLAY_HEIGHT));
        let display = Arc::new(DisplayGate::new(
            panel,
            image_root.join(".current.lnk"),
            DISPLAY_WIDTH,
            DISPLAY_HEIGHT,
        ));

        let rotation = Arc::new(RotationEngine::new(
            Arc::clone(&nvs),
            Arc::clone(&rotation_config),
            Arc::clone(&albums),
            Arc::clone(&pipeline),
            Arc::clone(&display),
            image_root,
            DISPLAY_WIDTH,
            DISPLAY_HEIGHT,
        ));

        let periodic = Arc::new(PeriodicTaskRegistry::new());
        periodic.register(crate::power::wake::SNTP_SYNC_TASK, 86_400).await;

        // Default EXT1 GPIO assignment (spec §4.G); a real deployment
        // would source this from board-specific device config.
        let button_map = ButtonMap {
            pins: vec![(4, ButtonGpio::Wake), (5, ButtonGpio::Rotate), (6, ButtonGpio::Clear)],
        };
        let button_gpio_mask = button_map.pins.iter().fold(0u32, |mask, (pin, _)| mask | (1 << pin));

        let hardware: Arc<dyn SleepHardware> = Arc::new(NullSleepHardware);
        let power = Arc::new(PowerCoordinator::new(
            Arc::clone(&nvs),
            Arc::clone(&rotation_config),
            Arc::clone(&rotation),
            Arc::clone(&periodic),
            hardware,
            button_gpio_mask,
            button_map,
        ));

        Ok(Self {
            nvs,
            palette_store,
            settings_store,
            rotation_config,
            albums,
            pipeline,
            display,
            rotation,
            periodic,
            power,
        })
    }
}
