//! Power Coordinator (spec §4.J): the two concurrent soft timers plus
//! `enter_sleep()`. Grounded on the teacher's `scheduler.rs`
//! `tokio::select!` + `broadcast::Receiver<()>` shutdown pattern.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use tokio::sync::{broadcast, watch};

use crate::power::periodic::PeriodicTaskRegistry;
use crate::power::sleep_scheduler::{seconds_until_next_wake, SleepWindow};
use crate::power::wake::{self, ButtonMap, WakeCause, WakeReason};
use crate::rotation::RotationEngine;
use crate::store::rotation_config::RotationConfigStore;
use crate::store::{NvsStore, PowerSection};

const LED_BLINK_PERIOD: Duration = Duration::from_secs(10);

#[cfg(debug_assertions)]
const AUTO_SLEEP_TIMEOUT_SEC: u64 = 60;
#[cfg(not(debug_assertions))]
const AUTO_SLEEP_TIMEOUT_SEC: u64 = 120;

/// Collaborators the power coordinator drives when it arms deep sleep.
/// A real device's bootloader wake-source registers and LED GPIOs are an
/// external collaborator (spec §1 "deliberately out of scope": the panel
/// and other hardware drivers); this trait is the seam a platform layer
/// would implement.
pub trait SleepHardware: Send + Sync {
    fn set_status_led(&self, on: bool);
    fn arm_timer_wake(&self, seconds: u64);
    fn arm_ext1_wake(&self, button_gpio_mask: u32);
    fn deep_sleep(&self);
    /// Read the raw wake-cause bits the runtime reported for this boot
    /// (spec §4.G). The real register reads are hardware, out of scope
    /// per spec §1; this is the same external-collaborator boundary as
    /// the other `SleepHardware` methods.
    fn read_wake_cause(&self) -> WakeCause;
}

/// No-op hardware, used when this core runs without a real bootloader
/// (tests, or a platform not yet wired up).
pub struct NullSleepHardware;

impl SleepHardware for NullSleepHardware {
    fn set_status_led(&self, _on: bool) {}
    fn arm_timer_wake(&self, _seconds: u64) {}
    fn arm_ext1_wake(&self, _button_gpio_mask: u32) {}
    fn deep_sleep(&self) {
        tracing::info!("deep sleep requested (no hardware collaborator wired up)");
    }
    fn read_wake_cause(&self) -> WakeCause {
        WakeCause { timer: false, ext1: false, ext1_pin_mask: 0 }
    }
}

pub struct PowerCoordinator {
    nvs: Arc<NvsStore>,
    rotation_config: Arc<RotationConfigStore>,
    rotation: Arc<RotationEngine>,
    periodic: Arc<PeriodicTaskRegistry>,
    hardware: Arc<dyn SleepHardware>,
    button_gpio_mask: u32,
    button_map: ButtonMap,
    on_battery: watch::Sender<bool>,
    sleep_deadline: watch::Sender<Duration>,
    rotate_deadline: watch::Sender<Duration>,
}

impl PowerCoordinator {
    pub fn new(
        nvs: Arc<NvsStore>,
        rotation_config: Arc<RotationConfigStore>,
        rotation: Arc<RotationEngine>,
        periodic: Arc<PeriodicTaskRegistry>,
        hardware: Arc<dyn SleepHardware>,
        button_gpio_mask: u32,
        button_map: ButtonMap,
    ) -> Self {
        let (on_battery, _) = watch::channel(false);
        let (sleep_deadline, _) = watch::channel(Duration::from_secs(AUTO_SLEEP_TIMEOUT_SEC));
        let (rotate_deadline, _) = watch::channel(Duration::ZERO);
        Self {
            nvs,
            rotation_config,
            rotation,
            periodic,
            hardware,
            button_gpio_mask,
            button_map,
            on_battery,
            sleep_deadline,
            rotate_deadline,
        }
    }

    /// Read the boot's wake cause, classify it (spec §4.G), and clear
    /// the RTC-retained `expected_wake` now that it has been consumed
    /// (SPEC_FULL.md's resolution for non-retained-RAM targets). This is
    /// the entry point of the battery-path data flow in spec §2: wake
    /// classifier -> scheduler/rotation -> display -> power coordinator.
    pub async fn classify_wake(&self) -> WakeReason {
        let cause = self.hardware.read_wake_cause();
        let expected_wake = self.nvs.snapshot().await.wake.expected_wake_unix;
        let now = chrono::Utc::now().timestamp();
        let reason = wake::classify(cause, expected_wake, now, &self.button_map, &self.periodic).await;
        self.nvs.mutate(|doc| doc.wake.expected_wake_unix = 0).await.ok();
        reason
    }

    /// Push a new on-battery reading (external collaborator's USB-present
    /// signal, out of scope per spec §1; the coordinator only consumes it).
    pub fn set_on_battery(&self, on_battery: bool) {
        let _ = self.on_battery.send(on_battery);
    }

    /// Publish a new auto-sleep deadline (spec §4.J `reset_sleep_timer`).
    pub fn reset_sleep_timer(&self) {
        let _ = self.sleep_deadline.send(Duration::from_secs(AUTO_SLEEP_TIMEOUT_SEC));
    }

    /// Publish a new rotate deadline (spec §4.J `reset_rotate_timer`).
    pub fn reset_rotate_timer(&self, delta: Duration) {
        let _ = self.rotate_deadline.send(delta);
    }

    /// Runs the auto-sleep task until `shutdown` fires (spec §4.J,
    /// §5 "Sleep timer task").
    pub async fn run_auto_sleep(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut deadline_rx = self.sleep_deadline.subscribe();
        let mut battery_rx = self.on_battery.subscribe();

        loop {
            let power = self.nvs.snapshot().await.power;
            if !self.should_auto_sleep(&power, *battery_rx.borrow()) {
                tokio::select! {
                    _ = battery_rx.changed() => continue,
                    _ = deadline_rx.changed() => continue,
                    _ = shutdown.recv() => return,
                }
            }

            let mut remaining = *deadline_rx.borrow();
            loop {
                let tick = remaining.min(LED_BLINK_PERIOD);
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {
                        remaining = remaining.saturating_sub(tick);
                        if remaining.is_zero() {
                            self.hardware.set_status_led(false);
                            self.enter_sleep().await;
                            break;
                        }
                        self.hardware.set_status_led(true);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        self.hardware.set_status_led(false);
                    }
                    changed = deadline_rx.changed() => {
                        if changed.is_err() { return; }
                        remaining = *deadline_rx.borrow();
                    }
                    _ = shutdown.recv() => return,
                }
            }
        }
    }

    fn should_auto_sleep(&self, power: &PowerSection, on_battery: bool) -> bool {
        on_battery && power.deep_sleep
    }

    /// Runs the active-rotate task until `shutdown` fires (spec §4.J,
    /// §5 "Rotation timer task"). Only actually schedules rotations
    /// "when the device stays awake (USB present or deep-sleep
    /// disabled) and auto-rotate is enabled" (§4.J); otherwise it idles,
    /// re-checking whenever the on-battery state changes.
    pub async fn run_active_rotate(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut battery_rx = self.on_battery.subscribe();

        loop {
            let config = self.rotation_config.load().await;
            let power = self.nvs.snapshot().await.power;
            let on_battery = *battery_rx.borrow();
            let stays_awake = !on_battery || !power.deep_sleep;

            if !(stays_awake && config.auto_rotate && config.interval_seconds > 0) {
                tokio::select! {
                    _ = battery_rx.changed() => continue,
                    _ = tokio::time::sleep(Duration::from_secs(30)) => continue,
                    _ = shutdown.recv() => return,
                }
            }

            let now = chrono::Local::now();
            let window = config.sleep_schedule;
            let schedule = SleepWindow {
                enabled: window.enabled,
                start_min: window.start_minutes,
                end_min: window.end_minutes,
            };
            let delta_secs = seconds_until_next_wake(
                now.hour(),
                now.minute(),
                now.second(),
                config.interval_seconds as i64,
                config.aligned,
                Some(schedule),
            );
            let delta = Duration::from_secs(delta_secs.max(0) as u64);
            self.reset_rotate_timer(delta);

            let mut rotate_rx = self.rotate_deadline.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(delta) => {
                    if !self.in_sleep_window(&config) {
                        if let Err(e) = self.rotation.rotate().await {
                            tracing::error!(error = %e, "scheduled rotation failed");
                        }
                    }
                }
                changed = rotate_rx.changed() => {
                    if changed.is_err() { return; }
                }
                _ = battery_rx.changed() => {}
                _ = shutdown.recv() => return,
            }
        }
    }

    fn in_sleep_window(&self, config: &crate::store::rotation_config::RotationConfig) -> bool {
        if !config.sleep_schedule.enabled {
            return false;
        }
        let now = chrono::Local::now();
        let t = now.hour() as i32 * 60 + now.minute() as i32;
        let s = config.sleep_schedule.start_minutes;
        let e = config.sleep_schedule.end_minutes;
        if s > e {
            t >= s || t < e
        } else {
            t >= s && t < e
        }
    }

    /// Arm the next wake source and deep-sleep (spec §4.J `enter_sleep`).
    pub async fn enter_sleep(&self) {
        self.hardware.set_status_led(false);

        let config = self.rotation_config.load().await;
        let schedule = SleepWindow {
            enabled: config.sleep_schedule.enabled,
            start_min: config.sleep_schedule.start_minutes,
            end_min: config.sleep_schedule.end_minutes,
        };

        let now = chrono::Local::now();
        let now_unix = now.timestamp();

        if config.auto_rotate && config.interval_seconds > 0 {
            let delta_secs = seconds_until_next_wake(
                now.hour(),
                now.minute(),
                now.second(),
                config.interval_seconds as i64,
                config.aligned,
                Some(schedule),
            );
            self.hardware.arm_timer_wake(delta_secs.max(0) as u64);
            self.nvs
                .mutate(|doc| {
                    doc.wake.expected_wake_unix = now_unix + delta_secs;
                })
                .await
                .ok();
        }

        self.hardware.arm_ext1_wake(self.button_gpio_mask);
        self.hardware.deep_sleep();
    }

    /// Runs a named clock-sync periodic task through the registry; callers
    /// wire this into whatever schedule drives `check_and_run_all`.
    pub fn periodic(&self) -> &PeriodicTaskRegistry {
        &self.periodic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct RecordingHardware {
        led_on: AtomicBool,
        timer_armed_secs: AtomicU32,
        deep_slept: AtomicBool,
    }

    impl SleepHardware for RecordingHardware {
        fn set_status_led(&self, on: bool) {
            self.led_on.store(on, Ordering::SeqCst);
        }
        fn arm_timer_wake(&self, seconds: u64) {
            self.timer_armed_secs.store(seconds as u32, Ordering::SeqCst);
        }
        fn arm_ext1_wake(&self, _button_gpio_mask: u32) {}
        fn deep_sleep(&self) {
            self.deep_slept.store(true, Ordering::SeqCst);
        }
        fn read_wake_cause(&self) -> WakeCause {
            WakeCause { timer: false, ext1: false, ext1_pin_mask: 0 }
        }
    }

    async fn test_setup() -> (Arc<NvsStore>, Arc<RotationConfigStore>) {
        let dir = std::env::temp_dir().join(format!("photoframe-power-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let nvs = Arc::new(NvsStore::open(dir.join("nvs.json")).await.unwrap());
        let rc = Arc::new(RotationConfigStore::new(Arc::clone(&nvs)));
        (nvs, rc)
    }

    #[tokio::test]
    async fn enter_sleep_arms_timer_and_persists_expected_wake() {
        let (nvs, rc) = test_setup().await;
        let mut config = rc.load().await;
        config.interval_seconds = 3600;
        config.aligned = false;
        rc.save(config).await.unwrap();

        let albums_dir = std::env::temp_dir().join(format!("photoframe-power-albums-{}", std::process::id()));
        let palette_store = Arc::new(crate::store::palette::PaletteStore::new(Arc::clone(&nvs)).await);
        let settings_store = Arc::new(crate::store::settings::SettingsStore::new(Arc::clone(&nvs)));
        let pipeline = Arc::new(crate::pipeline::ImagePipeline::new(palette_store, settings_store, 8, 8));
        let album_store = Arc::new(crate::store::albums::AlbumStore::new(albums_dir.clone(), Arc::clone(&rc)));
        let panel = Arc::new(crate::display::panel::SimulatedPanel::with_delay(8, 8, Duration::from_millis(1)));
        let display = Arc::new(crate::display::DisplayGate::new(panel, albums_dir.join(".current.lnk"), 8, 8));
        let rotation = Arc::new(RotationEngine::new(
            Arc::clone(&nvs),
            Arc::clone(&rc),
            album_store,
            pipeline,
            display,
            albums_dir,
            8,
            8,
        ));
        let periodic = Arc::new(PeriodicTaskRegistry::new());
        let hardware = Arc::new(RecordingHardware {
            led_on: AtomicBool::new(false),
            timer_armed_secs: AtomicU32::new(0),
            deep_slept: AtomicBool::new(false),
        });

        let button_map = ButtonMap {
            pins: vec![(4, wake::ButtonGpio::Wake), (5, wake::ButtonGpio::Rotate), (6, wake::ButtonGpio::Clear)],
        };
        let coordinator = PowerCoordinator::new(nvs, rc, rotation, periodic, hardware.clone(), 0, button_map);
        coordinator.enter_sleep().await;

        assert!(hardware.deep_slept.load(Ordering::SeqCst));
        assert!(hardware.timer_armed_secs.load(Ordering::SeqCst) > 0);
    }
}
