//! Wake classifier (spec §4.G).

use crate::power::periodic::PeriodicTaskRegistry;

/// Clock drift beyond this threshold forces an SNTP resync (spec §4.G).
const DRIFT_THRESHOLD_SECS: i64 = 30;

pub const SNTP_SYNC_TASK: &str = "sntp_sync";

/// Configured EXT1 wake GPIO assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonGpio {
    Wake,
    Rotate,
    Clear,
}

/// Raw wake-cause bits read from the runtime.
#[derive(Debug, Clone, Copy)]
pub struct WakeCause {
    pub timer: bool,
    pub ext1: bool,
    /// Bitmask of the EXT1-asserted pins, consulted only when `ext1` is set.
    pub ext1_pin_mask: u32,
}

/// Classified wake reason (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Timer,
    WakeKey,
    RotateKey,
    ClearKey,
    Ext1Unknown,
    NotFromDeepSleep,
}

/// Maps a configured GPIO pin number to its button role. The caller
/// supplies this from persisted device config; order matters only in
/// that the first match wins (spec: "map the first matching configured
/// GPIO").
pub struct ButtonMap {
    pub pins: Vec<(u32, ButtonGpio)>,
}

impl ButtonMap {
    fn first_match(&self, mask: u32) -> Option<ButtonGpio> {
        self.pins
            .iter()
            .find(|(pin, _)| mask & (1 << pin) != 0)
            .map(|(_, role)| *role)
    }
}

/// Classify a wake cause, forcing an SNTP resync on excessive drift
/// (spec §4.G, §8 scenario S6).
pub async fn classify(
    cause: WakeCause,
    expected_wake_unix: i64,
    now_unix: i64,
    buttons: &ButtonMap,
    periodic: &PeriodicTaskRegistry,
) -> WakeReason {
    if cause.timer {
        let drift = now_unix - expected_wake_unix;
        if drift.abs() > DRIFT_THRESHOLD_SECS {
            periodic.force(SNTP_SYNC_TASK).await;
        }
        return WakeReason::Timer;
    }

    if cause.ext1 {
        return match buttons.first_match(cause.ext1_pin_mask) {
            Some(ButtonGpio::Wake) => WakeReason::WakeKey,
            Some(ButtonGpio::Rotate) => WakeReason::RotateKey,
            Some(ButtonGpio::Clear) => WakeReason::ClearKey,
            None => WakeReason::Ext1Unknown,
        };
    }

    WakeReason::NotFromDeepSleep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buttons() -> ButtonMap {
        ButtonMap {
            pins: vec![(4, ButtonGpio::Wake), (5, ButtonGpio::Rotate), (6, ButtonGpio::Clear)],
        }
    }

    #[tokio::test]
    async fn timer_wake_within_threshold_does_not_force_sync() {
        let registry = PeriodicTaskRegistry::new();
        registry.register(SNTP_SYNC_TASK, 3600).await;
        // Simulate a task that already ran once, so `force` leaving it
        // at 0 is distinguishable from "never ran."
        registry.check_and_run_all(1_700_000_000, |_| Ok(())).await;
        assert_eq!(registry.last_run(SNTP_SYNC_TASK).await, Some(1_700_000_000));

        let cause = WakeCause { timer: true, ext1: false, ext1_pin_mask: 0 };
        let reason = classify(cause, 1_700_000_000, 1_700_000_010, &buttons(), &registry).await;
        assert_eq!(reason, WakeReason::Timer);
        assert_eq!(registry.last_run(SNTP_SYNC_TASK).await, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn timer_wake_with_drift_forces_sntp_sync() {
        let registry = PeriodicTaskRegistry::new();
        registry.register(SNTP_SYNC_TASK, 3600).await;
        let cause = WakeCause { timer: true, ext1: false, ext1_pin_mask: 0 };
        // Matches spec §8 scenario S6.
        let reason = classify(cause, 1_700_000_000, 1_700_000_045, &buttons(), &registry).await;
        assert_eq!(reason, WakeReason::Timer);
        assert_eq!(registry.last_run(SNTP_SYNC_TASK).await, Some(0));
    }

    #[tokio::test]
    async fn ext1_wake_maps_first_matching_pin() {
        let registry = PeriodicTaskRegistry::new();
        let cause = WakeCause { timer: false, ext1: true, ext1_pin_mask: 1 << 5 };
        let reason = classify(cause, 0, 0, &buttons(), &registry).await;
        assert_eq!(reason, WakeReason::RotateKey);
    }

    #[tokio::test]
    async fn ext1_wake_with_unmapped_pin_is_unknown() {
        let registry = PeriodicTaskRegistry::new();
        let cause = WakeCause { timer: false, ext1: true, ext1_pin_mask: 1 << 20 };
        let reason = classify(cause, 0, 0, &buttons(), &registry).await;
        assert_eq!(reason, WakeReason::Ext1Unknown);
    }

    #[tokio::test]
    async fn neither_bit_set_is_not_from_deep_sleep() {
        let registry = PeriodicTaskRegistry::new();
        let cause = WakeCause { timer: false, ext1: false, ext1_pin_mask: 0 };
        let reason = classify(cause, 0, 0, &buttons(), &registry).await;
        assert_eq!(reason, WakeReason::NotFromDeepSleep);
    }
}
