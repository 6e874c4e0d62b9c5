//! Sleep scheduler: `seconds_until_next_wake` (spec §4.H).

/// A contiguous minutes-of-day window during which wakes are
/// suppressed (spec §3 `RotationConfig.sleep_schedule`).
#[derive(Debug, Clone, Copy)]
pub struct SleepWindow {
    pub enabled: bool,
    pub start_min: i32,
    pub end_min: i32,
}

const SECONDS_PER_DAY: i64 = 86_400;
const TOO_SOON_THRESHOLD_SECS: i64 = 60;

/// Compute the number of seconds from `(hour, min, sec)` until the next
/// wake, honoring `interval_seconds`, wall-clock alignment, and an
/// optional sleep-schedule window (spec §4.H).
pub fn seconds_until_next_wake(
    hour: u32,
    min: u32,
    sec: u32,
    interval_seconds: i64,
    aligned: bool,
    schedule: Option<SleepWindow>,
) -> i64 {
    let t = hour as i64 * 3600 + min as i64 * 60 + sec as i64;

    let mut delta = if aligned {
        let next = (t / interval_seconds + 1) * interval_seconds;
        let d = next - t;
        if d < TOO_SOON_THRESHOLD_SECS {
            d + interval_seconds
        } else {
            d
        }
    } else {
        interval_seconds
    };

    let schedule = match schedule {
        Some(s) if s.enabled => s,
        _ => return delta,
    };

    let wake_tod = (t + delta).rem_euclid(SECONDS_PER_DAY);
    let start = schedule.start_min as i64 * 60;
    let end = schedule.end_min as i64 * 60;

    let in_schedule = if start > end {
        wake_tod >= start || wake_tod < end
    } else {
        wake_tod >= start && wake_tod < end
    };

    if !in_schedule {
        return delta;
    }

    // Post-schedule wake: the first valid moment at or after `end`.
    let post_schedule_tod = if aligned {
        ((end / interval_seconds) + if end % interval_seconds == 0 { 0 } else { 1 }) * interval_seconds
    } else {
        end
    };
    let post_schedule_tod = post_schedule_tod.rem_euclid(SECONDS_PER_DAY);

    delta = (post_schedule_tod - t).rem_euclid(SECONDS_PER_DAY);
    if delta == 0 {
        delta = SECONDS_PER_DAY;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_aligned_rotation_no_sleep_schedule() {
        let delta = seconds_until_next_wake(10, 47, 12, 3600, true, None);
        assert_eq!(delta, 768);
    }

    #[test]
    fn s2_aligned_rotation_too_soon_skip() {
        let delta = seconds_until_next_wake(10, 59, 30, 3600, true, None);
        assert_eq!(delta, 3630);
    }

    #[test]
    fn s3_overnight_sleep_schedule() {
        let schedule = SleepWindow {
            enabled: true,
            start_min: 23 * 60,
            end_min: 7 * 60,
        };
        let delta = seconds_until_next_wake(22, 30, 0, 3600, true, Some(schedule));
        assert_eq!(delta, 30600);
    }

    #[test]
    fn exact_60_second_threshold_is_accepted_not_skipped() {
        // 11:00:00 is exactly 60s away at 10:59:00; the spec's cutoff
        // is "< 60", so exactly 60 is accepted.
        let delta = seconds_until_next_wake(10, 59, 0, 3600, true, None);
        assert_eq!(delta, 60);
    }

    #[test]
    fn property_aligned_delta_is_never_below_the_too_soon_threshold() {
        for h in 0..24u32 {
            for m in (0..60u32).step_by(7) {
                for s in (0..60u32).step_by(13) {
                    let delta = seconds_until_next_wake(h, m, s, 900, true, None);
                    assert!(delta >= TOO_SOON_THRESHOLD_SECS);
                }
            }
        }
    }

    #[test]
    fn property_wake_never_lands_inside_an_enabled_schedule() {
        let schedule = SleepWindow {
            enabled: true,
            start_min: 22 * 60,
            end_min: 6 * 60,
        };
        for h in 0..24u32 {
            for m in (0..60u32).step_by(11) {
                let delta = seconds_until_next_wake(h, m, 0, 1800, true, Some(schedule));
                let t = h as i64 * 3600 + m as i64 * 60;
                let wake_tod = (t + delta).rem_euclid(SECONDS_PER_DAY);
                let start = schedule.start_min as i64 * 60;
                let end = schedule.end_min as i64 * 60;
                let in_schedule = wake_tod >= start || wake_tod < end;
                assert!(!in_schedule, "h={h} m={m} delta={delta} wake_tod={wake_tod}");
            }
        }
    }

    #[test]
    fn disabled_schedule_never_postpones() {
        let schedule = SleepWindow {
            enabled: false,
            start_min: 0,
            end_min: 60,
        };
        let with = seconds_until_next_wake(0, 0, 0, 600, true, Some(schedule));
        let without = seconds_until_next_wake(0, 0, 0, 600, true, None);
        assert_eq!(with, without);
    }
}
