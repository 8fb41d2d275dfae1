//! Frame pacing for the preview window.
//!
//! The Pi binary sleeps the scaled frame delay of each effect; the preview
//! does the same so effects look the way they will on the panel.

use std::time::Duration;

use screensaver_common::{EffectKind, SpeedLevel};

/// Upper bound on one frame so the window stays responsive at slow speeds.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// How long `kind` should take per frame at `speed`, capped for the window.
pub fn frame_time(
    kind: EffectKind,
    speed: SpeedLevel,
) -> Duration {
    Duration::from_millis(u64::from(speed.scale_delay_ms(kind.frame_delay_ms()))).min(MAX_FRAME_TIME)
}

/// Remaining sleep after a frame that took `elapsed`.
pub fn remaining(
    frame: Duration,
    elapsed: Duration,
) -> Duration {
    frame.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faster_speed_shortens_frames() {
        let slow = frame_time(EffectKind::Raindrops, SpeedLevel::new(3).unwrap());
        let fast = frame_time(EffectKind::Raindrops, SpeedLevel::new(9).unwrap());
        assert!(fast < slow);
    }

    #[test]
    fn test_frame_time_is_capped() {
        let slowest = SpeedLevel::new(1).unwrap();
        for kind in EffectKind::ALL {
            assert!(frame_time(kind, slowest) <= MAX_FRAME_TIME);
        }
    }

    #[test]
    fn test_overrun_does_not_sleep() {
        assert_eq!(remaining(Duration::from_millis(20), Duration::from_millis(35)), Duration::ZERO);
        assert_eq!(remaining(Duration::from_millis(20), Duration::from_millis(5)), Duration::from_millis(15));
    }
}
