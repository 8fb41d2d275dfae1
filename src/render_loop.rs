//! Per-effect render loop: tick, rasterize, present, sleep.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use screensaver_common::colors::BLACK;
use screensaver_common::{Effect, EffectKind, EffectState, SpeedLevel};

use crate::display::{DisplaySurface, Orientation};
use crate::signals::StopFlag;
use crate::st7735::Framebuffer;

/// Frames between progress log lines.
pub const LOG_EVERY_FRAMES: u64 = 300;

/// How an effect run is paced and bounded.
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    pub speed: SpeedLevel,
    /// Stop after this long (test mode).
    pub duration: Option<Duration>,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub seed: u64,
    pub orientation: Orientation,
}

impl RunOptions {
    pub fn new(seed: u64) -> Self {
        Self {
            speed: SpeedLevel::default(),
            duration: None,
            max_frames: None,
            seed,
            orientation: Orientation::default(),
        }
    }
}

/// Why the loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    Duration,
    FrameLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub reason: StopReason,
}

/// Frame delay of `kind` at `speed`.
pub fn frame_delay(
    kind: EffectKind,
    speed: SpeedLevel,
) -> Duration {
    Duration::from_millis(u64::from(speed.scale_delay_ms(kind.frame_delay_ms())))
}

/// Run `kind` on `surface` until stopped.
///
/// The display is cleared on every exit path once it was initialized,
/// including errors.
pub fn run_effect<S>(
    kind: EffectKind,
    surface: &mut S,
    options: RunOptions,
    stop: &StopFlag,
) -> Result<RunSummary>
where
    S: DisplaySurface + ?Sized,
{
    surface
        .initialize(options.orientation)
        .context("initialize display")?;

    let result = drive(kind, surface, options, stop);

    if let Err(e) = surface.clear(BLACK) {
        log::warn!("clearing display on exit failed: {e:#}");
    }
    result
}

fn drive<S>(
    kind: EffectKind,
    surface: &mut S,
    options: RunOptions,
    stop: &StopFlag,
) -> Result<RunSummary>
where
    S: DisplaySurface + ?Sized,
{
    // The accumulation grid is large; keep it off the stack.
    let mut state = Box::new(EffectState::new(kind, options.seed));
    let mut frame = Framebuffer::new();
    let delay = frame_delay(kind, options.speed);
    let started = Instant::now();
    let mut frames: u64 = 0;

    log::info!(
        "starting {} at speed {} ({} ms/frame)",
        kind.key(),
        options.speed.level(),
        delay.as_millis()
    );

    let reason = loop {
        if stop.should_stop() {
            break StopReason::Signal;
        }
        if options.duration.is_some_and(|d| started.elapsed() >= d) {
            break StopReason::Duration;
        }
        if options.max_frames.is_some_and(|max| frames >= max) {
            break StopReason::FrameLimit;
        }

        let frame_start = Instant::now();
        state.tick();
        // Framebuffer drawing is infallible.
        let _ = state.rasterize(&mut frame);
        surface
            .present(&frame)
            .with_context(|| format!("present frame {frames}"))?;
        frames += 1;

        if frames % LOG_EVERY_FRAMES == 0 {
            log::info!(
                "{}: {} frames, {} live elements, {:.1}s",
                kind.key(),
                frames,
                state.population(),
                started.elapsed().as_secs_f32()
            );
        }

        if let Some(remaining) = delay.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    };

    log::info!("stopping {} after {} frames ({:?})", kind.key(), frames, reason);
    Ok(RunSummary { frames, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemorySurface;

    fn fast(frames: u64) -> RunOptions {
        RunOptions {
            speed: SpeedLevel::new(10).unwrap(),
            max_frames: Some(frames),
            ..RunOptions::new(1)
        }
    }

    #[test]
    fn test_frame_delay_scales_with_speed() {
        let normal = frame_delay(EffectKind::Raindrops, SpeedLevel::NORMAL);
        assert_eq!(normal, Duration::from_millis(50));
        let fastest = frame_delay(EffectKind::Raindrops, SpeedLevel::new(10).unwrap());
        assert_eq!(fastest, Duration::from_millis(20));
        let slowest = frame_delay(EffectKind::Raindrops, SpeedLevel::new(1).unwrap());
        assert_eq!(slowest, Duration::from_millis(500));
    }

    #[test]
    fn test_runs_frame_limit_and_clears() {
        let mut surface = MemorySurface::new();
        let summary = run_effect(EffectKind::MicroDots, &mut surface, fast(3), &StopFlag::new()).unwrap();
        assert_eq!(summary, RunSummary {
            frames: 3,
            reason: StopReason::FrameLimit,
        });
        assert_eq!(surface.presented, 3);
        assert_eq!(surface.orientation, Some(Orientation::Upright));
        assert_eq!(surface.clears, vec![BLACK]);
    }

    #[test]
    fn test_stop_flag_ends_before_first_frame() {
        let stop = StopFlag::new();
        stop.request_stop();
        let mut surface = MemorySurface::new();
        let summary = run_effect(EffectKind::Campfire, &mut surface, fast(100), &stop).unwrap();
        assert_eq!(summary.reason, StopReason::Signal);
        assert_eq!(surface.presented, 0);
    }

    #[test]
    fn test_duration_bound() {
        let mut surface = MemorySurface::new();
        let options = RunOptions {
            duration: Some(Duration::from_millis(60)),
            ..fast(u64::MAX)
        };
        let summary = run_effect(EffectKind::GlyphRainBlue, &mut surface, options, &StopFlag::new()).unwrap();
        assert_eq!(summary.reason, StopReason::Duration);
        assert!(summary.frames >= 1);
    }

    #[test]
    fn test_present_error_propagates_and_still_clears() {
        let mut surface = MemorySurface::failing_after(2);
        let err = run_effect(EffectKind::PlasmaField, &mut surface, fast(10), &StopFlag::new()).unwrap_err();
        assert!(format!("{err:#}").contains("present frame 2"));
        assert_eq!(surface.clears.len(), 1);
    }
}
