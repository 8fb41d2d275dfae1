//! Desktop preview of the LCD screensaver effects.
//!
//! Renders the same effect simulations the Pi binary runs into a 128x128
//! simulator window, paced with the same scaled frame delays.
//!
//! Keys:
//! - N / B: next / previous effect
//! - F / S: faster / slower
//! - P: pause
//! - R: restart the effect with a new seed
//! - H: toggle the overlay
//! - Q: quit

// Crate-level lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

mod hud;
mod timing;

use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::sdl2::Keycode;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window};
use screensaver_common::{BLACK, Effect, EffectKind, EffectState, SCREEN_HEIGHT, SCREEN_WIDTH, SpeedLevel};

use crate::hud::{HudInfo, draw_hud};
use crate::timing::{frame_time, remaining};

/// Frames between FPS estimates.
const FPS_WINDOW: u32 = 20;

fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0x5EED, |d| d.as_nanos() as u64)
}

fn main() {
    let mut display: SimulatorDisplay<Rgb565> = SimulatorDisplay::new(Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
    let output_settings = OutputSettingsBuilder::new().scale(4).build();
    let mut window = Window::new("LCD Screensaver Preview", &output_settings);

    display.clear(BLACK).ok();
    window.update(&display);

    let start_index = std::env::args()
        .nth(1)
        .and_then(|key| EffectKind::from_key(&key))
        .and_then(|kind| EffectKind::ALL.iter().position(|&k| k == kind))
        .unwrap_or(0);

    let mut index = start_index;
    let mut kind = EffectKind::ALL[index];
    let mut state = EffectState::new(kind, seed());
    let mut speed = SpeedLevel::NORMAL;
    let mut paused = false;
    let mut show_hud = true;

    let mut fps = 0.0f32;
    let mut fps_frames = 0u32;
    let mut fps_start = Instant::now();

    loop {
        let frame_start = Instant::now();
        let mut restart = false;

        for ev in window.events() {
            match ev {
                SimulatorEvent::Quit => return,
                SimulatorEvent::KeyDown { keycode, repeat, .. } => {
                    if repeat {
                        continue;
                    }
                    match keycode {
                        Keycode::Q => return,
                        Keycode::N => {
                            index = (index + 1) % EffectKind::ALL.len();
                            restart = true;
                        }
                        Keycode::B => {
                            index = (index + EffectKind::ALL.len() - 1) % EffectKind::ALL.len();
                            restart = true;
                        }
                        Keycode::F => speed = speed.next(),
                        Keycode::S => speed = speed.previous(),
                        Keycode::P => paused = !paused,
                        Keycode::R => restart = true,
                        Keycode::H => show_hud = !show_hud,
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if restart {
            kind = EffectKind::ALL[index];
            state = EffectState::new(kind, seed());
            paused = false;
        }

        if !paused {
            state.tick();
        }
        state.rasterize(&mut display).ok();
        if show_hud {
            let info = HudInfo {
                index,
                kind,
                speed,
                fps,
                paused,
            };
            draw_hud(&mut display, &info).ok();
        }
        window.update(&display);

        fps_frames += 1;
        if fps_frames == FPS_WINDOW {
            fps = fps_frames as f32 / fps_start.elapsed().as_secs_f32().max(f32::EPSILON);
            fps_frames = 0;
            fps_start = Instant::now();
        }

        thread::sleep(remaining(frame_time(kind, speed), frame_start.elapsed()));
    }
}
