//! Rain with splashes and puddles.
//!
//! Drops fall under a constant wind and strike the surface, which is the
//! bottom edge raised by whatever puddle has collected at that column. Each
//! strike bursts into short-lived splash particles and deepens the puddle;
//! puddles slowly evaporate.
//!
//! [`RainProfile::Light`] is a gentle shower. [`RainProfile::Heavy`] is a dense
//! storm with bigger splashes, deeper rippling puddles, and diamond drops.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, put_pixel};
use crate::colors::{dim, to_565};
use crate::config::{HEIGHT_F, HEIGHT_I, SCREEN_WIDTH, WIDTH_F};

const MAX_DROPS: usize = 256;
const MAX_SPLASHES: usize = 512;
const WIDTH: usize = SCREEN_WIDTH as usize;

const LIGHT_COLORS: [Rgb888; 6] = [
    Rgb888::new(173, 216, 230),
    Rgb888::new(135, 206, 235),
    Rgb888::new(176, 224, 230),
    Rgb888::new(240, 248, 255),
    Rgb888::new(230, 230, 250),
    Rgb888::new(200, 200, 255),
];

const STORM_COLORS: [Rgb888; 6] = [
    Rgb888::new(160, 200, 220),
    Rgb888::new(140, 180, 210),
    Rgb888::new(120, 160, 200),
    Rgb888::new(200, 220, 240),
    Rgb888::new(180, 200, 220),
    Rgb888::new(220, 230, 245),
];

// =============================================================================
// Profiles
// =============================================================================

/// Intensity of the rain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RainProfile {
    Light,
    Heavy,
}

struct Profile {
    spacing: u32,
    first_timer: (u16, u16),
    timer: (u16, u16),
    spawn_chance: f64,
    double_chance: f64,
    wind: f32,
    speed: (f32, f32),
    splash_strength: [u8; 3],
    gravity: f32,
    puddle_gain: f32,
    puddle_max: f32,
    evaporation: f32,
    colors: &'static [Rgb888; 6],
    puddle_color: Rgb888,
    background: Rgb888,
}

impl RainProfile {
    const fn profile(self) -> Profile {
        match self {
            Self::Light => Profile {
                spacing: 8,
                first_timer: (0, 60),
                timer: (30, 120),
                spawn_chance: 0.3,
                double_chance: 0.0,
                wind: 2.0,
                speed: (1.5, 4.0),
                splash_strength: [2, 4, 6],
                gravity: 0.2,
                puddle_gain: 0.5,
                puddle_max: 8.0,
                evaporation: 0.02,
                colors: &LIGHT_COLORS,
                puddle_color: Rgb888::new(100, 150, 200),
                background: Rgb888::new(20, 20, 40),
            },
            Self::Heavy => Profile {
                spacing: 4,
                first_timer: (0, 15),
                timer: (3, 15),
                spawn_chance: 0.9,
                double_chance: 0.4,
                wind: 3.0,
                speed: (3.0, 7.0),
                splash_strength: [4, 7, 10],
                gravity: 0.25,
                puddle_gain: 1.5,
                puddle_max: 15.0,
                evaporation: 0.01,
                colors: &STORM_COLORS,
                puddle_color: Rgb888::new(80, 120, 160),
                background: Rgb888::new(15, 15, 25),
            },
        }
    }
}

// =============================================================================
// Simulation State
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DropSize {
    Small,
    Medium,
    Large,
}

impl DropSize {
    const fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Raindrop {
    x: f32,
    y: f32,
    speed: f32,
    drift: f32,
    size: DropSize,
    color: Rgb888,
}

#[derive(Clone, Copy, Debug)]
struct Splash {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    life: u8,
    max_life: u8,
    color: Rgb888,
}

/// Rain simulation.
pub struct Rain {
    profile: RainProfile,
    rng: SmallRng,
    wind: f32,
    intensity: f32,
    timers: Vec<u16, WIDTH>,
    drops: Vec<Raindrop, MAX_DROPS>,
    splashes: Vec<Splash, MAX_SPLASHES>,
    puddles: [f32; WIDTH],
    time: u32,
}

impl Rain {
    pub fn new(
        profile: RainProfile,
        seed: u64,
    ) -> Self {
        let p = profile.profile();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut timers = Vec::new();
        for _ in 0..SCREEN_WIDTH / p.spacing {
            timers.push(rng.gen_range(p.first_timer.0..=p.first_timer.1)).ok();
        }
        let wind = rng.gen_range(-p.wind..=p.wind);
        let intensity = match profile {
            RainProfile::Light => 1.0,
            RainProfile::Heavy => rng.gen_range(0.8f32..1.5),
        };

        Self {
            profile,
            rng,
            wind,
            intensity,
            timers,
            drops: Vec::new(),
            splashes: Vec::new(),
            puddles: [0.0; WIDTH],
            time: 0,
        }
    }

    fn spawn_drop(
        &mut self,
        column: usize,
    ) {
        let p = self.profile.profile();
        let size = match self.profile {
            RainProfile::Light => match self.rng.gen_range(0..3) {
                0 => DropSize::Small,
                1 => DropSize::Medium,
                _ => DropSize::Large,
            },
            // Weighted 2:4:4 toward the bigger drops.
            RainProfile::Heavy => match self.rng.gen_range(0..10) {
                0 | 1 => DropSize::Small,
                2..=5 => DropSize::Medium,
                _ => DropSize::Large,
            },
        };
        let speed = self.rng.gen_range(p.speed.0..p.speed.1) * self.intensity;

        let drop = Raindrop {
            x: (column as u32 * p.spacing) as f32 + self.rng.gen_range(0.0..p.spacing as f32),
            y: self.rng.gen_range(-10.0..-5.0),
            speed,
            drift: self.wind * 0.1,
            size,
            color: p.colors[self.rng.gen_range(0..p.colors.len())],
        };
        self.drops.push(drop).ok();
    }

    fn splash(
        &mut self,
        drop: &Raindrop,
        column: usize,
    ) {
        let p = self.profile.profile();
        let strength = p.splash_strength[drop.size.index()] as f32;
        let count = match self.profile {
            RainProfile::Light => strength as usize,
            RainProfile::Heavy => (self.intensity * 3.0 + drop.size.index() as f32) as usize,
        };
        let surface = surface_y(self.puddles[column]);

        for _ in 0..count {
            let life = self.rng.gen_range(10..=25);
            let splash = Splash {
                x: drop.x,
                y: surface,
                vx: self.rng.gen_range(-1.0f32..1.0) * strength * 0.2,
                vy: -self.rng.gen_range(0.5f32..1.0) * strength * 0.3,
                life,
                max_life: life,
                color: drop.color,
            };
            if self.splashes.push(splash).is_err() {
                break;
            }
        }

        self.puddles[column] = (self.puddles[column] + p.puddle_gain).min(p.puddle_max);
    }

    /// Half-width of the puddle drawn around a column of depth `depth`.
    fn puddle_half_width(
        &self,
        depth: f32,
    ) -> i32 {
        match self.profile {
            RainProfile::Light => 2,
            RainProfile::Heavy => (depth / 2.0 + 2.0).min(6.0) as i32,
        }
    }
}

/// Y coordinate of the water surface above a puddle of `depth`.
#[inline]
fn surface_y(depth: f32) -> f32 { HEIGHT_F - 1.0 - depth }

#[inline]
fn column_of(x: f32) -> usize {
    let x = x as i32;
    x.clamp(0, WIDTH as i32 - 1) as usize
}

impl Effect for Rain {
    fn tick(&mut self) {
        let p = self.profile.profile();

        for column in 0..self.timers.len() {
            self.timers[column] = self.timers[column].saturating_sub(1);
            if self.timers[column] > 0 {
                continue;
            }
            if self.rng.gen_bool(p.spawn_chance) {
                self.spawn_drop(column);
                if self.rng.gen_bool(p.double_chance) {
                    self.spawn_drop(column);
                }
            }
            self.timers[column] = self.rng.gen_range(p.timer.0..=p.timer.1);
        }

        let mut i = 0;
        while i < self.drops.len() {
            let drop = &mut self.drops[i];
            drop.y += drop.speed;
            drop.x += drop.drift;
            let column = column_of(drop.x);

            if drop.x < -5.0 || drop.x > WIDTH_F + 5.0 {
                self.drops.swap_remove(i);
            } else if drop.y >= surface_y(self.puddles[column]) {
                let drop = self.drops.swap_remove(i);
                self.splash(&drop, column);
            } else {
                i += 1;
            }
        }

        for s in self.splashes.iter_mut() {
            s.x += s.vx;
            s.y += s.vy;
            s.vy += p.gravity;
            s.life = s.life.saturating_sub(1);
        }
        self.splashes.retain(|s| s.life > 0 && s.y < HEIGHT_F);

        for depth in self.puddles.iter_mut() {
            *depth = (*depth - p.evaporation).max(0.0);
        }

        self.time = self.time.wrapping_add(1);
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let p = self.profile.profile();
        target.clear(to_565(p.background))?;

        // Puddles first so drops and splashes land on top of them.
        let puddle = to_565(p.puddle_color);
        for (x, &depth) in self.puddles.iter().enumerate() {
            if depth < 0.5 {
                continue;
            }
            let half = self.puddle_half_width(depth);
            let ripple = match self.profile {
                RainProfile::Light => 0,
                RainProfile::Heavy => ((self.time as f32 * 0.3 + x as f32 * 0.7).sin() * 1.2) as i32,
            };
            let top = HEIGHT_I - depth as i32 + ripple;
            for dx in -half..=half {
                for y in top..HEIGHT_I {
                    put_pixel(target, x as i32 + dx, y, puddle)?;
                }
            }
        }

        for drop in &self.drops {
            let color = to_565(drop.color);
            let x = drop.x as i32;
            let y = drop.y as i32;
            match (self.profile, drop.size) {
                (_, DropSize::Small) => put_pixel(target, x, y, color)?,
                (_, DropSize::Medium) => {
                    put_pixel(target, x, y, color)?;
                    put_pixel(target, x, y - 1, color)?;
                }
                (RainProfile::Light, DropSize::Large) => {
                    for dy in 0..3 {
                        put_pixel(target, x, y - dy, color)?;
                    }
                    put_pixel(target, x + 1, y - 1, color)?;
                }
                (RainProfile::Heavy, DropSize::Large) => {
                    put_pixel(target, x, y - 2, color)?;
                    put_pixel(target, x - 1, y - 1, color)?;
                    put_pixel(target, x, y - 1, color)?;
                    put_pixel(target, x + 1, y - 1, color)?;
                    put_pixel(target, x, y, color)?;
                }
            }

            if self.profile == RainProfile::Light && drop.speed > 2.5 {
                let trail = dim(drop.color, 0.4);
                put_pixel(target, x - drop.drift.signum() as i32, y - 3, trail)?;
                put_pixel(target, x - drop.drift.signum() as i32, y - 4, trail)?;
            }
        }

        for s in &self.splashes {
            let fade = s.life as f32 / s.max_life as f32;
            put_pixel(target, s.x as i32, s.y as i32, dim(s.color, fade))?;
        }
        Ok(())
    }

    fn population(&self) -> usize { self.drops.len() + self.splashes.len() }
}
