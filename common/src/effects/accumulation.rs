//! Glyphs that fall and pile up over hours.
//!
//! Both paces spawn a glyph with a chance that grows with elapsed time. A
//! glyph falls until it lands on the floor or on the pile in its pixel column
//! and then stays there, slowly dimming as it ages.
//!
//! Elapsed time is counted in ticks and converted with the nominal frame
//! delay, so the simulation never reads a clock.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, draw_glyph, noise};
use crate::colors::{BLACK, hsv, scale, to_565};
use crate::config::{HEIGHT_F, HEIGHT_I, PIXEL_COUNT, SCREEN_HEIGHT, SCREEN_WIDTH, WIDTH_I};

const MAX_FALLING: usize = 256;

const MEDIUM_SYMBOLS: &[u8] = b".*o+x#@%&^~=:";
const MEDIUM_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SLOW_GLYPHS: &[u8] = b".,:;'`*o";
const SLOW_RARE: &[u8] = b"*+#@<>^";

const MS_PER_HOUR: f32 = 3_600_000.0;

/// How fast glyphs accumulate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimerPace {
    /// Visible build-up over a few hours.
    Medium,
    /// Dust-like build-up over a whole day.
    AllDay,
}

impl TimerPace {
    const fn frame_ms(self) -> u32 {
        match self {
            Self::Medium => 167,
            Self::AllDay => 1000,
        }
    }

    fn spawn_chance(
        self,
        hours: f32,
    ) -> f32 {
        let chance = match self {
            Self::Medium => 0.3 + hours * 0.1,
            Self::AllDay => 0.05 + hours * 0.01,
        };
        chance.min(1.0)
    }

    const fn bottom_margin(self) -> f32 {
        match self {
            Self::Medium => 10.0,
            Self::AllDay => 20.0,
        }
    }
}

/// Color of a glyph born `hours` into the all-day run.
///
/// Moves from dawn purples through day blues and evening greens to night
/// oranges once every 24 hours.
pub fn day_curve(hours: f32) -> Rgb888 {
    let progress = (hours / 24.0) % 1.0;
    let (r, g, b) = if progress < 0.25 {
        let p = progress * 4.0;
        (100.0 + p * 50.0, 50.0 + p * 100.0, 150.0 + p * 100.0)
    } else if progress < 0.5 {
        let p = (progress - 0.25) * 4.0;
        (150.0 - p * 100.0, 150.0 + p * 50.0, 250.0 - p * 100.0)
    } else if progress < 0.75 {
        let p = (progress - 0.5) * 4.0;
        (50.0 + p * 150.0, 200.0 - p * 50.0, 150.0 - p * 100.0)
    } else {
        let p = (progress - 0.75) * 4.0;
        (200.0 - p * 100.0, 150.0 - p * 100.0, 50.0 + p * 100.0)
    };
    Rgb888::new(r as u8, g as u8, b as u8)
}

// =============================================================================
// Simulation State
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct Falling {
    glyph: u8,
    x: i32,
    y: f32,
    speed: f32,
    color: Rgb888,
}

/// One pixel of the accumulation grid. `glyph == 0` marks an empty cell.
#[derive(Clone, Copy, Debug)]
struct Cell {
    glyph: u8,
    rgb: [u8; 3],
    settled_tick: u32,
}

const EMPTY: Cell = Cell {
    glyph: 0,
    rgb: [0; 3],
    settled_tick: 0,
};

/// Accumulating glyph rain.
pub struct TimerRain {
    pace: TimerPace,
    rng: SmallRng,
    falling: Vec<Falling, MAX_FALLING>,
    grid: [Cell; PIXEL_COUNT],
    /// Settled pixels per column; the pile top is `HEIGHT - 1 - heights[x]`.
    heights: [u8; SCREEN_WIDTH as usize],
    settled: usize,
    time: u32,
    shimmer_seed: u32,
}

impl TimerRain {
    pub fn new(
        pace: TimerPace,
        seed: u64,
    ) -> Self {
        Self {
            pace,
            rng: SmallRng::seed_from_u64(seed),
            falling: Vec::new(),
            grid: [EMPTY; PIXEL_COUNT],
            heights: [0; SCREEN_WIDTH as usize],
            settled: 0,
            time: 0,
            shimmer_seed: seed as u32,
        }
    }

    /// Hours represented by the ticks simulated so far.
    pub fn elapsed_hours(&self) -> f32 { self.time as f32 * self.pace.frame_ms() as f32 / MS_PER_HOUR }

    fn spawn(
        &mut self,
        hours: f32,
    ) {
        let falling = match self.pace {
            TimerPace::Medium => {
                let set = if self.rng.gen_bool(0.7) { MEDIUM_SYMBOLS } else { MEDIUM_LETTERS };
                let jitter: f32 = self.rng.gen_range(-1.0..1.0);
                Falling {
                    glyph: set[self.rng.gen_range(0..set.len())],
                    x: self.rng.gen_range(0..=WIDTH_I - 6),
                    y: self.rng.gen_range(-20..=-5) as f32,
                    speed: self.rng.gen_range(0.2..1.5),
                    color: hsv((hours + jitter) * 15.0, 0.8, 0.9),
                }
            }
            TimerPace::AllDay => {
                let set = if self.rng.gen_bool(0.1) { SLOW_RARE } else { SLOW_GLYPHS };
                Falling {
                    glyph: set[self.rng.gen_range(0..set.len())],
                    x: self.rng.gen_range(0..=WIDTH_I - 4),
                    y: self.rng.gen_range(-30..=-5) as f32,
                    speed: self.rng.gen_range(0.1..0.8),
                    color: day_curve(hours),
                }
            }
        };
        self.falling.push(falling).ok();
    }

    /// Store a landed glyph at the top of its column's pile.
    fn settle(
        &mut self,
        falling: &Falling,
        y: i32,
    ) {
        if y < 0 {
            return;
        }
        let column = falling.x as usize;
        self.grid[y as usize * SCREEN_WIDTH as usize + column] = Cell {
            glyph: falling.glyph,
            rgb: [falling.color.r(), falling.color.g(), falling.color.b()],
            settled_tick: self.time,
        };
        self.heights[column] = self.heights[column].saturating_add(1);
        self.settled += 1;
    }

    fn rest_y(
        &self,
        x: i32,
    ) -> i32 {
        HEIGHT_I - 1 - self.heights[x as usize] as i32
    }

    fn settled_color(
        &self,
        cell: &Cell,
        x: i32,
        y: i32,
    ) -> Rgb565 {
        let color = Rgb888::new(cell.rgb[0], cell.rgb[1], cell.rgb[2]);
        let age_ticks = self.time.wrapping_sub(cell.settled_tick);
        match self.pace {
            TimerPace::Medium => {
                let age = (age_ticks as f32 / 300.0).min(1.0);
                to_565(scale(color, 1.0 - age * 0.3))
            }
            TimerPace::AllDay => {
                let age_hours = age_ticks as f32 * self.pace.frame_ms() as f32 / MS_PER_HOUR;
                let age = (age_hours / 12.0).min(0.5);
                let shimmer = 0.8 + 0.4 * noise(self.shimmer_seed, x, y);
                to_565(scale(color, (1.0 - age) * shimmer))
            }
        }
    }
}

impl Effect for TimerRain {
    fn tick(&mut self) {
        let hours = self.elapsed_hours();
        let chance = self.pace.spawn_chance(hours);
        if self.rng.r#gen::<f32>() < chance {
            self.spawn(hours);
        }

        let bottom = HEIGHT_F + self.pace.bottom_margin();
        let mut i = 0;
        while i < self.falling.len() {
            self.falling[i].y += self.falling[i].speed;
            let falling = self.falling[i];
            let rest = self.rest_y(falling.x);

            if falling.y >= rest as f32 {
                self.falling.swap_remove(i);
                self.settle(&falling, rest);
            } else if falling.y > bottom {
                self.falling.swap_remove(i);
            } else {
                i += 1;
            }
        }

        self.time = self.time.wrapping_add(1);
        self.shimmer_seed = self.shimmer_seed.wrapping_mul(0x0101_0101).wrapping_add(0x9E37_79B9);
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(BLACK)?;

        for y in 0..SCREEN_HEIGHT as i32 {
            for x in 0..WIDTH_I {
                let cell = &self.grid[y as usize * SCREEN_WIDTH as usize + x as usize];
                if cell.glyph != 0 {
                    let color = self.settled_color(cell, x, y);
                    draw_glyph(target, cell.glyph as char, x, y, color)?;
                }
            }
        }

        for falling in &self.falling {
            if falling.y >= 0.0 && falling.y <= HEIGHT_F {
                draw_glyph(target, falling.glyph as char, falling.x, falling.y as i32, to_565(falling.color))?;
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.settled + self.falling.len() }
}
