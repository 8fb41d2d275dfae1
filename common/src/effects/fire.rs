//! Fire effects.
//!
//! [`Flames`] is a particle fire: embers rise from the bottom edge, cool from
//! pale yellow to dark red as they age, and are drawn as small teardrops.
//! [`Campfire`] animates five fixed flame tongues built from stacked ellipses,
//! with sparks and a warm glow under the logs.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Ellipse, PrimitiveStyle};
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, noise, put_pixel};
use crate::colors::{BLACK, add, scale, to_565};
use crate::config::{HEIGHT_F, HEIGHT_I, PIXEL_COUNT, SCREEN_WIDTH, WIDTH_I};

// =============================================================================
// Simple Flames
// =============================================================================

const MAX_FLAMES: usize = 128;

/// Coolest to hottest.
const FLAME_PALETTE: [Rgb888; 10] = [
    Rgb888::new(139, 0, 0),
    Rgb888::new(178, 34, 34),
    Rgb888::new(220, 20, 60),
    Rgb888::new(255, 0, 0),
    Rgb888::new(255, 69, 0),
    Rgb888::new(255, 140, 0),
    Rgb888::new(255, 165, 0),
    Rgb888::new(255, 215, 0),
    Rgb888::new(255, 255, 0),
    Rgb888::new(255, 255, 224),
];

#[derive(Clone, Copy, Debug)]
struct Ember {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    life: u8,
    max_life: u8,
    size: i32,
}

impl Ember {
    fn color(&self) -> Rgb888 {
        let heat = self.life as f32 / self.max_life as f32;
        let index = ((heat * FLAME_PALETTE.len() as f32) as usize).min(FLAME_PALETTE.len() - 1);
        FLAME_PALETTE[index]
    }
}

/// Particle flames rising from the bottom edge.
pub struct Flames {
    rng: SmallRng,
    embers: Vec<Ember, MAX_FLAMES>,
}

impl Flames {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            embers: Vec::new(),
        }
    }

    fn spawn(&mut self) {
        let life = self.rng.gen_range(30..=60);
        let ember = Ember {
            x: self.rng.gen_range(20.0..(WIDTH_I - 20) as f32),
            y: HEIGHT_F - 1.0,
            vx: self.rng.gen_range(-0.5..0.5),
            vy: self.rng.gen_range(-3.0..-1.5),
            life,
            max_life: life,
            size: self.rng.gen_range(1..=3),
        };
        self.embers.push(ember).ok();
    }
}

impl Effect for Flames {
    fn tick(&mut self) {
        if self.rng.gen_bool(0.7) {
            self.spawn();
        }

        for ember in self.embers.iter_mut() {
            ember.y += ember.vy;
            ember.x += ember.vx;
            ember.vx = (ember.vx + self.rng.gen_range(-0.1f32..0.1)).clamp(-1.0, 1.0);
            ember.life = ember.life.saturating_sub(1);
        }
        self.embers.retain(|e| e.life > 0 && e.y >= -10.0);
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(BLACK)?;

        // Overlapping embers keep the brighter pixel.
        let mut lit = [0u16; PIXEL_COUNT];

        for ember in &self.embers {
            if ember.y < 0.0 || ember.y > HEIGHT_F {
                continue;
            }
            let color = ember.color();
            let (x, y) = (ember.x as i32, ember.y as i32);
            let size = ember.size;

            for dy in -size..=0 {
                for dx in -size..=size {
                    let dist = dx.abs() as f32 + dy.abs() as f32 * 0.5;
                    if dist > size as f32 {
                        continue;
                    }
                    let (px, py) = (x + dx, y + dy);
                    if px < 0 || px >= WIDTH_I || py < 0 || py >= HEIGHT_I {
                        continue;
                    }
                    let faded = if dx == 0 && dy == 0 { color } else { scale(color, 1.0 - dist / size as f32) };
                    let sum = faded.r() as u16 + faded.g() as u16 + faded.b() as u16;
                    let slot = &mut lit[py as usize * SCREEN_WIDTH as usize + px as usize];
                    if sum > *slot {
                        *slot = sum;
                        put_pixel(target, px, py, to_565(faded))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.embers.len() }
}

// =============================================================================
// Campfire
// =============================================================================

const TONGUES: usize = 5;
const MAX_SPARKS: usize = 3;
const FIRE_BASE_Y: i32 = HEIGHT_I - 10;
const SEGMENT_HEIGHT: u32 = 6;

const CAMPFIRE_BG: Rgb888 = Rgb888::new(5, 5, 15);

/// Embers at the base up to yellow tips.
const CAMPFIRE_PALETTE: [Rgb888; 8] = [
    Rgb888::new(60, 0, 0),
    Rgb888::new(120, 0, 0),
    Rgb888::new(180, 0, 0),
    Rgb888::new(255, 50, 0),
    Rgb888::new(255, 100, 0),
    Rgb888::new(255, 150, 0),
    Rgb888::new(255, 200, 50),
    Rgb888::new(255, 255, 100),
];

const SPARK_COLORS: [Rgb888; 3] = [
    Rgb888::new(255, 100, 0),
    Rgb888::new(255, 150, 50),
    Rgb888::new(255, 200, 100),
];

#[derive(Clone, Copy, Debug)]
struct Tongue {
    x: i32,
    base_height: f32,
    height: i32,
    phase: f32,
    speed: f32,
    width: f32,
}

#[derive(Clone, Copy, Debug)]
struct Spark {
    x: i32,
    y: i32,
    color: Rgb888,
}

/// Five flickering flame tongues over a glowing base.
pub struct Campfire {
    rng: SmallRng,
    tongues: [Tongue; TONGUES],
    sparks: Vec<Spark, MAX_SPARKS>,
    flicker_seed: u32,
}

impl Campfire {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut tongues = [Tongue {
            x: 0,
            base_height: 0.0,
            height: 0,
            phase: 0.0,
            speed: 0.0,
            width: 0.0,
        }; TONGUES];

        for (i, tongue) in tongues.iter_mut().enumerate() {
            *tongue = Tongue {
                x: 30 + i as i32 * 15,
                base_height: rng.gen_range(20..=40) as f32,
                height: 0,
                phase: rng.gen_range(0.0..core::f32::consts::TAU),
                speed: rng.gen_range(0.1..0.3),
                width: rng.gen_range(8..=15) as f32,
            };
        }

        Self {
            rng,
            tongues,
            sparks: Vec::new(),
            flicker_seed: seed as u32,
        }
    }

    /// Current flame heights in pixels.
    pub fn heights(&self) -> [i32; TONGUES] { self.tongues.map(|t| t.height) }
}

impl Effect for Campfire {
    fn tick(&mut self) {
        for tongue in self.tongues.iter_mut() {
            tongue.phase += tongue.speed;
            let flicker = 0.7 + 0.3 * tongue.phase.sin();
            tongue.height = (tongue.base_height * flicker) as i32;
        }

        self.sparks.clear();
        if self.rng.gen_bool(0.1) {
            for _ in 0..self.rng.gen_range(1..=MAX_SPARKS) {
                let spark = Spark {
                    x: self.rng.gen_range(20..WIDTH_I - 20),
                    y: self.rng.gen_range(FIRE_BASE_Y - 30..FIRE_BASE_Y - 10),
                    color: SPARK_COLORS[self.rng.gen_range(0..SPARK_COLORS.len())],
                };
                self.sparks.push(spark).ok();
            }
        }

        self.flicker_seed = self.rng.r#gen();
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(to_565(CAMPFIRE_BG))?;

        for (t, tongue) in self.tongues.iter().enumerate() {
            let segments = tongue.height / 4;
            for i in 0..segments {
                let y = FIRE_BASE_Y - i * 4;
                if y <= 0 {
                    continue;
                }
                let rise = i as f32 / segments as f32;
                let width = tongue.width * (1.0 - rise * 0.7);
                let index = ((rise * CAMPFIRE_PALETTE.len() as f32) as usize).min(CAMPFIRE_PALETTE.len() - 1);
                let flicker = 0.8 + 0.2 * noise(self.flicker_seed, t as i32, i);
                let color = to_565(scale(CAMPFIRE_PALETTE[index], flicker));

                let half = (width / 2.0) as i32;
                let top_left = Point::new(tongue.x - half, y - SEGMENT_HEIGHT as i32 / 2);
                let size = Size::new((half * 2 + 1) as u32, SEGMENT_HEIGHT + 1);
                Ellipse::new(top_left, size)
                    .into_styled(PrimitiveStyle::with_fill(color))
                    .draw(target)?;
            }
        }

        for spark in &self.sparks {
            put_pixel(target, spark.x, spark.y, to_565(spark.color))?;
        }

        let glow_y = FIRE_BASE_Y + 5;
        let center = WIDTH_I / 2;
        for x in 0..WIDTH_I {
            let dist = (x - center).abs();
            if dist < center {
                let intensity = 1.0 - dist as f32 / center as f32;
                let glow = Rgb888::new((40.0 * intensity) as u8, (10.0 * intensity) as u8, 0);
                put_pixel(target, x, glow_y, to_565(add(CAMPFIRE_BG, glow)))?;
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { TONGUES + self.sparks.len() }
}
