//! Time-driven color fields: spiral colors, liquid metal and color shimmer.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, PrimitiveStyle, Rectangle};
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Effect;
use crate::canvas::Canvas;
use crate::colors::{BLACK, hsv, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_I, SCREEN_HEIGHT, SCREEN_WIDTH, WIDTH_I};

/// Time advanced per tick by every field in this module.
const TIME_STEP: f32 = 0.05;

// =============================================================================
// Spiral Colors
// =============================================================================

const SPIRAL_RADII: core::ops::Range<i32> = 5..100;
const SPIRAL_SPACING: usize = 3;
/// Ticks between canvas wipes.
const SPIRAL_CYCLE: u32 = 30;

/// A rotating arm of dots whose trails pile up until the periodic wipe.
pub struct SpiralColors {
    canvas: Canvas,
    time: f32,
    frame: u32,
}

impl SpiralColors {
    pub fn new() -> Self {
        Self {
            canvas: Canvas::new(BLACK),
            time: 0.0,
            frame: 0,
        }
    }

    /// Dot centers and colors along the arm, skipping those off screen.
    fn arm(&self) -> impl Iterator<Item = (Point, Rgb565)> + '_ {
        SPIRAL_RADII.step_by(SPIRAL_SPACING).filter_map(move |r| {
            let angle = self.time * 2.0 + r as f32 * 0.2;
            let x = CENTER_X + (angle.cos() * r as f32) as i32;
            let y = CENTER_Y + (angle.sin() * r as f32) as i32;
            let on_screen = (0..WIDTH_I).contains(&x) && (0..HEIGHT_I).contains(&y);
            on_screen.then(|| (Point::new(x, y), to_565(hsv(r as f32 * 5.0 + self.time * 100.0, 1.0, 1.0))))
        })
    }
}

impl Default for SpiralColors {
    fn default() -> Self { Self::new() }
}

impl Effect for SpiralColors {
    fn tick(&mut self) {
        self.time += TIME_STEP;
        self.frame = self.frame.wrapping_add(1);
        if self.frame % SPIRAL_CYCLE == 0 {
            self.canvas.fill(BLACK);
        }

        let dots: Vec<(Point, Rgb565), 32> = self.arm().collect();
        for (center, color) in dots {
            Circle::with_center(center, 7)
                .into_styled(PrimitiveStyle::with_fill(color))
                .draw(&mut self.canvas)
                .ok();
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.canvas.blit(target)
    }

    fn population(&self) -> usize { self.arm().count() }
}

// =============================================================================
// Liquid Metal
// =============================================================================

const METAL_BLOCK: u32 = 3;

/// Interfering sine ripples shaded in molten copper, drawn in 3x3 blocks.
pub struct LiquidMetal {
    time: f32,
}

impl LiquidMetal {
    pub fn new() -> Self { Self { time: 0.0 } }

    /// Brightness of the block containing `(x, y)`.
    pub fn intensity(
        &self,
        x: u32,
        y: u32,
    ) -> u8 {
        let (bx, by) = ((x / METAL_BLOCK * METAL_BLOCK) as f32, (y / METAL_BLOCK * METAL_BLOCK) as f32);
        let wave = (bx * 0.2 + self.time * 2.0).sin() * (by * 0.15 + self.time * 1.5).cos();
        ((wave + 1.0) * 127.0).clamp(0.0, 255.0) as u8
    }
}

impl Default for LiquidMetal {
    fn default() -> Self { Self::new() }
}

fn metal(intensity: u8) -> Rgb565 { to_565(Rgb888::new(intensity, intensity / 2, intensity / 4)) }

impl Effect for LiquidMetal {
    fn tick(&mut self) { self.time += TIME_STEP; }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let area = Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
        let colors = (0..SCREEN_HEIGHT).flat_map(|y| (0..SCREEN_WIDTH).map(move |x| metal(self.intensity(x, y))));
        target.fill_contiguous(&area, colors)
    }

    fn population(&self) -> usize { ((SCREEN_WIDTH / METAL_BLOCK + 1) * (SCREEN_HEIGHT / METAL_BLOCK + 1)) as usize }
}

// =============================================================================
// Color Shimmer
// =============================================================================

const SHIMMER_BLOCK: u32 = 2;
const SPARKLE_TRIES: usize = 15;

/// Three layers of sine noise mapped to hue, saturation and value, with
/// sparkles flaring on top.
pub struct ColorShimmer {
    rng: SmallRng,
    time: f32,
    hue_offset: f32,
    sparkles: Vec<(Point, Rgb565), SPARKLE_TRIES>,
}

impl ColorShimmer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            time: 0.0,
            hue_offset: 0.0,
            sparkles: Vec::new(),
        }
    }

    /// Combined noise in `-1.0..=1.0` for the block containing `(x, y)`.
    pub fn noise(
        &self,
        x: u32,
        y: u32,
    ) -> f32 {
        let t = self.time;
        let x = (x / SHIMMER_BLOCK * SHIMMER_BLOCK) as f32;
        let y = (y / SHIMMER_BLOCK * SHIMMER_BLOCK) as f32;
        let n1 = (x * 0.1 + t * 3.0).sin() * (y * 0.08 + t * 2.5).cos();
        let n2 = (x * 0.15 - t * 2.0).sin() * (y * 0.12 + t * 1.8).sin();
        let n3 = (x * 0.05 + t * 4.0).cos() * (y * 0.06 - t * 3.2).cos();
        (n1 + n2 + n3) / 3.0
    }

    fn shade(
        &self,
        x: u32,
        y: u32,
    ) -> Rgb565 {
        let n = self.noise(x, y);
        let (bx, by) = (x / SHIMMER_BLOCK * SHIMMER_BLOCK, y / SHIMMER_BLOCK * SHIMMER_BLOCK);
        let hue = self.hue_offset + n * 180.0 + (bx + by) as f32 * 2.0;
        to_565(hsv(hue, 0.8 + n * 0.2, 0.4 + (n + 1.0) * 0.3))
    }
}

impl Effect for ColorShimmer {
    fn tick(&mut self) {
        self.time += TIME_STEP;
        self.hue_offset = (self.hue_offset + 2.0) % 360.0;

        self.sparkles.clear();
        for i in 0..SPARKLE_TRIES {
            let at = Point::new(self.rng.gen_range(0..WIDTH_I), self.rng.gen_range(0..HEIGHT_I));
            let i = i as f32;
            let flare = (self.time * 5.0 + i).sin() + (self.time * 3.7 + i * 1.3).cos();
            if flare > 1.2 {
                let color = to_565(hsv(self.hue_offset + i * 25.0, 1.0, 1.0));
                self.sparkles.push((at, color)).ok();
            }
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let area = Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
        let colors = (0..SCREEN_HEIGHT).flat_map(|y| (0..SCREEN_WIDTH).map(move |x| self.shade(x, y)));
        target.fill_contiguous(&area, colors)?;

        for &(center, color) in &self.sparkles {
            Circle::with_center(center, 5)
                .into_styled(PrimitiveStyle::with_fill(color))
                .draw(target)?;
        }
        Ok(())
    }

    fn population(&self) -> usize { self.sparkles.len() }
}
