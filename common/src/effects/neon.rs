//! Neon rain: tiny glowing shapes on a 3 px column grid.
//!
//! Each column leans green, blue, or mixed. Color and shape are chosen when a
//! particle spawns and never change, so the particle only moves and fades.

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, put_pixel};
use crate::colors::{BLACK, dim};
use crate::config::{HEIGHT_F, SCREEN_WIDTH};

const SPACING: u32 = 3;
const COLUMNS: usize = (SCREEN_WIDTH / SPACING) as usize;
const MAX_PARTICLES: usize = 512;
const FADE: u8 = 4;

const GREEN_PALETTE: [Rgb888; 5] = [
    Rgb888::new(0, 255, 0),
    Rgb888::new(50, 255, 50),
    Rgb888::new(0, 255, 100),
    Rgb888::new(100, 255, 0),
    Rgb888::new(0, 200, 0),
];

const BLUE_PALETTE: [Rgb888; 5] = [
    Rgb888::new(0, 100, 255),
    Rgb888::new(0, 150, 255),
    Rgb888::new(50, 200, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(100, 150, 255),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Bias {
    Green,
    Blue,
    Mixed,
}

/// Pixel offsets making up each tiny shape.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Shape {
    Dot,
    Plus,
    Square,
    Dash,
    Slash,
}

impl Shape {
    const fn offsets(self) -> &'static [(i32, i32)] {
        match self {
            Self::Dot => &[(0, 0)],
            Self::Plus => &[(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)],
            Self::Square => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::Dash => &[(0, 0), (0, 1), (0, 2)],
            Self::Slash => &[(0, 0), (1, -1), (-1, 1)],
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Particle {
    x: i32,
    y: f32,
    speed: f32,
    brightness: u8,
    color: Rgb888,
    shape: Shape,
}

/// Neon rain simulation.
pub struct NeonRain {
    rng: SmallRng,
    biases: [Bias; COLUMNS],
    timers: [u8; COLUMNS],
    particles: Vec<Particle, MAX_PARTICLES>,
}

impl NeonRain {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut biases = [Bias::Green; COLUMNS];
        let mut timers = [0; COLUMNS];
        for (bias, timer) in biases.iter_mut().zip(timers.iter_mut()) {
            *bias = match rng.gen_range(0..10) {
                0..=6 => Bias::Green,
                7 | 8 => Bias::Blue,
                _ => Bias::Mixed,
            };
            *timer = rng.gen_range(0..=10);
        }

        Self {
            rng,
            biases,
            timers,
            particles: Vec::new(),
        }
    }

    fn spawn(
        &mut self,
        column: usize,
    ) {
        let blue = match self.biases[column] {
            Bias::Green => false,
            Bias::Blue => true,
            Bias::Mixed => self.rng.gen_bool(0.5),
        };
        let palette = if blue { &BLUE_PALETTE } else { &GREEN_PALETTE };
        let shape = if self.rng.gen_bool(0.3) {
            Shape::Dot
        } else {
            match self.rng.gen_range(0..4) {
                0 => Shape::Plus,
                1 => Shape::Square,
                2 => Shape::Dash,
                _ => Shape::Slash,
            }
        };

        let particle = Particle {
            x: (column as u32 * SPACING + 1) as i32,
            y: self.rng.gen_range(-5.0..-1.0),
            speed: self.rng.gen_range(0.5..2.5),
            brightness: 255,
            color: palette[self.rng.gen_range(0..palette.len())],
            shape,
        };
        self.particles.push(particle).ok();
    }
}

impl Effect for NeonRain {
    fn tick(&mut self) {
        for column in 0..COLUMNS {
            self.timers[column] = self.timers[column].saturating_sub(1);
            if self.timers[column] == 0 {
                self.spawn(column);
                self.timers[column] = self.rng.gen_range(3..=12);
            }
        }

        for p in self.particles.iter_mut() {
            p.y += p.speed;
            p.brightness = p.brightness.saturating_sub(FADE);
        }
        self.particles.retain(|p| p.y <= HEIGHT_F + 5.0 && p.brightness > 0);
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(BLACK)?;
        for p in &self.particles {
            let color = dim(p.color, p.brightness as f32 / 255.0);
            let y = p.y as i32;
            for &(dx, dy) in p.shape.offsets() {
                put_pixel(target, p.x + dx, y + dy, color)?;
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.particles.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::assert_never_brightens;

    #[test]
    fn test_column_biases_lean_green() {
        let neon = NeonRain::new(4);
        let green = neon.biases.iter().filter(|&&b| b == Bias::Green).count();
        assert!(green > COLUMNS / 3);
    }

    #[test]
    fn test_blue_columns_spawn_blue() {
        let mut neon = NeonRain::new(8);
        neon.biases = [Bias::Blue; COLUMNS];
        for column in 0..COLUMNS {
            neon.spawn(column);
        }
        assert!(neon.particles.iter().all(|p| BLUE_PALETTE.contains(&p.color)));
    }

    #[test]
    fn test_particles_leave_screen() {
        let mut neon = NeonRain::new(1);
        for _ in 0..500 {
            neon.tick();
            assert!(neon.particles.iter().all(|p| p.y <= HEIGHT_F + 5.0));
        }
        assert!(neon.population() > 0);
    }

    #[test]
    fn test_particles_never_brighten() {
        let mut neon = NeonRain::new(13);
        assert_never_brightens(400, || {
            neon.tick();
            neon.particles
                .iter()
                .map(|p| (((p.x as u64) << 32) | u64::from(p.speed.to_bits()), p.brightness))
                .collect::<std::vec::Vec<_>>()
        });
    }
}
