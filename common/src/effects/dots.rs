//! Ultra-dense single pixel rain, optionally piling up and dripping.
//!
//! Plain micro dots fall and fade like the glyph rain, only one pixel wide and
//! on a 2 px grid. In the dripping variant a dot that reaches the floor (or the
//! top of its column's pile) settles there. Settled dots age every
//! [`AGE_INTERVAL`] ticks and occasionally let go, dripping out through the
//! bottom edge.

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use heapless::{Deque, Vec};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, put_pixel};
use crate::colors::{BLACK, dim};
use crate::config::{HEIGHT_F, HEIGHT_I, SCREEN_HEIGHT, SCREEN_WIDTH};

const SPACING: u32 = 2;
const COLUMNS: usize = (SCREEN_WIDTH / SPACING) as usize;
const MAX_DOTS: usize = 1024;
const MAX_DRIPS: usize = 128;

/// Tallest pile a column may hold before its oldest dot is dropped.
const PILE_LIMIT: usize = (SCREEN_HEIGHT / 3) as usize;

/// Ticks between aging passes over the piles.
pub const AGE_INTERVAL: u32 = 10;

const GREEN_PALETTE: [Rgb888; 5] = [
    Rgb888::new(0, 255, 0),
    Rgb888::new(50, 255, 50),
    Rgb888::new(0, 255, 100),
    Rgb888::new(100, 255, 0),
    Rgb888::new(0, 200, 50),
];

const BLUE_PALETTE: [Rgb888; 5] = [
    Rgb888::new(0, 100, 255),
    Rgb888::new(0, 150, 255),
    Rgb888::new(50, 200, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(100, 150, 255),
];

#[derive(Clone, Copy, Debug)]
struct Dot {
    column: u8,
    y: f32,
    speed: f32,
    brightness: u8,
    color: Rgb888,
}

#[derive(Clone, Copy, Debug)]
struct Settled {
    brightness: u8,
    color: Rgb888,
    age: u16,
    drip_chance: f32,
}

struct Column {
    intensity: f32,
    timer: u8,
    pile: Deque<Settled, PILE_LIMIT>,
}

/// Micro dot simulation.
pub struct MicroDots {
    dripping: bool,
    rng: SmallRng,
    columns: Vec<Column, COLUMNS>,
    dots: Vec<Dot, MAX_DOTS>,
    drips: Vec<Dot, MAX_DRIPS>,
    time: u32,
}

impl MicroDots {
    /// Create the simulation; `dripping` enables piling and dripping.
    pub fn new(
        dripping: bool,
        seed: u64,
    ) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut columns = Vec::new();
        for _ in 0..COLUMNS {
            let column = Column {
                intensity: rng.gen_range(0.3..1.0),
                timer: rng.gen_range(0..=8),
                pile: Deque::new(),
            };
            columns.push(column).ok();
        }

        Self {
            dripping,
            rng,
            columns,
            dots: Vec::new(),
            drips: Vec::new(),
            time: 0,
        }
    }

    const fn fade(&self) -> u8 { if self.dripping { 3 } else { 5 } }

    fn spawn(
        &mut self,
        column: usize,
    ) {
        let palette = if self.rng.gen_bool(0.7) { &GREEN_PALETTE } else { &BLUE_PALETTE };
        let dot = Dot {
            column: column as u8,
            y: self.rng.gen_range(-3.0..0.0),
            speed: self.rng.gen_range(0.3f32..1.8) * self.columns[column].intensity,
            brightness: 255,
            color: palette[self.rng.gen_range(0..palette.len())],
        };
        self.dots.push(dot).ok();
    }

    /// Y coordinate where the next dot in `column` comes to rest.
    fn rest_y(
        &self,
        column: usize,
    ) -> f32 {
        HEIGHT_F - 1.0 - self.columns[column].pile.len() as f32
    }

    fn settle(
        &mut self,
        dot: &Dot,
    ) {
        let settled = Settled {
            brightness: dot.brightness,
            color: dot.color,
            age: 0,
            drip_chance: self.rng.gen_range(0.001..0.005),
        };
        let pile = &mut self.columns[dot.column as usize].pile;
        if pile.is_full() {
            pile.pop_front();
        }
        pile.push_back(settled).ok();
    }

    /// Age every settled dot and release the ones that drip.
    fn age_piles(&mut self) {
        for column in 0..self.columns.len() {
            let mut index = 0;
            while index < self.columns[column].pile.len() {
                let roll: f32 = self.rng.r#gen();
                let pile = &mut self.columns[column].pile;
                let Some(settled) = pile.iter_mut().nth(index) else {
                    break;
                };
                settled.age = settled.age.saturating_add(1);
                let chance = settled.drip_chance * (1.0 + settled.age as f32 * 0.01);
                if roll >= chance {
                    index += 1;
                    continue;
                }

                let settled = *settled;
                remove_at(pile, index);
                let drip = Dot {
                    column: column as u8,
                    y: HEIGHT_F - 1.0 - index as f32,
                    speed: self.rng.gen_range(0.5..1.5),
                    brightness: settled.brightness.max(100),
                    color: settled.color,
                };
                self.drips.push(drip).ok();
            }
        }
    }
}

/// Remove the element at `index` from a deque, keeping the order of the rest.
fn remove_at<T, const N: usize>(
    deque: &mut Deque<T, N>,
    index: usize,
) {
    let len = deque.len();
    for _ in 0..index {
        if let Some(item) = deque.pop_front() {
            deque.push_back(item).ok();
        }
    }
    deque.pop_front();
    for _ in index + 1..len {
        if let Some(item) = deque.pop_front() {
            deque.push_back(item).ok();
        }
    }
}

impl Effect for MicroDots {
    fn tick(&mut self) {
        for column in 0..self.columns.len() {
            let timer = &mut self.columns[column].timer;
            *timer = timer.saturating_sub(1);
            if *timer == 0 {
                if self.rng.gen_bool(0.8) {
                    self.spawn(column);
                }
                self.columns[column].timer = self.rng.gen_range(2..=8);
            }
        }

        let fade = self.fade();
        let mut i = 0;
        while i < self.dots.len() {
            let dot = &mut self.dots[i];
            dot.y += dot.speed;
            dot.brightness = dot.brightness.saturating_sub(fade);
            let dot = *dot;

            if dot.brightness == 0 {
                self.dots.swap_remove(i);
            } else if self.dripping && dot.y >= self.rest_y(dot.column as usize) {
                self.dots.swap_remove(i);
                self.settle(&dot);
            } else if dot.y > HEIGHT_F + 3.0 {
                self.dots.swap_remove(i);
            } else {
                i += 1;
            }
        }

        if self.dripping {
            for drip in self.drips.iter_mut() {
                drip.y += drip.speed;
            }
            self.drips.retain(|d| d.y <= HEIGHT_F + 10.0);

            if self.time % AGE_INTERVAL == 0 {
                self.age_piles();
            }
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
        target.clear(BLACK)?;

        for dot in &self.dots {
            let x = (dot.column as u32 * SPACING) as i32;
            let y = dot.y as i32;
            let f = dot.brightness as f32 / 255.0;
            put_pixel(target, x, y, dim(dot.color, f))?;
            if dot.brightness > 150 {
                put_pixel(target, x + 1, y, dim(dot.color, f * 0.3))?;
            }
        }

        for (column, state) in self.columns.iter().enumerate() {
            let x = (column as u32 * SPACING) as i32;
            for (depth, settled) in state.pile.iter().enumerate() {
                let f = settled.brightness as f32 / 255.0;
                put_pixel(target, x, HEIGHT_I - 1 - depth as i32, dim(settled.color, f))?;
            }
        }

        for drip in &self.drips {
            let x = (drip.column as u32 * SPACING) as i32;
            let f = drip.brightness as f32 / 255.0;
            put_pixel(target, x, drip.y as i32, dim(drip.color, f))?;
        }
        Ok(())
    }

    fn population(&self) -> usize {
        let piled: usize = self.columns.iter().map(|c| c.pile.len()).sum();
        self.dots.len() + self.drips.len() + piled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::assert_never_brightens;

    fn settled(brightness: u8) -> Settled {
        Settled {
            brightness,
            color: GREEN_PALETTE[0],
            age: 0,
            drip_chance: 0.0,
        }
    }

    #[test]
    fn test_plain_dots_never_pile() {
        let mut dots = MicroDots::new(false, 3);
        for _ in 0..2000 {
            dots.tick();
        }
        assert!(dots.columns.iter().all(|c| c.pile.is_empty()));
        assert!(dots.dots.iter().all(|d| d.y <= HEIGHT_F + 3.0));
    }

    #[test]
    fn test_dripping_dots_pile_up() {
        let mut dots = MicroDots::new(true, 3);
        for _ in 0..3000 {
            dots.tick();
        }
        assert!(dots.columns.iter().any(|c| !c.pile.is_empty()));
        assert!(dots.columns.iter().all(|c| c.pile.len() <= PILE_LIMIT));
    }

    #[test]
    fn test_full_pile_drops_oldest() {
        let mut dots = MicroDots::new(true, 1);
        for i in 0..PILE_LIMIT {
            dots.columns[0].pile.push_back(settled(i as u8 + 1)).ok();
        }
        let dot = Dot {
            column: 0,
            y: 0.0,
            speed: 1.0,
            brightness: 250,
            color: GREEN_PALETTE[1],
        };
        dots.settle(&dot);
        let pile = &dots.columns[0].pile;
        assert_eq!(pile.len(), PILE_LIMIT);
        assert_eq!(pile.front().map(|s| s.brightness), Some(2));
        assert_eq!(pile.back().map(|s| s.brightness), Some(250));
    }

    #[test]
    fn test_drip_starts_at_its_pile_position() {
        let mut dots = MicroDots::new(true, 1);
        dots.columns[4].pile.push_back(settled(60)).ok();
        let mut leaving = settled(60);
        leaving.drip_chance = 2.0;
        dots.columns[4].pile.push_back(leaving).ok();
        dots.columns[4].pile.push_back(settled(60)).ok();

        dots.age_piles();

        assert_eq!(dots.columns[4].pile.len(), 2);
        let drip = dots.drips.iter().find(|d| d.column == 4).copied();
        let drip = drip.expect("dot should drip");
        assert_eq!(drip.y, HEIGHT_F - 2.0);
        assert_eq!(drip.brightness, 100);
    }

    #[test]
    fn test_remove_at_keeps_order() {
        let mut deque: Deque<u8, 8> = Deque::new();
        for i in 0..5 {
            deque.push_back(i).ok();
        }
        remove_at(&mut deque, 2);
        let items: std::vec::Vec<u8> = deque.iter().copied().collect();
        assert_eq!(items, [0, 1, 3, 4]);
    }

    #[test]
    fn test_falling_dots_never_brighten() {
        for dripping in [false, true] {
            let mut dots = MicroDots::new(dripping, 17);
            assert_never_brightens(400, || {
                dots.tick();
                dots.dots
                    .iter()
                    .map(|d| ((u64::from(d.column) << 32) | u64::from(d.speed.to_bits()), d.brightness))
                    .collect::<std::vec::Vec<_>>()
            });
        }
    }
}
