//! Walking shapes that leave trails, and nested rotating polygons.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use core::f32::consts::{PI, TAU};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle};
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Effect;
use crate::canvas::Canvas;
use crate::colors::{BLACK, hsv, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_F, WIDTH_F};

// =============================================================================
// Walking Shapes
// =============================================================================

const STAR_POINTS: usize = 10;

/// Which outline walks across the screen.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Walker {
    /// Pure random walk.
    Triangle,
    /// Random walk pushed back from the outer quarters.
    Square,
    /// Momentum walk with occasional sudden turns.
    Star,
}

/// Per-shape motion and color constants.
struct Gait {
    step: f32,
    /// Degrees per tick.
    spin: f32,
    /// Degrees of hue per tick.
    hue_step: f32,
    start_hue: f32,
    value: f32,
    /// Ticks between canvas wipes.
    cycle: u32,
    /// Accent lines are drawn while `step % period < on`.
    accent_period: u32,
    accent_on: u32,
}

impl Walker {
    const fn gait(self) -> Gait {
        match self {
            Self::Triangle => Gait {
                step: 3.0,
                spin: 2.0,
                hue_step: 3.0,
                start_hue: 0.0,
                value: 0.9,
                cycle: 400,
                accent_period: 20,
                accent_on: 10,
            },
            Self::Square => Gait {
                step: 2.5,
                spin: 3.0,
                hue_step: 2.0,
                start_hue: 120.0,
                value: 0.9,
                cycle: 350,
                accent_period: 15,
                accent_on: 8,
            },
            Self::Star => Gait {
                step: 2.0,
                spin: 5.0,
                hue_step: 4.0,
                start_hue: 270.0,
                value: 1.0,
                cycle: 300,
                accent_period: 25,
                accent_on: 12,
            },
        }
    }
}

/// A rotating outline on a random walk, drawn onto a canvas that is only
/// wiped once per cycle.
pub struct WalkingShape {
    walker: Walker,
    rng: SmallRng,
    canvas: Canvas,
    x: f32,
    y: f32,
    /// Degrees.
    rotation: f32,
    /// Radians, only kept between ticks by the star.
    heading: f32,
    hue: f32,
    step: u32,
}

impl WalkingShape {
    pub fn new(
        walker: Walker,
        seed: u64,
    ) -> Self {
        Self {
            walker,
            rng: SmallRng::seed_from_u64(seed),
            canvas: Canvas::new(BLACK),
            x: CENTER_X as f32,
            y: CENTER_Y as f32,
            rotation: 0.0,
            heading: 0.0,
            hue: walker.gait().start_hue,
            step: 0,
        }
    }

    /// Outline radius this tick; the square and the star breathe.
    fn size(&self) -> f32 {
        let step = self.step as f32;
        match self.walker {
            Walker::Triangle => 15.0,
            Walker::Square => 12.0 + (step * 0.05).sin() * 4.0,
            Walker::Star => 10.0 + (step * 0.1).sin() * 3.0,
        }
    }

    fn next_heading(&mut self) -> f32 {
        let random = self.rng.gen_range(0..360) as f32 * PI / 180.0;
        match self.walker {
            Walker::Triangle => random,
            Walker::Square => {
                let mut angle = random;
                if self.x > WIDTH_F * 0.75 {
                    angle += PI * 0.25;
                }
                if self.x < WIDTH_F * 0.25 {
                    angle -= PI * 0.25;
                }
                if self.y > HEIGHT_F * 0.75 {
                    angle += PI * 0.5;
                }
                if self.y < HEIGHT_F * 0.25 {
                    angle -= PI * 0.5;
                }
                angle
            }
            Walker::Star => {
                if self.rng.gen_range(0..100) < 85 {
                    self.heading + self.rng.gen_range(-30..30) as f32 * PI / 180.0
                } else {
                    random
                }
            }
        }
    }

    /// Outline vertices in drawing order.
    fn outline(&self) -> Vec<Point, STAR_POINTS> {
        let size = self.size();
        let rad = self.rotation * PI / 180.0;
        let (sin_r, cos_r) = (rad.sin(), rad.cos());
        let place = |px: f32, py: f32| {
            Point::new(
                (self.x + px * cos_r - py * sin_r) as i32,
                (self.y + px * sin_r + py * cos_r) as i32,
            )
        };

        let mut points = Vec::new();
        match self.walker {
            Walker::Triangle => {
                for (px, py) in [(0.0, -size), (-size * 0.866, size * 0.5), (size * 0.866, size * 0.5)] {
                    points.push(place(px, py)).ok();
                }
            }
            Walker::Square => {
                let h = size / 2.0;
                for (px, py) in [(-h, -h), (h, -h), (h, h), (-h, h)] {
                    points.push(place(px, py)).ok();
                }
            }
            Walker::Star => {
                for i in 0..STAR_POINTS {
                    let angle = (i as f32 * 36.0 - 90.0 + self.rotation) * PI / 180.0;
                    let radius = if i % 2 == 0 { size } else { size * 0.4 };
                    let p = Point::new((self.x + angle.cos() * radius) as i32, (self.y + angle.sin() * radius) as i32);
                    points.push(p).ok();
                }
            }
        }
        points
    }

    fn stamp(&mut self) {
        let gait = self.walker.gait();
        let color = to_565(hsv(self.hue, 1.0, gait.value));
        let style = PrimitiveStyle::with_stroke(color, 1);
        let points = self.outline();

        for (i, &from) in points.iter().enumerate() {
            let to = points[(i + 1) % points.len()];
            Line::new(from, to).into_styled(style).draw(&mut self.canvas).ok();
        }

        if self.step % gait.accent_period >= gait.accent_on {
            return;
        }
        match self.walker {
            Walker::Triangle => {
                let sum = points.iter().fold(Point::zero(), |acc, &p| acc + p);
                let center = sum / points.len() as i32;
                for &p in &points {
                    Line::new(center, p).into_styled(style).draw(&mut self.canvas).ok();
                }
            }
            Walker::Square => {
                Line::new(points[0], points[2]).into_styled(style).draw(&mut self.canvas).ok();
                Line::new(points[1], points[3]).into_styled(style).draw(&mut self.canvas).ok();
            }
            Walker::Star => {
                let center = Point::new(self.x as i32, self.y as i32);
                for &p in points.iter().step_by(2) {
                    Line::new(center, p).into_styled(style).draw(&mut self.canvas).ok();
                }
            }
        }
    }
}

/// Leaving one edge puts the shape on the opposite edge.
fn wrap(
    v: f32,
    max: f32,
) -> f32 {
    if v < 0.0 {
        max
    } else if v > max {
        0.0
    } else {
        v
    }
}

impl Effect for WalkingShape {
    fn tick(&mut self) {
        let gait = self.walker.gait();
        if self.step == 0 {
            self.canvas.fill(BLACK);
        }

        self.heading = self.next_heading();
        self.x = wrap(self.x + self.heading.cos() * gait.step, WIDTH_F);
        self.y = wrap(self.y + self.heading.sin() * gait.step, HEIGHT_F);
        self.rotation = (self.rotation + gait.spin) % 360.0;
        self.hue = (self.hue + gait.hue_step) % 360.0;

        self.stamp();

        self.step += 1;
        if self.step > gait.cycle {
            self.step = 0;
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

    fn population(&self) -> usize { self.step as usize }
}

// =============================================================================
// Recursive Polygons
// =============================================================================

const LEVELS: usize = 6;
const SIDES: usize = 6;

/// Six nested hexagons, each turning and pulsing at its own offset.
pub struct RecursivePolygons {
    /// Degrees.
    rotation: f32,
    pulse: f32,
}

impl RecursivePolygons {
    pub fn new() -> Self {
        Self {
            rotation: 0.0,
            pulse: 0.0,
        }
    }

    fn radius(
        &self,
        level: usize,
    ) -> f32 {
        50.0 - level as f32 * 6.0 + (self.pulse + level as f32).sin() * 4.0
    }

    fn vertices(
        &self,
        level: usize,
    ) -> [Point; SIDES] {
        let radius = self.radius(level);
        let offset = (self.rotation + level as f32 * 15.0) * PI / 180.0;
        core::array::from_fn(|i| {
            let angle = offset + i as f32 * TAU / SIDES as f32;
            Point::new(
                CENTER_X + (angle.cos() * radius) as i32,
                CENTER_Y + (angle.sin() * radius) as i32,
            )
        })
    }
}

impl Default for RecursivePolygons {
    fn default() -> Self { Self::new() }
}

impl Effect for RecursivePolygons {
    fn tick(&mut self) {
        self.rotation = (self.rotation + 2.0) % 360.0;
        self.pulse += 0.1;
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(BLACK)?;
        let center = Point::new(CENTER_X, CENTER_Y);

        for level in 0..LEVELS {
            let hue = level as f32 * 60.0 + self.rotation * 2.0;
            let color = to_565(hsv(hue, 1.0, 0.8 - level as f32 * 0.1));
            let edge = PrimitiveStyle::with_stroke(color, 1);
            let points = self.vertices(level);

            for (i, &from) in points.iter().enumerate() {
                Line::new(from, points[(i + 1) % SIDES]).into_styled(edge).draw(target)?;
                Circle::with_center(from, 3)
                    .into_styled(PrimitiveStyle::with_fill(color))
                    .draw(target)?;
            }
            // Spokes on every other level
            if level % 2 == 0 {
                for &p in &points {
                    Line::new(center, p).into_styled(edge).draw(target)?;
                }
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { LEVELS }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walkers_wrap_inside_screen() {
        for walker in [Walker::Triangle, Walker::Square, Walker::Star] {
            let mut shape = WalkingShape::new(walker, 5);
            for _ in 0..2000 {
                shape.tick();
                assert!((0.0..=WIDTH_F).contains(&shape.x), "{walker:?} x = {}", shape.x);
                assert!((0.0..=HEIGHT_F).contains(&shape.y), "{walker:?} y = {}", shape.y);
            }
        }
    }

    #[test]
    fn test_wrap_moves_to_opposite_edge() {
        assert_eq!(wrap(-0.5, WIDTH_F), WIDTH_F);
        assert_eq!(wrap(WIDTH_F + 1.0, WIDTH_F), 0.0);
        assert_eq!(wrap(40.0, WIDTH_F), 40.0);
    }

    #[test]
    fn test_outline_vertex_counts() {
        assert_eq!(WalkingShape::new(Walker::Triangle, 1).outline().len(), 3);
        assert_eq!(WalkingShape::new(Walker::Square, 1).outline().len(), 4);
        assert_eq!(WalkingShape::new(Walker::Star, 1).outline().len(), STAR_POINTS);
    }

    #[test]
    fn test_trail_persists_until_cycle_ends() {
        let mut shape = WalkingShape::new(Walker::Triangle, 3);
        shape.tick();
        let lit = |shape: &WalkingShape| {
            (0..128)
                .flat_map(|y| (0..128).map(move |x| (x, y)))
                .filter(|&(x, y)| shape.canvas.pixel(x, y) != Some(BLACK))
                .count()
        };
        let first = lit(&shape);
        assert!(first > 0);
        for _ in 0..50 {
            shape.tick();
        }
        assert!(lit(&shape) > first);

        while shape.step != 0 {
            shape.tick();
        }
        // The wipe happens on the first tick of the next cycle
        shape.tick();
        assert!(lit(&shape) < first * 3);
    }

    #[test]
    fn test_star_keeps_heading_most_ticks() {
        let mut shape = WalkingShape::new(Walker::Star, 11);
        let mut small_turns = 0;
        for _ in 0..400 {
            let before = shape.heading;
            shape.tick();
            if (shape.heading - before).abs() <= 30.0 * PI / 180.0 {
                small_turns += 1;
            }
        }
        assert!(small_turns > 280, "only {small_turns} gentle turns");
    }

    #[test]
    fn test_polygons_stay_on_screen() {
        let mut polygons = RecursivePolygons::new();
        for _ in 0..500 {
            polygons.tick();
            for level in 0..LEVELS {
                let r = polygons.radius(level);
                assert!(r > 0.0 && r <= 54.0);
                for p in polygons.vertices(level) {
                    assert!((0..128).contains(&p.x) && (0..128).contains(&p.y));
                }
            }
        }
    }

    #[test]
    fn test_inner_levels_are_smaller() {
        let polygons = RecursivePolygons::new();
        for level in 1..LEVELS {
            assert!(polygons.radius(level) < polygons.radius(level - 1) + 8.0);
        }
        assert!(polygons.radius(LEVELS - 1) < polygons.radius(0));
    }
}
