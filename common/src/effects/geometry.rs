//! Retro geometry and the plasma field.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use core::f32::consts::{PI, TAU};

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle, Triangle};
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Effect;
use crate::colors::{BLACK, dim, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_F, HEIGHT_I, SCREEN_HEIGHT, SCREEN_WIDTH, WIDTH_F, WIDTH_I};

// =============================================================================
// Retro Geometry
// =============================================================================

const MAX_SHAPES: usize = 15;
const GRID_SPACING: usize = 20;
const GRID_COLOR: Rgb888 = Rgb888::new(32, 32, 32);
const SCANLINE_COLOR: Rgb888 = Rgb888::new(20, 20, 20);

const RETRO_PALETTE: [Rgb888; 12] = [
    Rgb888::new(255, 0, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(255, 255, 0),
    Rgb888::new(0, 255, 0),
    Rgb888::new(255, 128, 0),
    Rgb888::new(128, 0, 255),
    Rgb888::new(255, 0, 128),
    Rgb888::new(0, 128, 255),
    Rgb888::new(128, 255, 0),
    Rgb888::new(255, 128, 128),
    Rgb888::new(128, 255, 255),
    Rgb888::new(255, 255, 128),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ShapeKind {
    Circle,
    Rectangle,
    Triangle,
    Line,
    Pentagon,
}

#[derive(Clone, Copy, Debug)]
struct Shape {
    kind: ShapeKind,
    x: f32,
    y: f32,
    size: f32,
    rect: Size,
    color: Rgb888,
    angle: f32,
    speed: f32,
    spin: f32,
    direction: f32,
    life: u16,
    max_life: u16,
    pulse_speed: f32,
}

impl Shape {
    fn current_size(
        &self,
        time: u32,
    ) -> f32 {
        self.size * (1.0 + 0.3 * (time as f32 * self.pulse_speed).sin())
    }

    fn current_color(&self) -> Rgb565 { dim(self.color, self.life as f32 / self.max_life as f32) }

    /// Vertex `i` of a regular polygon with `sides` sides.
    fn vertex(
        &self,
        radius: f32,
        i: usize,
        sides: usize,
    ) -> Point {
        let a = self.angle + i as f32 * TAU / sides as f32;
        Point::new((self.x + radius * a.cos()) as i32, (self.y + radius * a.sin()) as i32)
    }
}

/// Bouncing, spinning, pulsing outlines over a periodic grid.
pub struct RetroGeometry {
    rng: SmallRng,
    shapes: Vec<Shape, MAX_SHAPES>,
    time: u32,
    /// One bit per 4 px row that carries a scanline this frame.
    scanlines: u32,
}

impl RetroGeometry {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            shapes: Vec::new(),
            time: 0,
            scanlines: 0,
        }
    }

    fn spawn(&mut self) {
        let kind = match self.rng.gen_range(0..5) {
            0 => ShapeKind::Circle,
            1 => ShapeKind::Rectangle,
            2 => ShapeKind::Triangle,
            3 => ShapeKind::Line,
            _ => ShapeKind::Pentagon,
        };
        let life = self.rng.gen_range(100..=400);
        let shape = Shape {
            kind,
            x: self.rng.gen_range(0..=WIDTH_I) as f32,
            y: self.rng.gen_range(0..=HEIGHT_I) as f32,
            size: self.rng.gen_range(5..=30) as f32,
            rect: Size::new(self.rng.gen_range(5..=25), self.rng.gen_range(5..=25)),
            color: RETRO_PALETTE[self.rng.gen_range(0..RETRO_PALETTE.len())],
            angle: self.rng.gen_range(0.0..TAU),
            speed: self.rng.gen_range(0.5..3.0),
            spin: self.rng.gen_range(-0.1..0.1),
            direction: self.rng.gen_range(0.0..TAU),
            life,
            max_life: life,
            pulse_speed: self.rng.gen_range(0.05..0.2),
        };
        self.shapes.push(shape).ok();
    }

    fn grid_visible(&self) -> bool { self.time % 200 < 50 }

    fn draw_shape<D>(
        &self,
        shape: &Shape,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let color = shape.current_color();
        let outline = PrimitiveStyle::with_stroke(color, 2);
        let size = shape.current_size(self.time);
        let center = Point::new(shape.x as i32, shape.y as i32);

        match shape.kind {
            ShapeKind::Circle => {
                Circle::with_center(center, size as u32).into_styled(outline).draw(target)?;
            }
            ShapeKind::Rectangle => {
                Rectangle::with_center(center, shape.rect).into_styled(outline).draw(target)?;
            }
            ShapeKind::Triangle => {
                let [a, b, c] = [0, 1, 2].map(|i| shape.vertex(size, i, 3));
                Triangle::new(a, b, c).into_styled(outline).draw(target)?;
            }
            ShapeKind::Line => {
                let dx = (size * shape.angle.cos()) as i32;
                let dy = (size * shape.angle.sin()) as i32;
                Line::new(center + Point::new(dx, dy), center - Point::new(dx, dy))
                    .into_styled(PrimitiveStyle::with_stroke(color, 3))
                    .draw(target)?;
            }
            ShapeKind::Pentagon => {
                for i in 0..5 {
                    let from = shape.vertex(size, i, 5);
                    let to = shape.vertex(size, (i + 1) % 5, 5);
                    Line::new(from, to).into_styled(outline).draw(target)?;
                }
            }
        }
        Ok(())
    }
}

impl Effect for RetroGeometry {
    fn tick(&mut self) {
        self.time = self.time.wrapping_add(1);
        self.shapes.retain(|s| s.life > 0);

        if self.shapes.len() < MAX_SHAPES && self.rng.gen_bool(0.1) {
            self.spawn();
        }

        for shape in self.shapes.iter_mut() {
            shape.x += shape.direction.cos() * shape.speed;
            shape.y += shape.direction.sin() * shape.speed;
            shape.angle += shape.spin;

            if shape.x < 0.0 || shape.x > WIDTH_F {
                shape.direction = PI - shape.direction;
                shape.x = shape.x.clamp(0.0, WIDTH_F);
            }
            if shape.y < 0.0 || shape.y > HEIGHT_F {
                shape.direction = -shape.direction;
                shape.y = shape.y.clamp(0.0, HEIGHT_F);
            }
            shape.life = shape.life.saturating_sub(1);
        }

        self.scanlines = 0;
        if self.rng.gen_bool(0.1) {
            for row in 0..SCREEN_HEIGHT / 4 {
                if self.rng.gen_bool(0.3) {
                    self.scanlines |= 1 << row;
                }
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
        target.clear(BLACK)?;

        if self.grid_visible() {
            let grid = PrimitiveStyle::with_stroke(to_565(GRID_COLOR), 1);
            for x in (0..WIDTH_I).step_by(GRID_SPACING) {
                Line::new(Point::new(x, 0), Point::new(x, HEIGHT_I)).into_styled(grid).draw(target)?;
            }
            for y in (0..HEIGHT_I).step_by(GRID_SPACING) {
                Line::new(Point::new(0, y), Point::new(WIDTH_I, y)).into_styled(grid).draw(target)?;
            }
        }

        for shape in &self.shapes {
            self.draw_shape(shape, target)?;
        }

        if self.scanlines != 0 {
            let scan = PrimitiveStyle::with_stroke(to_565(SCANLINE_COLOR), 1);
            for row in 0..SCREEN_HEIGHT / 4 {
                if self.scanlines & (1 << row) != 0 {
                    let y = (row * 4) as i32;
                    Line::new(Point::new(0, y), Point::new(WIDTH_I, y)).into_styled(scan).draw(target)?;
                }
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.shapes.len() }
}

// =============================================================================
// Plasma Field
// =============================================================================

const PLASMA_SPEED: f32 = 0.05;

/// Classic sine plasma through a 256 entry palette.
pub struct PlasmaField {
    time: f32,
    palette: [Rgb565; 256],
}

/// Rainbow palette with boosted magentas and cyans.
fn plasma_palette() -> [Rgb565; 256] {
    let mut palette = [BLACK; 256];
    for (i, entry) in palette.iter_mut().enumerate() {
        let t = i as f32 / 255.0;
        let wave = |offset: f32| 128.0 + 127.0 * (t * TAU + offset).sin();
        let (mut r, mut g, mut b) = (wave(0.0), wave(PI / 3.0), wave(2.0 * PI / 3.0));
        if t > 0.2 && t < 0.4 {
            r *= 1.3;
            b *= 1.2;
        } else if t > 0.6 && t < 0.8 {
            g *= 1.3;
            b *= 1.3;
        }
        let channel = |v: f32| v.clamp(0.0, 255.0) as u8;
        *entry = to_565(Rgb888::new(channel(r), channel(g), channel(b)));
    }
    palette
}

impl PlasmaField {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            palette: plasma_palette(),
        }
    }

    /// Plasma intensity in `0.0..=1.0` at a pixel.
    pub fn value(
        &self,
        x: f32,
        y: f32,
    ) -> f32 {
        let t = self.time;
        let (dx, dy) = (x - CENTER_X as f32, y - CENTER_Y as f32);
        let dist = (dx * dx + dy * dy).sqrt();
        let angle = dy.atan2(dx);

        let v = ((x + t * 30.0) / 16.0).sin()
            + ((y + t * 20.0) / 8.0).sin()
            + ((x + y + t * 25.0) / 16.0).sin()
            + (dist / 8.0 + t * 15.0).sin()
            + (angle * 3.0 + t * 10.0).sin();
        (v + 5.0) / 10.0
    }
}

impl Default for PlasmaField {
    fn default() -> Self { Self::new() }
}

impl Effect for PlasmaField {
    fn tick(&mut self) { self.time += PLASMA_SPEED; }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let area = Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
        let colors = (0..SCREEN_HEIGHT).flat_map(|y| {
            (0..SCREEN_WIDTH).map(move |x| {
                let index = (self.value(x as f32, y as f32) * 255.0) as i32;
                self.palette[index.clamp(0, 255) as usize]
            })
        });
        target.fill_contiguous(&area, colors)
    }

    fn population(&self) -> usize { (SCREEN_WIDTH * SCREEN_HEIGHT) as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_capped_and_bounded() {
        let mut retro = RetroGeometry::new(2);
        for _ in 0..3000 {
            retro.tick();
            assert!(retro.shapes.len() <= MAX_SHAPES);
            for shape in &retro.shapes {
                assert!((0.0..=WIDTH_F).contains(&shape.x));
                assert!((0.0..=HEIGHT_F).contains(&shape.y));
            }
        }
    }

    #[test]
    fn test_shape_fades_with_life() {
        let mut retro = RetroGeometry::new(4);
        retro.spawn();
        let mut shape = retro.shapes[0];
        shape.color = Rgb888::new(255, 255, 255);
        assert_eq!(shape.current_color(), Rgb565::WHITE);
        shape.life = 0;
        assert_eq!(shape.current_color(), BLACK);
    }

    #[test]
    fn test_grid_schedule() {
        let mut retro = RetroGeometry::new(1);
        retro.time = 10;
        assert!(retro.grid_visible());
        retro.time = 120;
        assert!(!retro.grid_visible());
        retro.time = 230;
        assert!(retro.grid_visible());
    }

    #[test]
    fn test_plasma_value_in_range() {
        let mut plasma = PlasmaField::new();
        for _ in 0..20 {
            plasma.tick();
            for y in (0..128).step_by(7) {
                for x in (0..128).step_by(5) {
                    let v = plasma.value(x as f32, y as f32);
                    assert!((0.0..=1.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn test_plasma_palette_boosts_magenta() {
        let palette = plasma_palette();
        assert_ne!(palette[0], palette[128]);
        assert_eq!(palette.len(), 256);
    }
}
