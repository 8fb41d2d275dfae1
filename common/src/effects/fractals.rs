//! Fractals: Mandelbrot zoom, morphing Julia set, chaos-game Sierpinski
//! triangle and a growing L-system dragon curve.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use core::f32::consts::TAU;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle};
use heapless::Deque;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{Effect, put_pixel};
use crate::colors::{BLACK, scale, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_F, HEIGHT_I, SCREEN_HEIGHT, SCREEN_WIDTH, WIDTH_F, WIDTH_I};

/// Cosine-wave rainbow used by both escape-time fractals.
fn wave_palette(phase: fn(f32) -> f32) -> [Rgb565; 256] {
    let mut palette = [BLACK; 256];
    for (i, entry) in palette.iter_mut().enumerate() {
        let t = i as f32 / 255.0 * 6.28;
        let channel = |offset: f32| (255.0 * (0.5 + 0.5 * phase(t + offset))) as u8;
        *entry = to_565(Rgb888::new(channel(0.0), channel(2.09), channel(4.18)));
    }
    palette
}

/// Iterations of `z = z^2 + c` until `|z| > 2`, at most `max_iter`.
fn escape_time(
    mut zr: f32,
    mut zi: f32,
    cr: f32,
    ci: f32,
    max_iter: u32,
) -> u32 {
    for n in 0..max_iter {
        if zr * zr + zi * zi > 4.0 {
            return n;
        }
        let next = zr * zr - zi * zi + cr;
        zi = 2.0 * zr * zi + ci;
        zr = next;
    }
    max_iter
}

fn full_screen() -> Rectangle { Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, SCREEN_HEIGHT)) }

// =============================================================================
// Mandelbrot
// =============================================================================

const MANDELBROT_ITER: u32 = 30;
const ZOOM_STEP: f32 = 1.02;
const ZOOM_LIMIT: f32 = 50.0;

/// Zoom targets picked after each dive.
const MANDELBROT_TARGETS: [(f32, f32); 5] = [
    (-0.5, 0.0),
    (-0.75, 0.1),
    (-0.235_125, 0.827_215),
    (-0.8, 0.156),
    (-0.745_29, 0.113_07),
];

/// Endless zoom into the Mandelbrot set.
pub struct Mandelbrot {
    rng: SmallRng,
    zoom: f32,
    center: (f32, f32),
    color_offset: usize,
    palette: [Rgb565; 256],
}

impl Mandelbrot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            zoom: 1.0,
            center: MANDELBROT_TARGETS[0],
            color_offset: 0,
            palette: wave_palette(|t| t.sin()),
        }
    }

    pub const fn zoom(&self) -> f32 { self.zoom }

    fn color_at(
        &self,
        x: u32,
        y: u32,
    ) -> Rgb565 {
        let half = 2.0 / self.zoom;
        let real = self.center.0 + (x as f32 - WIDTH_F / 2.0) * half / (WIDTH_F / 2.0);
        let imag = self.center.1 + (y as f32 - HEIGHT_F / 2.0) * half / (HEIGHT_F / 2.0);
        let n = escape_time(0.0, 0.0, real, imag, MANDELBROT_ITER);
        if n == MANDELBROT_ITER {
            BLACK
        } else {
            self.palette[(n as usize + self.color_offset) % 256]
        }
    }
}

impl Effect for Mandelbrot {
    fn tick(&mut self) {
        self.zoom *= ZOOM_STEP;
        self.color_offset = (self.color_offset + 1) % 256;
        if self.zoom > ZOOM_LIMIT {
            self.zoom = 1.0;
            self.center = MANDELBROT_TARGETS[self.rng.gen_range(0..MANDELBROT_TARGETS.len())];
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let colors = (0..SCREEN_HEIGHT).flat_map(|y| (0..SCREEN_WIDTH).map(move |x| self.color_at(x, y)));
        target.fill_contiguous(&full_screen(), colors)
    }

    fn population(&self) -> usize { (SCREEN_WIDTH * SCREEN_HEIGHT) as usize }
}

// =============================================================================
// Julia Set
// =============================================================================

const JULIA_ITER: u32 = 25;
const JULIA_INSIDE: Rgb888 = Rgb888::new(0, 0, 50);

const JULIA_JUMPS: [(f32, f32); 6] = [
    (-0.7269, 0.1889),
    (-0.8, 0.156),
    (-0.4, 0.6),
    (0.285, 0.01),
    (-0.75, 0.11),
    (-0.1, 0.651),
];

/// Julia set whose constant drifts along a slow loop.
pub struct JuliaSet {
    rng: SmallRng,
    time: f32,
    c: (f32, f32),
    palette: [Rgb565; 256],
}

impl JuliaSet {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            time: 0.0,
            c: (-0.7, 0.27015),
            palette: wave_palette(|t| t.cos()),
        }
    }

    /// Current constant `c` as (real, imaginary).
    pub const fn constant(&self) -> (f32, f32) { self.c }

    fn color_at(
        &self,
        x: u32,
        y: u32,
    ) -> Rgb565 {
        let real = -2.0 + x as f32 / WIDTH_F * 4.0;
        let imag = -2.0 + y as f32 / HEIGHT_F * 4.0;
        let n = escape_time(real, imag, self.c.0, self.c.1, JULIA_ITER);
        if n == JULIA_ITER {
            to_565(JULIA_INSIDE)
        } else {
            self.palette[(n as usize * 8 + (self.time * 50.0) as usize) % 256]
        }
    }
}

impl Effect for JuliaSet {
    fn tick(&mut self) {
        self.time += 0.01;
        self.c = (
            -0.7 + 0.3 * (self.time * 0.5).sin(),
            0.27015 + 0.2 * (self.time * 0.7).cos(),
        );
        if self.rng.gen_bool(0.002) {
            self.c = JULIA_JUMPS[self.rng.gen_range(0..JULIA_JUMPS.len())];
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let colors = (0..SCREEN_HEIGHT).flat_map(|y| (0..SCREEN_WIDTH).map(move |x| self.color_at(x, y)));
        target.fill_contiguous(&full_screen(), colors)
    }

    fn population(&self) -> usize { (SCREEN_WIDTH * SCREEN_HEIGHT) as usize }
}

// =============================================================================
// Sierpinski (chaos game)
// =============================================================================

const CHAOS_STEPS: usize = 50;
const MAX_POINTS: usize = 8000;
const SIERPINSKI_BG: Rgb888 = Rgb888::new(0, 0, 20);

const SIERPINSKI_COLORS: [Rgb888; 3] = [
    Rgb888::new(255, 0, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(255, 255, 0),
];

#[derive(Clone, Copy, Debug)]
struct ChaosPoint {
    x: u8,
    y: u8,
    vertex: u8,
    born: u32,
}

/// Sierpinski triangle grown point by point while the frame slowly rotates.
pub struct Sierpinski {
    rng: SmallRng,
    base: [(f32, f32); 3],
    vertices: [(f32, f32); 3],
    current: (f32, f32),
    points: Deque<ChaosPoint, MAX_POINTS>,
    rotation: f32,
    color_time: f32,
    time: u32,
}

impl Sierpinski {
    pub fn new(seed: u64) -> Self {
        let margin = 10.0;
        let base = [
            (CENTER_X as f32, margin),
            (margin, HEIGHT_F - margin),
            (WIDTH_F - margin, HEIGHT_F - margin),
        ];
        Self {
            rng: SmallRng::seed_from_u64(seed),
            base,
            vertices: base,
            current: (CENTER_X as f32, CENTER_Y as f32),
            points: Deque::new(),
            rotation: 0.0,
            color_time: 0.0,
            time: 0,
        }
    }

    fn step(&mut self) {
        let index = self.rng.gen_range(0..3);
        let (vx, vy) = self.vertices[index];
        self.current = ((self.current.0 + vx) / 2.0, (self.current.1 + vy) / 2.0);

        let (x, y) = (self.current.0 as i32, self.current.1 as i32);
        if x < 0 || x >= WIDTH_I || y < 0 || y >= HEIGHT_I {
            return;
        }
        if self.points.is_full() {
            self.points.pop_front();
        }
        let point = ChaosPoint {
            x: x as u8,
            y: y as u8,
            vertex: index as u8,
            born: self.time,
        };
        self.points.push_back(point).ok();
    }
}

impl Effect for Sierpinski {
    fn tick(&mut self) {
        for _ in 0..CHAOS_STEPS {
            self.step();
        }
        self.time = self.time.wrapping_add(1);
        self.rotation += 0.01;
        self.color_time += 0.02;

        let (sin, cos) = (self.rotation.sin(), self.rotation.cos());
        let (cx, cy) = (CENTER_X as f32, CENTER_Y as f32);
        for (vertex, &(bx, by)) in self.vertices.iter_mut().zip(self.base.iter()) {
            let (dx, dy) = (bx - cx, by - cy);
            *vertex = (dx * cos - dy * sin + cx, dx * sin + dy * cos + cy);
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(to_565(SIERPINSKI_BG))?;

        for (i, &(x, y)) in self.vertices.iter().enumerate() {
            Circle::with_center(Point::new(x as i32, y as i32), 5)
                .into_styled(PrimitiveStyle::with_fill(to_565(SIERPINSKI_COLORS[i])))
                .draw(target)?;
        }

        let shifts = [0, 1, 2].map(|v| 1.0 + (self.color_time + v as f32).sin() * 0.3);
        for point in self.points.iter() {
            let age = self.time.wrapping_sub(point.born) as f32;
            let fade = (1.0 - age / 200.0).max(0.1);
            let vertex = point.vertex as usize;
            let color = scale(SIERPINSKI_COLORS[vertex], fade * shifts[vertex]);
            put_pixel(target, point.x as i32, point.y as i32, to_565(color))?;
        }
        Ok(())
    }

    fn population(&self) -> usize { self.points.len() }
}

// =============================================================================
// Dragon Curve
// =============================================================================

/// Deepest rewrite drawn; 4^6 segments.
pub const DRAGON_MAX_ITERATIONS: u32 = 6;
const GROWTH_DELAY: u32 = 100;
const DRAGON_RULE: &[u8] = b"F+F--F+F";
const DRAGON_BG: Rgb888 = Rgb888::new(0, 0, 10);

const DRAGON_PALETTE: [Rgb888; 10] = [
    Rgb888::new(255, 0, 0),
    Rgb888::new(255, 128, 0),
    Rgb888::new(255, 255, 0),
    Rgb888::new(128, 255, 0),
    Rgb888::new(0, 255, 0),
    Rgb888::new(0, 255, 128),
    Rgb888::new(0, 255, 255),
    Rgb888::new(0, 128, 255),
    Rgb888::new(128, 0, 255),
    Rgb888::new(255, 0, 255),
];

/// Expand `F` to `depth` levels, calling `forward` with the heading (in
/// quarter turns) of every segment.
fn walk_rule(
    depth: u32,
    heading: &mut i32,
    forward: &mut dyn FnMut(i32),
) {
    if depth == 0 {
        forward(*heading);
        return;
    }
    for &symbol in DRAGON_RULE {
        match symbol {
            b'F' => walk_rule(depth - 1, heading, forward),
            b'+' => *heading += 1,
            _ => *heading -= 1,
        }
    }
}

/// L-system curve that gains one rewrite every few seconds.
pub struct DragonCurve {
    rng: SmallRng,
    iteration: u32,
    growth_timer: u32,
    line_length: f32,
    rotation_deg: f32,
    color_time: f32,
    palette: [Rgb888; 10],
}

impl DragonCurve {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            iteration: 1,
            growth_timer: 0,
            line_length: 2.0,
            rotation_deg: 0.0,
            color_time: 0.0,
            palette: DRAGON_PALETTE,
        }
    }

    pub const fn iteration(&self) -> u32 { self.iteration }
}

impl Effect for DragonCurve {
    fn tick(&mut self) {
        self.growth_timer += 1;
        self.color_time += 0.02;
        self.rotation_deg += 0.5;

        if self.growth_timer >= GROWTH_DELAY {
            self.growth_timer = 0;
            self.iteration += 1;
            if self.iteration > DRAGON_MAX_ITERATIONS {
                self.iteration = 1;
                self.palette.shuffle(&mut self.rng);
                self.line_length = self.rng.gen_range(1..=3) as f32;
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
        target.clear(to_565(DRAGON_BG))?;

        // Headings are multiples of 90 degrees on top of the slow rotation.
        let base = self.rotation_deg.to_radians();
        let quarter = |h: i32| {
            let a = base + (h.rem_euclid(4)) as f32 * TAU / 4.0;
            (a.cos() * self.line_length, a.sin() * self.line_length)
        };
        let steps = [quarter(0), quarter(1), quarter(2), quarter(3)];

        let (mut x, mut y) = (CENTER_X as f32, CENTER_Y as f32);
        let mut index = 0usize;
        let mut heading = 0;
        let mut result = Ok(());
        let shift = (self.color_time * 10.0) as usize;

        walk_rule(self.iteration, &mut heading, &mut |h| {
            let (dx, dy) = steps[h.rem_euclid(4) as usize];
            let from = Point::new(x as i32, y as i32);
            x += dx;
            y += dy;
            let to = Point::new(x as i32, y as i32);
            let visible = |p: Point| p.x >= 0 && p.x < WIDTH_I && p.y >= 0 && p.y < HEIGHT_I;

            if result.is_ok() && (visible(from) || visible(to)) {
                let variation = 0.8 + 0.4 * (self.color_time + index as f32 * 0.1).sin();
                let color = scale(self.palette[(index + shift) % self.palette.len()], variation);
                result = Line::new(from, to)
                    .into_styled(PrimitiveStyle::with_stroke(to_565(color), 1))
                    .draw(target);
            }
            index += 1;
        });
        result
    }

    fn population(&self) -> usize { 4usize.pow(self.iteration) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_time_inside_and_outside() {
        assert_eq!(escape_time(0.0, 0.0, 0.0, 0.0, 30), 30);
        assert_eq!(escape_time(0.0, 0.0, 2.0, 2.0, 30), 1);
    }

    #[test]
    fn test_mandelbrot_zoom_resets() {
        let mut mandelbrot = Mandelbrot::new(1);
        let mut resets = 0;
        let mut last = mandelbrot.zoom();
        for _ in 0..600 {
            mandelbrot.tick();
            assert!(mandelbrot.zoom() <= ZOOM_LIMIT);
            if mandelbrot.zoom() < last {
                resets += 1;
                assert!(MANDELBROT_TARGETS.contains(&mandelbrot.center));
            }
            last = mandelbrot.zoom();
        }
        assert!(resets >= 2);
    }

    #[test]
    fn test_mandelbrot_interior_is_black() {
        let mandelbrot = Mandelbrot::new(1);
        // (-0.5, 0) sits in the main cardioid.
        assert_eq!(mandelbrot.color_at(64, 64), BLACK);
    }

    #[test]
    fn test_julia_constant_follows_loop() {
        let mut julia = JuliaSet::new(2);
        for _ in 0..1000 {
            julia.tick();
            let (re, im) = julia.constant();
            let on_loop = (-1.0..=-0.4).contains(&re) && (0.07..=0.48).contains(&im);
            assert!(on_loop || JULIA_JUMPS.contains(&(re, im)));
        }
    }

    #[test]
    fn test_sierpinski_caps_points() {
        let mut sierpinski = Sierpinski::new(3);
        for _ in 0..400 {
            sierpinski.tick();
        }
        assert_eq!(sierpinski.population(), MAX_POINTS);
    }

    #[test]
    fn test_dragon_rule_expands_by_four() {
        for depth in 0..=DRAGON_MAX_ITERATIONS {
            let mut count = 0;
            let mut heading = 0;
            walk_rule(depth, &mut heading, &mut |_| count += 1);
            assert_eq!(count, 4usize.pow(depth));
            assert_eq!(heading, 0);
        }
    }

    #[test]
    fn test_dragon_grows_and_wraps() {
        let mut dragon = DragonCurve::new(4);
        for _ in 0..GROWTH_DELAY {
            dragon.tick();
        }
        assert_eq!(dragon.iteration(), 2);
        for _ in 0..GROWTH_DELAY * (DRAGON_MAX_ITERATIONS - 1) {
            dragon.tick();
        }
        assert_eq!(dragon.iteration(), 1);
    }
}
