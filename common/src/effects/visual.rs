//! Classic demo-scene visuals: bouncing balls, kaleidoscope, starfield warp
//! and spirograph.

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

use core::f32::consts::{PI, TAU};

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, Triangle};
use heapless::{Deque, Vec};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, put_pixel};
use crate::canvas::Canvas;
use crate::colors::{BLACK, WHITE, add, dim, hsv, scale, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_F, WIDTH_F};

// =============================================================================
// Bouncing Balls
// =============================================================================

const BALLS: usize = 8;
const TRAIL_LENGTH: usize = 15;
const MAX_SPARKLES: usize = 96;
const SPARKLE_LIFE: u8 = 10;
const BOUNCES_PER_COLOR: u32 = 20;

const BALL_PALETTE: [Rgb888; 10] = [
    Rgb888::new(255, 0, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(255, 255, 0),
    Rgb888::new(0, 255, 0),
    Rgb888::new(255, 128, 0),
    Rgb888::new(128, 0, 255),
    Rgb888::new(255, 0, 128),
    Rgb888::new(0, 128, 255),
    Rgb888::new(128, 255, 0),
    Rgb888::new(255, 255, 255),
];

struct Ball {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    radius: i32,
    color: Rgb888,
    trail: Deque<Point, TRAIL_LENGTH>,
    bounces: u32,
    glow_phase: f32,
}

#[derive(Clone, Copy, Debug)]
struct Sparkle {
    x: i32,
    y: i32,
    life: u8,
    color: Rgb888,
}

/// Glowing balls bouncing off the screen edges with fading trails.
pub struct BouncingBalls {
    rng: SmallRng,
    balls: Vec<Ball, BALLS>,
    sparkles: Vec<Sparkle, MAX_SPARKLES>,
}

impl BouncingBalls {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut balls = Vec::new();
        for _ in 0..BALLS {
            let ball = Ball {
                x: rng.gen_range(10.0..WIDTH_F - 10.0),
                y: rng.gen_range(10.0..HEIGHT_F - 10.0),
                vx: rng.gen_range(-3.0..3.0),
                vy: rng.gen_range(-3.0..3.0),
                radius: rng.gen_range(3..=8),
                color: BALL_PALETTE[rng.gen_range(0..BALL_PALETTE.len())],
                trail: Deque::new(),
                bounces: 0,
                glow_phase: rng.gen_range(0.0..TAU),
            };
            balls.push(ball).ok();
        }

        Self {
            rng,
            balls,
            sparkles: Vec::new(),
        }
    }

    fn sparkle_at(
        rng: &mut SmallRng,
        sparkles: &mut Vec<Sparkle, MAX_SPARKLES>,
        ball: &Ball,
    ) {
        for _ in 0..3 {
            let sparkle = Sparkle {
                x: (ball.x + rng.gen_range(-5.0f32..5.0)) as i32,
                y: (ball.y + rng.gen_range(-5.0f32..5.0)) as i32,
                life: SPARKLE_LIFE,
                color: ball.color,
            };
            sparkles.push(sparkle).ok();
        }
    }
}

impl Effect for BouncingBalls {
    fn tick(&mut self) {
        for sparkle in self.sparkles.iter_mut() {
            sparkle.life = sparkle.life.saturating_sub(1);
        }
        self.sparkles.retain(|s| s.life > 0);

        for ball in self.balls.iter_mut() {
            if ball.trail.is_full() {
                ball.trail.pop_front();
            }
            ball.trail.push_back(Point::new(ball.x as i32, ball.y as i32)).ok();

            ball.x += ball.vx;
            ball.y += ball.vy;
            let r = ball.radius as f32;
            let mut bounced = 0;

            if ball.x - r <= 0.0 {
                ball.x = r;
                ball.vx = ball.vx.abs();
                bounced += 1;
            } else if ball.x + r >= WIDTH_F {
                ball.x = WIDTH_F - r;
                ball.vx = -ball.vx.abs();
                bounced += 1;
            }
            if ball.y - r <= 0.0 {
                ball.y = r;
                ball.vy = ball.vy.abs();
                bounced += 1;
            } else if ball.y + r >= HEIGHT_F {
                ball.y = HEIGHT_F - r;
                ball.vy = -ball.vy.abs();
                bounced += 1;
            }

            for _ in 0..bounced {
                ball.bounces += 1;
                Self::sparkle_at(&mut self.rng, &mut self.sparkles, ball);
            }

            ball.glow_phase += 0.1;
            if ball.bounces >= BOUNCES_PER_COLOR {
                ball.color = BALL_PALETTE[self.rng.gen_range(0..BALL_PALETTE.len())];
                ball.bounces = 0;
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

        for ball in &self.balls {
            let len = ball.trail.len() as f32;
            for (i, point) in ball.trail.iter().enumerate().skip(1) {
                let fade = i as f32 / len;
                let size = ((ball.radius as f32 * fade * 0.7) as i32).max(1);
                Circle::with_center(*point, (size * 2 + 1) as u32)
                    .into_styled(PrimitiveStyle::with_fill(dim(ball.color, fade * 0.5)))
                    .draw(target)?;
            }
        }

        for sparkle in &self.sparkles {
            let color = dim(sparkle.color, sparkle.life as f32 / SPARKLE_LIFE as f32);
            for (dx, dy) in [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)] {
                put_pixel(target, sparkle.x + dx, sparkle.y + dy, color)?;
            }
        }

        for ball in &self.balls {
            let center = Point::new(ball.x as i32, ball.y as i32);
            let r = ball.radius;
            let glow = 0.5 + 0.5 * ball.glow_phase.sin();

            for glow_r in (r + 1..=r + 3).rev() {
                let fade = (r + 3 - glow_r) as f32 / 3.0 * glow;
                let color = scale(ball.color, fade * 0.3);
                if color != Rgb888::BLACK {
                    Circle::with_center(center, (glow_r * 2 + 1) as u32)
                        .into_styled(PrimitiveStyle::with_stroke(to_565(color), 1))
                        .draw(target)?;
                }
            }

            let body = PrimitiveStyleBuilder::new()
                .fill_color(to_565(ball.color))
                .stroke_color(WHITE)
                .stroke_width(1)
                .build();
            Circle::with_center(center, (r * 2 + 1) as u32).into_styled(body).draw(target)?;

            let highlight = (r / 3).max(1);
            let spot = center - Point::new(r / 3, r / 3);
            let shine = to_565(add(ball.color, Rgb888::new(100, 100, 100)));
            Circle::with_center(spot, (highlight * 2 + 1) as u32)
                .into_styled(PrimitiveStyle::with_fill(shine))
                .draw(target)?;
        }
        Ok(())
    }

    fn population(&self) -> usize { self.balls.len() + self.sparkles.len() }
}

// =============================================================================
// Kaleidoscope
// =============================================================================

const SEGMENTS: usize = 6;
const ELEMENTS: usize = 12;
const KALEIDO_RADIUS: f32 = 59.0;
const KALEIDO_BG: Rgb888 = Rgb888::new(10, 10, 20);
const KALEIDO_RIM: Rgb888 = Rgb888::new(50, 50, 50);

const KALEIDO_PALETTE: [Rgb888; 12] = [
    Rgb888::new(255, 0, 128),
    Rgb888::new(128, 0, 255),
    Rgb888::new(0, 128, 255),
    Rgb888::new(0, 255, 255),
    Rgb888::new(0, 255, 128),
    Rgb888::new(128, 255, 0),
    Rgb888::new(255, 255, 0),
    Rgb888::new(255, 128, 0),
    Rgb888::new(255, 0, 0),
    Rgb888::new(255, 0, 255),
    Rgb888::new(128, 128, 255),
    Rgb888::new(255, 128, 128),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Motif {
    Circle,
    Square,
    Diamond,
    Star,
}

#[derive(Clone, Copy, Debug)]
struct Element {
    angle: f32,
    distance: f32,
    color: Rgb888,
    size: f32,
    motif: Motif,
    rotation: f32,
    spin: f32,
    pulse_phase: f32,
    pulse_speed: f32,
    life: u16,
}

/// Six-fold mirrored motifs rotating around the center.
pub struct Kaleidoscope {
    rng: SmallRng,
    rotation: f32,
    elements: Vec<Element, ELEMENTS>,
    show_rim: bool,
}

impl Kaleidoscope {
    pub fn new(seed: u64) -> Self {
        let mut kaleidoscope = Self {
            rng: SmallRng::seed_from_u64(seed),
            rotation: 0.0,
            elements: Vec::new(),
            show_rim: false,
        };
        kaleidoscope.refill();
        kaleidoscope
    }

    fn refill(&mut self) {
        while !self.elements.is_full() {
            let rng = &mut self.rng;
            let element = Element {
                angle: rng.gen_range(0.0..TAU / SEGMENTS as f32),
                distance: rng.gen_range(5.0..KALEIDO_RADIUS * 0.8),
                color: KALEIDO_PALETTE[rng.gen_range(0..KALEIDO_PALETTE.len())],
                size: rng.gen_range(2..=6) as f32,
                motif: match rng.gen_range(0..4) {
                    0 => Motif::Circle,
                    1 => Motif::Square,
                    2 => Motif::Diamond,
                    _ => Motif::Star,
                },
                rotation: rng.gen_range(0.0..TAU),
                spin: rng.gen_range(-0.1..0.1),
                pulse_phase: rng.gen_range(0.0..TAU),
                pulse_speed: rng.gen_range(0.05..0.15),
                life: rng.gen_range(200..=600),
            };
            self.elements.push(element).ok();
        }
    }

    /// Screen positions of an element in every segment plus its mirror image.
    fn mirrored(
        &self,
        element: &Element,
    ) -> [Point; SEGMENTS * 2] {
        let segment = TAU / SEGMENTS as f32;
        let place = |a: f32| {
            Point::new(
                (CENTER_X as f32 + element.distance * a.cos()) as i32,
                (CENTER_Y as f32 + element.distance * a.sin()) as i32,
            )
        };
        let mut points = [Point::zero(); SEGMENTS * 2];
        for i in 0..SEGMENTS {
            let base = self.rotation + i as f32 * segment;
            points[i * 2] = place(base + element.angle);
            points[i * 2 + 1] = place(base - element.angle);
        }
        points
    }

    fn draw_motif<D>(
        element: &Element,
        at: Point,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let pulse = 1.0 + 0.3 * element.pulse_phase.sin();
        let size = (element.size * pulse) as i32;
        let fill = PrimitiveStyle::with_fill(to_565(element.color));

        match element.motif {
            Motif::Circle => {
                Circle::with_center(at, (size * 2 + 1) as u32).into_styled(fill).draw(target)?;
            }
            Motif::Square => {
                let side = (size * 2 + 1) as u32;
                Rectangle::with_center(at, Size::new(side, side)).into_styled(fill).draw(target)?;
            }
            Motif::Diamond => {
                let top = at - Point::new(0, size);
                let bottom = at + Point::new(0, size);
                Triangle::new(top, at + Point::new(size, 0), bottom).into_styled(fill).draw(target)?;
                Triangle::new(top, at - Point::new(size, 0), bottom).into_styled(fill).draw(target)?;
            }
            Motif::Star => {
                let point = |i: usize, r: f32| {
                    let a = element.rotation + i as f32 * PI / 4.0;
                    at + Point::new((r * a.cos()) as i32, (r * a.sin()) as i32)
                };
                for i in (0..8).step_by(2) {
                    let tip = point(i, size as f32);
                    let left = point(i + 7, size as f32 * 0.5);
                    let right = point(i + 1, size as f32 * 0.5);
                    Triangle::new(tip, left, at).into_styled(fill).draw(target)?;
                    Triangle::new(tip, right, at).into_styled(fill).draw(target)?;
                }
            }
        }
        Ok(())
    }
}

impl Effect for Kaleidoscope {
    fn tick(&mut self) {
        self.rotation += 0.02;

        for element in self.elements.iter_mut() {
            element.rotation += element.spin;
            element.pulse_phase += element.pulse_speed;
            element.life = element.life.saturating_sub(1);
            element.angle += self.rng.gen_range(-0.005f32..0.005);
            element.distance = (element.distance + self.rng.gen_range(-0.2f32..0.2)).clamp(5.0, KALEIDO_RADIUS * 0.8);
        }
        self.elements.retain(|e| e.life > 0);
        self.refill();

        self.show_rim = self.rng.gen_bool(0.1);
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(to_565(KALEIDO_BG))?;
        let center = Point::new(CENTER_X, CENTER_Y);

        if self.show_rim {
            Circle::with_center(center, (KALEIDO_RADIUS * 2.0) as u32 + 1)
                .into_styled(PrimitiveStyle::with_stroke(to_565(KALEIDO_RIM), 1))
                .draw(target)?;
        }

        let limit = (KALEIDO_RADIUS * KALEIDO_RADIUS) as i32;
        for element in &self.elements {
            for at in self.mirrored(element) {
                let d = at - center;
                if d.x * d.x + d.y * d.y <= limit {
                    Self::draw_motif(element, at, target)?;
                }
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.elements.len() * SEGMENTS * 2 }
}

// =============================================================================
// Starfield Warp
// =============================================================================

const STARS: usize = 60;
const STAR_DEPTH: f32 = 20.0;
const PROJECTION: f32 = 40.0;
const SPACE_BG: Rgb565 = Rgb565::new(0, 1, 0);

#[derive(Clone, Copy, Debug)]
struct Star {
    x: f32,
    y: f32,
    z: f32,
    hue: f32,
}

/// Stars rushing toward the viewer at a pulsing warp speed.
pub struct StarfieldWarp {
    rng: SmallRng,
    stars: [Star; STARS],
    phase: f32,
    warp: f32,
}

impl StarfieldWarp {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut stars = [Star {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            hue: 0.0,
        }; STARS];
        for star in stars.iter_mut() {
            *star = Star {
                x: rng.gen_range(-10.0..10.0),
                y: rng.gen_range(-10.0..10.0),
                z: rng.gen_range(5.0..STAR_DEPTH),
                hue: rng.gen_range(0.0..360.0),
            };
        }

        Self {
            rng,
            stars,
            phase: 0.0,
            warp: 2.0,
        }
    }

    /// Current warp speed, between 0.5 and 3.5.
    pub const fn warp(&self) -> f32 { self.warp }

    fn project(
        x: f32,
        y: f32,
        z: f32,
    ) -> (f32, f32) {
        (x / z * PROJECTION + CENTER_X as f32, y / z * PROJECTION + CENTER_Y as f32)
    }
}

#[inline]
fn on_screen(
    x: f32,
    y: f32,
) -> bool {
    x >= 0.0 && x < WIDTH_F && y >= 0.0 && y < HEIGHT_F
}

impl Effect for StarfieldWarp {
    fn tick(&mut self) {
        self.phase += 0.05;
        self.warp = 2.0 + self.phase.sin() * 1.5;

        for star in self.stars.iter_mut() {
            star.z -= self.warp;
            if star.z <= 0.1 {
                *star = Star {
                    x: self.rng.gen_range(-10.0..10.0),
                    y: self.rng.gen_range(-10.0..10.0),
                    z: STAR_DEPTH,
                    hue: self.rng.gen_range(0.0..360.0),
                };
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
        target.clear(SPACE_BG)?;

        for star in &self.stars {
            let (px, py) = Self::project(star.x, star.y, star.z);
            if !on_screen(px, py) {
                continue;
            }
            let brightness = (1.0 - star.z / STAR_DEPTH).max(0.2);
            let size = 1 + (brightness * 3.0) as u32;
            let hue = star.hue + self.warp * 20.0;
            let at = Point::new(px as i32, py as i32);

            Circle::with_center(at, size * 2 + 1)
                .into_styled(PrimitiveStyle::with_fill(to_565(hsv(hue, 0.8, brightness))))
                .draw(target)?;

            if self.warp > 3.0 {
                let (tx, ty) = Self::project(star.x, star.y, star.z + self.warp * 2.0);
                if on_screen(tx, ty) {
                    Line::new(at, Point::new(tx as i32, ty as i32))
                        .into_styled(PrimitiveStyle::with_stroke(to_565(hsv(hue, 0.6, brightness * 0.5)), 1))
                        .draw(target)?;
                }
            }
        }

        if self.warp > 3.5 {
            let center = Point::new(CENTER_X, CENTER_Y);
            for ring in 1..=3 {
                let hue = self.phase * 100.0 + ring as f32 * 60.0;
                Circle::with_center(center, ring * 16 + 1)
                    .into_styled(PrimitiveStyle::with_stroke(to_565(hsv(hue, 1.0, 0.3)), 1))
                    .draw(target)?;
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { STARS }
}

// =============================================================================
// Spirograph
// =============================================================================

/// Ticks between curve parameter changes.
const SPIRO_CYCLE: u32 = 800;

/// A hypotrochoid traced dot by dot onto a persistent canvas.
pub struct Spirograph {
    canvas: Canvas,
    outer: f32,
    inner: f32,
    pen: f32,
    t: f32,
    color_offset: f32,
    frame: u32,
    cycles: u32,
}

impl Spirograph {
    pub fn new() -> Self {
        Self {
            canvas: Canvas::new(BLACK),
            outer: 40.0,
            inner: 15.0,
            pen: 20.0,
            t: 0.0,
            color_offset: 0.0,
            frame: 0,
            cycles: 0,
        }
    }

    /// Pen position relative to the screen center.
    fn pen_position(&self) -> (f32, f32) {
        let (big, small, d, t) = (self.outer, self.inner, self.pen, self.t);
        let k = small / big;
        let x = (big - small) * t.cos() + d * ((1.0 - k) * t / k).cos();
        let y = (big - small) * t.sin() - d * ((1.0 - k) * t / k).sin();
        (x, y)
    }

    /// Pick new curve parameters and start over on a blank canvas.
    fn next_curve(&mut self) {
        self.cycles += 1;
        let s = self.cycles as f32 * 24.0;
        self.outer = 30.0 + s.sin() * 15.0;
        self.inner = 10.0 + (s * 1.5).cos() * 8.0;
        self.pen = 15.0 + (s * 2.0).sin() * 10.0;
        self.t = 0.0;
        self.frame = 0;
        self.canvas.fill(BLACK);
    }
}

impl Default for Spirograph {
    fn default() -> Self { Self::new() }
}

impl Effect for Spirograph {
    fn tick(&mut self) {
        let (x, y) = self.pen_position();
        let at = Point::new(CENTER_X + x as i32, CENTER_Y + y as i32);
        let hue = self.color_offset + self.t * 20.0;
        let color = to_565(hsv(hue, 1.0, 0.9));

        Circle::with_center(at, 5)
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(&mut self.canvas)
            .ok();

        self.t += 0.15;
        self.color_offset += 0.5;
        self.frame += 1;
        if self.frame > SPIRO_CYCLE {
            self.next_curve();
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

    fn population(&self) -> usize { self.frame as usize }
}
