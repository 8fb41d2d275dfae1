//! Steered particle swarms: flow field, fireflies and digital dreams.
//!
//! All three push their particles with smooth sine forces and damp the
//! velocity every tick, so motion stays bounded without explicit speed caps.

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

use super::{Effect, noise, put_pixel};
use crate::colors::{hsv, to_565};
use crate::config::{CENTER_X, CENTER_Y, HEIGHT_F, HEIGHT_I, WIDTH_F, WIDTH_I};

fn disc<D>(
    target: &mut D,
    center: Point,
    radius: u32,
    color: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Circle::with_center(center, radius * 2 + 1)
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(target)
}

/// Faint random pixels scattered over the whole screen.
#[derive(Clone, Copy, Debug)]
struct Speck {
    at: Point,
    color: Rgb565,
}

// =============================================================================
// Flow Field
// =============================================================================

const FLOW_PARTICLES: usize = 80;
const FLOW_FORCE: f32 = 0.3;
const FLOW_DAMPING: f32 = 0.95;
const FLOW_BACKGROUND: Rgb565 = Rgb565::new(2, 4, 2);

#[derive(Clone, Copy, Debug, Default)]
struct Mote {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

impl Mote {
    fn speed(&self) -> f32 { (self.vx * self.vx + self.vy * self.vy).sqrt() }
}

/// Particles steered by a drifting sine vector field, drawn with a short
/// velocity tail.
pub struct FlowField {
    motes: [Mote; FLOW_PARTICLES],
    time: f32,
}

impl FlowField {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        Self {
            motes: core::array::from_fn(|_| Mote {
                x: rng.gen_range(0.0..WIDTH_F),
                y: rng.gen_range(0.0..HEIGHT_F),
                ..Mote::default()
            }),
            time: 0.0,
        }
    }

    /// Field force at `(x, y)` at the current time.
    pub fn force(
        &self,
        x: f32,
        y: f32,
    ) -> (f32, f32) {
        let t = self.time;
        let fx = (x * 0.02 + t).sin() * (y * 0.015 + t * 1.3).cos();
        let fy = (x * 0.015 + t * 0.7).cos() * (y * 0.02 + t).sin();
        (fx, fy)
    }
}

/// Wrap into `0.0..max`.
fn wrap(
    v: f32,
    max: f32,
) -> f32 {
    let wrapped = if v < 0.0 {
        v + max
    } else if v >= max {
        v - max
    } else {
        v
    };
    // Tiny negatives round up to `max`
    if wrapped >= max { 0.0 } else { wrapped }
}

impl Effect for FlowField {
    fn tick(&mut self) {
        self.time += 0.1;
        for i in 0..FLOW_PARTICLES {
            let (fx, fy) = self.force(self.motes[i].x, self.motes[i].y);
            let mote = &mut self.motes[i];
            mote.vx = (mote.vx + fx * FLOW_FORCE) * FLOW_DAMPING;
            mote.vy = (mote.vy + fy * FLOW_FORCE) * FLOW_DAMPING;
            mote.x = wrap(mote.x + mote.vx, WIDTH_F);
            mote.y = wrap(mote.y + mote.vy, HEIGHT_F);
        }
    }

    fn rasterize<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(FLOW_BACKGROUND)?;
        for (i, mote) in self.motes.iter().enumerate() {
            let speed = mote.speed();
            let hue = i as f32 * 15.0 + self.time * 50.0 + speed * 100.0;
            let color = to_565(hsv(hue, 1.0, (0.7 + speed * 0.3).min(1.0)));
            let at = Point::new(mote.x as i32, mote.y as i32);

            disc(target, at, 1 + (speed * 2.0) as u32, color)?;
            let tail = Point::new((mote.x - mote.vx * 3.0) as i32, (mote.y - mote.vy * 3.0) as i32);
            Line::new(at, tail)
                .into_styled(PrimitiveStyle::with_stroke(color, 1))
                .draw(target)?;
        }
        Ok(())
    }

    fn population(&self) -> usize { FLOW_PARTICLES }
}

// =============================================================================
// Firefly Swarm
// =============================================================================

const FIREFLIES: usize = 25;
const FIREFLY_MARGIN: f32 = 5.0;
const FIREFLY_BACKGROUND: Rgb565 = Rgb565::new(1, 2, 1);
const MAGIC_TRIES: usize = 8;

#[derive(Clone, Copy, Debug)]
struct Firefly {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    phase: f32,
    hue: f32,
}

impl Firefly {
    fn glow(&self) -> f32 { 0.6 + 0.4 * self.phase.sin() }
}

/// Wandering fireflies whose glow pulses at individual rates.
pub struct FireflySwarm {
    rng: SmallRng,
    flies: [Firefly; FIREFLIES],
    time: f32,
    /// Changes every tick; drives sparkle placement around bright flies.
    flicker: u32,
    magic: Vec<Speck, MAGIC_TRIES>,
}

impl FireflySwarm {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let flies = core::array::from_fn(|_| Firefly {
            x: rng.gen_range(FIREFLY_MARGIN..WIDTH_F - FIREFLY_MARGIN),
            y: rng.gen_range(FIREFLY_MARGIN..HEIGHT_F - FIREFLY_MARGIN),
            vx: rng.gen_range(-1.0..1.0),
            vy: rng.gen_range(-1.0..1.0),
            phase: rng.gen_range(0.0..TAU),
            hue: rng.gen_range(0.0..360.0),
        });
        Self {
            rng,
            flies,
            time: 0.0,
            flicker: 0,
            magic: Vec::new(),
        }
    }
}

impl Effect for FireflySwarm {
    fn tick(&mut self) {
        self.time += 0.05;
        let t = self.time;

        for (i, fly) in self.flies.iter_mut().enumerate() {
            let i = i as f32;
            let push_x = (fly.x * 0.02 + t).sin() * (t * 0.7 + i).cos();
            let push_y = (fly.y * 0.02 + t * 0.8).cos() * (t * 0.6 + i).sin();
            fly.vx = (fly.vx + push_x * 0.02) * 0.98;
            fly.vy = (fly.vy + push_y * 0.02) * 0.98;
            fly.x += fly.vx;
            fly.y += fly.vy;

            // Soft repulsion near the edges, then a hard clamp
            if fly.x < 10.0 {
                fly.vx += 0.1;
            }
            if fly.x > WIDTH_F - 10.0 {
                fly.vx -= 0.1;
            }
            if fly.y < 10.0 {
                fly.vy += 0.1;
            }
            if fly.y > HEIGHT_F - 10.0 {
                fly.vy -= 0.1;
            }
            fly.x = fly.x.clamp(FIREFLY_MARGIN, WIDTH_F - FIREFLY_MARGIN);
            fly.y = fly.y.clamp(FIREFLY_MARGIN, HEIGHT_F - FIREFLY_MARGIN);

            fly.phase += 0.08 + i.sin() * 0.02;
            fly.hue = (fly.hue + 0.5) % 360.0;
        }

        self.flicker = self.rng.r#gen();
        self.magic.clear();
        for _ in 0..MAGIC_TRIES {
            if self.rng.gen_range(0..1000) < 20 {
                let speck = Speck {
                    at: Point::new(self.rng.gen_range(0..WIDTH_I), self.rng.gen_range(0..HEIGHT_I)),
                    color: to_565(hsv(self.rng.gen_range(0.0..360.0), 1.0, 1.0)),
                };
                self.magic.push(speck).ok();
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
        target.clear(FIREFLY_BACKGROUND)?;

        for (i, fly) in self.flies.iter().enumerate() {
            let glow = fly.glow();
            let at = Point::new(fly.x as i32, fly.y as i32);
            let center = to_565(hsv(fly.hue, 0.4, 1.0));

            disc(target, at, 5, to_565(hsv(fly.hue, 0.6, glow * 0.6)))?;
            disc(target, at, 3, to_565(hsv(fly.hue, 0.8, glow)))?;
            disc(target, at, 1, center)?;

            if glow > 0.9 {
                for k in 0..4 {
                    let dx = (noise(self.flicker, i as i32, k * 2) * 7.0) as i32 - 3;
                    let dy = (noise(self.flicker, i as i32, k * 2 + 1) * 7.0) as i32 - 3;
                    put_pixel(target, at.x + dx, at.y + dy, center)?;
                }
            }
        }

        for speck in &self.magic {
            put_pixel(target, speck.at.x, speck.at.y, speck.color)?;
        }
        Ok(())
    }

    fn population(&self) -> usize { FIREFLIES }
}

// =============================================================================
// Digital Dreams
// =============================================================================

const NODES: usize = 20;
const WAVES: usize = 8;
const BURSTS: usize = 5;
const DREAM_SPECKS: usize = 12;
const LINK_DISTANCE: f32 = 40.0;
const BURST_LIFE: u8 = 30;
const WAVE_RESET: f32 = 80.0;
const WAVE_VISIBLE: f32 = 70.0;
const NODE_MARGIN: f32 = 5.0;

#[derive(Clone, Copy, Debug)]
struct Node {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    energy: f32,
    /// Sum of link strengths to every node within [`LINK_DISTANCE`].
    links: f32,
}

#[derive(Clone, Copy, Debug)]
struct Wave {
    x: f32,
    y: f32,
    radius: f32,
    speed: f32,
    hue: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Burst {
    at: Point,
    radius: i32,
    life: u8,
}

/// Drifting nodes linked to their neighbours, expanding rings, and golden
/// bursts where many nodes cluster.
pub struct DigitalDreams {
    rng: SmallRng,
    nodes: [Node; NODES],
    waves: [Wave; WAVES],
    bursts: [Burst; BURSTS],
    specks: Vec<Speck, DREAM_SPECKS>,
    time: f32,
}

/// Link strength in `0.0..=1.0`, zero beyond [`LINK_DISTANCE`].
fn link_strength(distance: f32) -> f32 {
    if distance < LINK_DISTANCE { 1.0 - distance / LINK_DISTANCE } else { 0.0 }
}

impl DigitalDreams {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let nodes = core::array::from_fn(|_| Node {
            x: rng.gen_range(10.0..WIDTH_F - 10.0),
            y: rng.gen_range(10.0..HEIGHT_F - 10.0),
            vx: rng.gen_range(-1.0..1.0),
            vy: rng.gen_range(-1.0..1.0),
            energy: rng.gen_range(0.5..1.0),
            links: 0.0,
        });
        let waves = core::array::from_fn(|_| Wave {
            x: rng.gen_range(0.0..WIDTH_F),
            y: rng.gen_range(0.0..HEIGHT_F),
            radius: 0.0,
            speed: rng.gen_range(0.5..1.0),
            hue: rng.gen_range(0.0..360.0),
        });
        Self {
            rng,
            nodes,
            waves,
            bursts: [Burst::default(); BURSTS],
            specks: Vec::new(),
            time: 0.0,
        }
    }

    fn distance(
        &self,
        a: usize,
        b: usize,
    ) -> f32 {
        let dx = self.nodes[b].x - self.nodes[a].x;
        let dy = self.nodes[b].y - self.nodes[a].y;
        (dx * dx + dy * dy).sqrt()
    }

    fn move_nodes(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.vx += (CENTER_X as f32 - node.x) * 0.002 + self.rng.gen_range(-0.1..0.1);
            node.vy += (CENTER_Y as f32 - node.y) * 0.002 + self.rng.gen_range(-0.1..0.1);
            node.vx *= 0.995;
            node.vy *= 0.995;
            node.x += node.vx;
            node.y += node.vy;

            if node.x < NODE_MARGIN || node.x > WIDTH_F - NODE_MARGIN {
                node.vx *= -0.8;
                node.x = node.x.clamp(NODE_MARGIN, WIDTH_F - NODE_MARGIN);
            }
            if node.y < NODE_MARGIN || node.y > HEIGHT_F - NODE_MARGIN {
                node.vy *= -0.8;
                node.y = node.y.clamp(NODE_MARGIN, HEIGHT_F - NODE_MARGIN);
            }
            node.energy = 0.5 + 0.5 * (self.time * 3.0 + i as f32 * 0.7).sin();
        }

        for i in 0..NODES {
            let links = (0..NODES)
                .filter(|&j| j != i)
                .map(|j| link_strength(self.distance(i, j)))
                .sum();
            self.nodes[i].links = links;
        }
    }

    fn spawn_bursts(&mut self) {
        for i in 0..NODES {
            if self.nodes[i].links <= 2.0 || self.rng.gen_range(0..1000) >= 30 {
                continue;
            }
            let at = Point::new(self.nodes[i].x as i32, self.nodes[i].y as i32);
            if let Some(slot) = self.bursts.iter_mut().find(|b| b.life == 0) {
                *slot = Burst {
                    at,
                    radius: 0,
                    life: BURST_LIFE,
                };
            }
        }
        for burst in self.bursts.iter_mut().filter(|b| b.life > 0) {
            burst.radius += 2;
            burst.life -= 1;
        }
    }

    fn grow_waves(&mut self) {
        for wave in self.waves.iter_mut() {
            wave.radius += wave.speed;
            if wave.radius > WAVE_RESET {
                *wave = Wave {
                    x: self.rng.gen_range(20.0..WIDTH_F - 20.0),
                    y: self.rng.gen_range(20.0..HEIGHT_F - 20.0),
                    radius: 0.0,
                    speed: 0.3 + self.rng.gen_range(0.0..1.0) / 3.0,
                    hue: self.rng.gen_range(0.0..360.0),
                };
            }
        }
    }

    fn node_hue(
        &self,
        i: usize,
    ) -> f32 {
        self.time * 40.0 + i as f32 * 25.0 + self.nodes[i].links * 50.0
    }
}

impl Effect for DigitalDreams {
    fn tick(&mut self) {
        self.time += 0.03;
        self.move_nodes();
        self.spawn_bursts();
        self.grow_waves();

        self.specks.clear();
        for k in 0..DREAM_SPECKS {
            if self.rng.gen_range(0..1000) < 40 {
                let speck = Speck {
                    at: Point::new(self.rng.gen_range(0..WIDTH_I), self.rng.gen_range(0..HEIGHT_I)),
                    color: to_565(hsv(self.time * 80.0 + k as f32 * 30.0, 0.6, 0.8)),
                };
                self.specks.push(speck).ok();
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
        let breath = 0.2 + 0.1 * (self.time * 2.0).sin();
        target.clear(to_565(hsv(240.0, 0.3, breath)))?;

        let point = |node: &Node| Point::new(node.x as i32, node.y as i32);
        for i in 0..NODES {
            for j in i + 1..NODES {
                let distance = self.distance(i, j);
                let strength = link_strength(distance);
                if strength > 0.0 {
                    let hue = self.time * 50.0 + distance * 3.0;
                    let color = to_565(hsv(hue, 0.8, strength * 0.6));
                    Line::new(point(&self.nodes[i]), point(&self.nodes[j]))
                        .into_styled(PrimitiveStyle::with_stroke(color, 1))
                        .draw(target)?;
                }
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let hue = self.node_hue(i);
            let size = 2 + ((node.energy + node.links * 0.5) * 3.0) as u32;
            disc(target, point(node), size, to_565(hsv(hue, 1.0, node.energy)))?;
            if node.energy > 0.8 {
                disc(target, point(node), 1, to_565(hsv(hue + 60.0, 0.8, 1.0)))?;
            }
        }

        for wave in &self.waves {
            if wave.radius > 5.0 && wave.radius < WAVE_VISIBLE {
                let fade = 1.0 - wave.radius / WAVE_VISIBLE;
                let color = to_565(hsv(wave.hue, 0.7, fade * 0.5));
                let diameter = (wave.radius as u32) * 2 + 1;
                Circle::with_center(Point::new(wave.x as i32, wave.y as i32), diameter)
                    .into_styled(PrimitiveStyle::with_stroke(color, 1))
                    .draw(target)?;
            }
        }

        for burst in self.bursts.iter().filter(|b| b.life > 0) {
            let color = to_565(hsv(45.0, 0.9, burst.life as f32 / BURST_LIFE as f32));
            for step in 0..12 {
                let angle = step as f32 * 30.0 * PI / 180.0;
                let x = burst.at.x + (angle.cos() * burst.radius as f32) as i32;
                let y = burst.at.y + (angle.sin() * burst.radius as f32) as i32;
                put_pixel(target, x, y, color)?;
            }
        }

        for speck in &self.specks {
            put_pixel(target, speck.at.x, speck.at.y, speck.color)?;
        }
        Ok(())
    }

    fn population(&self) -> usize { NODES + self.bursts.iter().filter(|b| b.life > 0).count() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_field_wraps_and_damps() {
        let mut flow = FlowField::new(4);
        for _ in 0..1000 {
            flow.tick();
            for mote in &flow.motes {
                assert!((0.0..WIDTH_F).contains(&mote.x));
                assert!((0.0..HEIGHT_F).contains(&mote.y));
                // Damped velocity never exceeds force / (1 - damping) per axis
                assert!(mote.vx.abs() <= 6.0 && mote.vy.abs() <= 6.0);
            }
        }
    }

    #[test]
    fn test_flow_force_bounded() {
        let mut flow = FlowField::new(1);
        for _ in 0..20 {
            flow.tick();
            for y in (0..128).step_by(11) {
                for x in (0..128).step_by(13) {
                    let (fx, fy) = flow.force(x as f32, y as f32);
                    assert!(fx.abs() <= 1.0 && fy.abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_wrap_enters_opposite_edge() {
        assert_eq!(wrap(-1.0, 128.0), 127.0);
        assert_eq!(wrap(128.5, 128.0), 0.5);
        assert_eq!(wrap(12.0, 128.0), 12.0);
    }

    #[test]
    fn test_fireflies_stay_inside_margin() {
        let mut swarm = FireflySwarm::new(6);
        for _ in 0..2000 {
            swarm.tick();
            for fly in &swarm.flies {
                assert!((FIREFLY_MARGIN..=WIDTH_F - FIREFLY_MARGIN).contains(&fly.x));
                assert!((FIREFLY_MARGIN..=HEIGHT_F - FIREFLY_MARGIN).contains(&fly.y));
                assert!((0.2..=1.0).contains(&fly.glow()));
            }
            assert!(swarm.magic.len() <= MAGIC_TRIES);
        }
    }

    #[test]
    fn test_firefly_glow_cycles() {
        let mut swarm = FireflySwarm::new(2);
        let mut bright = false;
        let mut dim = false;
        for _ in 0..200 {
            swarm.tick();
            bright |= swarm.flies[0].glow() > 0.9;
            dim |= swarm.flies[0].glow() < 0.3;
        }
        assert!(bright && dim);
    }

    #[test]
    fn test_link_strength_falls_off() {
        assert_eq!(link_strength(0.0), 1.0);
        assert_eq!(link_strength(20.0), 0.5);
        assert_eq!(link_strength(LINK_DISTANCE), 0.0);
        assert_eq!(link_strength(100.0), 0.0);
    }

    #[test]
    fn test_clustered_nodes_link_up() {
        let mut dreams = DigitalDreams::new(3);
        for (i, node) in dreams.nodes.iter_mut().enumerate() {
            node.x = if i < 4 { 60.0 + i as f32 } else { 5.0 + (i % 2) as f32 * 118.0 };
            node.y = if i < 4 { 60.0 } else { 5.0 + (i / 2) as f32 * 11.0 };
            node.vx = 0.0;
            node.vy = 0.0;
        }
        dreams.move_nodes();
        // Three close neighbours each
        assert!(dreams.nodes[0].links > 2.0);
        assert!(dreams.nodes[0].links <= 3.0);
    }

    #[test]
    fn test_dreams_stay_bounded() {
        let mut dreams = DigitalDreams::new(8);
        for _ in 0..1500 {
            dreams.tick();
            for node in &dreams.nodes {
                assert!((NODE_MARGIN..=WIDTH_F - NODE_MARGIN).contains(&node.x));
                assert!((NODE_MARGIN..=HEIGHT_F - NODE_MARGIN).contains(&node.y));
                assert!((0.0..=1.0).contains(&node.energy));
            }
            for wave in &dreams.waves {
                assert!(wave.radius <= WAVE_RESET + 1.0);
            }
            for burst in &dreams.bursts {
                assert!(burst.life <= BURST_LIFE);
            }
        }
    }

    #[test]
    fn test_bursts_expand_and_fade() {
        let mut dreams = DigitalDreams::new(5);
        dreams.bursts[0] = Burst {
            at: Point::new(64, 64),
            radius: 0,
            life: BURST_LIFE,
        };
        for n in 1..=BURST_LIFE {
            dreams.spawn_bursts();
            if dreams.bursts[0].at == Point::new(64, 64) {
                assert_eq!(dreams.bursts[0].radius, 2 * n as i32);
            }
        }
        assert!(dreams.bursts.iter().all(|b| b.life == 0 || b.at != Point::new(64, 64)));
    }
}
