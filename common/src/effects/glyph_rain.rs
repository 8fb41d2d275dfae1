//! Falling glyph streams.
//!
//! The screen is split into fixed-width columns. Each column runs a countdown
//! and drops a new glyph from just above the top edge whenever it expires.
//! Glyphs fall at their own speed and fade every tick until they leave the
//! screen or go dark.
//!
//! Five styles share the simulation and differ only in their parameters and
//! coloring:
//!
//! | Style | Column | Speed | Fade | Notes |
//! |-------|--------|-------|------|-------|
//! | Classic | 8 px | 0.8-2.5 | 4 | green tiers |
//! | Stable | 8 px | 0.8-2.5 | 4 | at most 15 glyphs per column |
//! | Blue | 10 px | 1.0-3.0 | 5 | blue tiers |
//! | Rainbow | 9 px | 0.5-2.0 | 3 | hue drifts per glyph |
//! | Binary | 6 px | 1.0-3.0 x column | 6 | mostly `0`/`1`, white lead |

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use heapless::Vec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Effect, draw_glyph};
use crate::colors::{BLACK, WHITE, dim, hsv, to_565};
use crate::config::{HEIGHT_F, SCREEN_WIDTH};

// =============================================================================
// Constants
// =============================================================================

/// Upper bound on columns (6 px columns across 128 px).
const MAX_COLUMNS: usize = 22;

/// Upper bound on live glyphs in one column.
const MAX_PER_COLUMN: usize = 16;

/// Glyph cap per column for the stable style.
const STABLE_COLUMN_CAP: usize = 15;

/// Glyph set shared by the classic, stable, blue, and rainbow styles.
const CLASSIC_GLYPHS: &[u8] = b"0123456789ABCDEFabcdef!@#$%^&*()[]{}+-=<>?/\\|_~";

/// Symbols mixed into the binary stream.
const BINARY_SYMBOLS: &[u8] = b"+-*=<>|/\\:";

/// Rare glyphs in the binary stream.
const BINARY_RARE: &[u8] = b"$#@&%";

// =============================================================================
// Style Parameters
// =============================================================================

/// Visual variant of the glyph rain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GlyphStyle {
    Classic,
    Stable,
    Blue,
    Rainbow,
    Binary,
}

struct StyleParams {
    column_width: u32,
    first_timer: (u16, u16),
    timer: (u16, u16),
    speed: (f32, f32),
    fade: u8,
    start_y: f32,
    bottom_margin: f32,
}

impl GlyphStyle {
    const fn params(self) -> StyleParams {
        match self {
            Self::Classic | Self::Stable => StyleParams {
                column_width: 8,
                first_timer: (0, 50),
                timer: (25, 100),
                speed: (0.8, 2.5),
                fade: 4,
                start_y: -10.0,
                bottom_margin: if matches!(self, Self::Stable) { 5.0 } else { 10.0 },
            },
            Self::Blue => StyleParams {
                column_width: 10,
                first_timer: (0, 40),
                timer: (15, 70),
                speed: (1.0, 3.0),
                fade: 5,
                start_y: -10.0,
                bottom_margin: 10.0,
            },
            Self::Rainbow => StyleParams {
                column_width: 9,
                first_timer: (0, 60),
                timer: (30, 90),
                speed: (0.5, 2.0),
                fade: 3,
                start_y: -10.0,
                bottom_margin: 10.0,
            },
            Self::Binary => StyleParams {
                column_width: 6,
                first_timer: (0, 30),
                timer: (5, 25),
                speed: (1.0, 3.0),
                fade: 6,
                start_y: -8.0,
                bottom_margin: 10.0,
            },
        }
    }

    /// Glyphs dimmer than this are removed.
    const fn min_brightness(self) -> u8 {
        match self {
            Self::Stable => 10,
            _ => 0,
        }
    }
}

// =============================================================================
// Simulation State
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct Glyph {
    glyph: char,
    y: f32,
    speed: f32,
    brightness: u8,
    hue: f32,
}

struct Column {
    x: i32,
    timer: u16,
    hue_offset: f32,
    speed_scale: f32,
    glyphs: Vec<Glyph, MAX_PER_COLUMN>,
}

/// Glyph rain simulation.
pub struct GlyphRain {
    style: GlyphStyle,
    rng: SmallRng,
    columns: Vec<Column, MAX_COLUMNS>,
    time: u32,
}

impl GlyphRain {
    pub fn new(
        style: GlyphStyle,
        seed: u64,
    ) -> Self {
        let params = style.params();
        let mut rng = SmallRng::seed_from_u64(seed);
        let count = (SCREEN_WIDTH / params.column_width) as usize;
        let mut columns = Vec::new();

        for i in 0..count.min(MAX_COLUMNS) {
            let column = Column {
                x: (i as u32 * params.column_width) as i32,
                timer: rng.gen_range(params.first_timer.0..=params.first_timer.1),
                hue_offset: i as f32 * 360.0 / count as f32,
                speed_scale: if style == GlyphStyle::Binary { rng.gen_range(0.8..1.5) } else { 1.0 },
                glyphs: Vec::new(),
            };
            columns.push(column).ok();
        }

        Self {
            style,
            rng,
            columns,
            time: 0,
        }
    }

    fn pick_glyph(&mut self) -> char {
        let set = match self.style {
            GlyphStyle::Binary => {
                let roll: f32 = self.rng.r#gen();
                if roll < 0.85 {
                    return if self.rng.gen_bool(0.5) { '1' } else { '0' };
                } else if roll < 0.98 {
                    BINARY_SYMBOLS
                } else {
                    BINARY_RARE
                }
            }
            _ => CLASSIC_GLYPHS,
        };
        set[self.rng.gen_range(0..set.len())] as char
    }

    /// Foreground color of a glyph at its current brightness.
    fn glyph_color(
        &self,
        glyph: &Glyph,
        lead: bool,
    ) -> Rgb565 {
        let b = glyph.brightness;
        let f = b as f32 / 255.0;
        match self.style {
            GlyphStyle::Classic | GlyphStyle::Stable => match b {
                201.. => WHITE,
                151..=200 => to_565(Rgb888::new(200, 255, 200)),
                101..=150 => dim(Rgb888::GREEN, f * 0.9),
                _ => dim(Rgb888::GREEN, f * 0.6),
            },
            GlyphStyle::Blue => match b {
                201.. => to_565(Rgb888::new(220, 240, 255)),
                151..=200 => to_565(Rgb888::new(100, 180, 255)),
                101..=150 => dim(Rgb888::new(0, 120, 255), f * 0.9),
                _ => dim(Rgb888::new(0, 80, 220), f * 0.6),
            },
            GlyphStyle::Rainbow => {
                if f > 0.8 {
                    WHITE
                } else {
                    to_565(hsv(glyph.hue, 1.0, f))
                }
            }
            GlyphStyle::Binary => {
                if lead {
                    return WHITE;
                }
                match b {
                    181.. => Rgb565::GREEN,
                    121..=180 => dim(Rgb888::GREEN, f * 0.9),
                    61..=120 => dim(Rgb888::GREEN, f * 0.7),
                    _ => dim(Rgb888::GREEN, f * 0.5),
                }
            }
        }
    }
}

impl Effect for GlyphRain {
    fn tick(&mut self) {
        let params = self.style.params();
        let style = self.style;
        let time = self.time;
        let bottom = HEIGHT_F + params.bottom_margin;
        let min_brightness = style.min_brightness();

        for i in 0..self.columns.len() {
            let due = {
                let column = &mut self.columns[i];
                column.timer = column.timer.saturating_sub(1);
                column.timer == 0
            };

            if due {
                let capped = style == GlyphStyle::Stable && self.columns[i].glyphs.len() >= STABLE_COLUMN_CAP;
                if !capped {
                    let glyph = Glyph {
                        glyph: self.pick_glyph(),
                        y: params.start_y,
                        speed: self.rng.gen_range(params.speed.0..params.speed.1) * self.columns[i].speed_scale,
                        brightness: 255,
                        hue: self.columns[i].hue_offset + time as f32 * 2.0,
                    };
                    self.columns[i].glyphs.push(glyph).ok();
                }
                self.columns[i].timer = self.rng.gen_range(params.timer.0..=params.timer.1);
            }

            let column = &mut self.columns[i];
            for (index, glyph) in column.glyphs.iter_mut().enumerate() {
                glyph.y += glyph.speed;
                match style {
                    // The oldest glyph is the lead: drawn white, frozen at its brightness.
                    GlyphStyle::Binary if index == 0 => {}
                    GlyphStyle::Binary if glyph.brightness > 200 => glyph.brightness = 200,
                    _ => glyph.brightness = glyph.brightness.saturating_sub(params.fade),
                }
                if style == GlyphStyle::Rainbow {
                    glyph.hue += 1.0;
                }
            }
            column
                .glyphs
                .retain(|g| g.y <= bottom && g.brightness > min_brightness);
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
        for column in &self.columns {
            for (index, glyph) in column.glyphs.iter().enumerate() {
                let color = self.glyph_color(glyph, index == 0);
                draw_glyph(target, glyph.glyph, column.x, glyph.y as i32, color)?;
            }
        }
        Ok(())
    }

    fn population(&self) -> usize { self.columns.iter().map(|c| c.glyphs.len()).sum() }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::assert_never_brightens;

    fn run(
        rain: &mut GlyphRain,
        ticks: usize,
    ) {
        for _ in 0..ticks {
            rain.tick();
        }
    }

    #[test]
    fn test_column_layout() {
        assert_eq!(GlyphRain::new(GlyphStyle::Classic, 1).columns.len(), 16);
        assert_eq!(GlyphRain::new(GlyphStyle::Blue, 1).columns.len(), 12);
        assert_eq!(GlyphRain::new(GlyphStyle::Binary, 1).columns.len(), 21);
    }

    #[test]
    fn test_glyphs_only_fade() {
        let mut rain = GlyphRain::new(GlyphStyle::Classic, 7);
        for column in rain.columns.iter_mut() {
            column.timer = u16::MAX;
        }
        let glyph = Glyph {
            glyph: 'A',
            y: -10.0,
            speed: 1.5,
            brightness: 255,
            hue: 0.0,
        };
        rain.columns[3].glyphs.push(glyph).ok();

        let mut last = (glyph.y, glyph.brightness);
        for _ in 0..40 {
            rain.tick();
            let g = rain.columns[3].glyphs[0];
            assert!(g.brightness < last.1);
            assert!(g.y > last.0);
            last = (g.y, g.brightness);
        }
    }

    #[test]
    fn test_glyphs_removed_past_margin() {
        let mut rain = GlyphRain::new(GlyphStyle::Rainbow, 11);
        for _ in 0..600 {
            rain.tick();
            for column in &rain.columns {
                for glyph in &column.glyphs {
                    assert!(glyph.y <= HEIGHT_F + 10.0);
                    assert!(glyph.brightness > 0);
                }
            }
        }
    }

    #[test]
    fn test_stable_respects_cap() {
        let mut rain = GlyphRain::new(GlyphStyle::Stable, 5);
        for _ in 0..2000 {
            rain.tick();
            assert!(rain.columns.iter().all(|c| c.glyphs.len() <= STABLE_COLUMN_CAP));
            assert!(rain.columns.iter().flat_map(|c| c.glyphs.iter()).all(|g| g.brightness > 10));
        }
    }

    #[test]
    fn test_binary_lead_is_white_without_brightening() {
        let mut rain = GlyphRain::new(GlyphStyle::Binary, 9);
        run(&mut rain, 200);
        for column in &rain.columns {
            if let Some(lead) = column.glyphs.first() {
                assert_eq!(rain.glyph_color(lead, true), WHITE);
            }
            for glyph in column.glyphs.iter().skip(1) {
                assert!(glyph.brightness <= 200);
            }
        }
    }

    #[test]
    fn test_binary_glyphs_never_brighten() {
        let mut rain = GlyphRain::new(GlyphStyle::Binary, 9);
        assert_never_brightens(400, || {
            rain.tick();
            rain.columns
                .iter()
                .enumerate()
                .flat_map(|(i, c)| c.glyphs.iter().map(move |g| (((i as u64) << 32) | u64::from(g.speed.to_bits()), g.brightness)))
                .collect::<std::vec::Vec<_>>()
        });
    }

    #[test]
    fn test_every_style_never_brightens() {
        for style in [GlyphStyle::Classic, GlyphStyle::Blue, GlyphStyle::Rainbow, GlyphStyle::Stable] {
            let mut rain = GlyphRain::new(style, 21);
            assert_never_brightens(300, || {
                rain.tick();
                rain.columns
                    .iter()
                    .enumerate()
                    .flat_map(|(i, c)| {
                        c.glyphs
                            .iter()
                            .map(move |g| (((i as u64) << 32) | u64::from(g.speed.to_bits()), g.brightness))
                    })
                    .collect::<std::vec::Vec<_>>()
            });
        }
    }

    #[test]
    fn test_binary_glyphs_mostly_bits() {
        let mut rain = GlyphRain::new(GlyphStyle::Binary, 2);
        let bits = (0..1000).filter(|_| matches!(rain.pick_glyph(), '0' | '1')).count();
        assert!(bits > 750, "only {bits} bits");
    }

    #[test]
    fn test_classic_color_tiers() {
        let rain = GlyphRain::new(GlyphStyle::Classic, 1);
        let glyph = |brightness| Glyph {
            glyph: 'A',
            y: 0.0,
            speed: 1.0,
            brightness,
            hue: 0.0,
        };
        assert_eq!(rain.glyph_color(&glyph(255), false), WHITE);
        assert_eq!(rain.glyph_color(&glyph(180), false), to_565(Rgb888::new(200, 255, 200)));
        assert_ne!(rain.glyph_color(&glyph(40), false), WHITE);
    }
}
