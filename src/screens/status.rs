//! Status, controls and exit screens.
//!
//! # Layout (status)
//!
//! ```text
//! ┌────────────────────┐
//! │                    │
//! │  Screensaver #4    │  title font, yellow
//! │  Rainbow Matrix R  │  name, first 15 chars
//! │  4/10              │
//! │  KEY1: Next ->     │  legend, one row per button
//! │  KEY2: <- Prev     │
//! │  KEY3: Exit        │
//! └────────────────────┘
//! ```

use core::fmt::Write;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use heapless::String;
use screensaver_common::colors::{BLACK, HINT, STATUS_BG, WHITE, to_565};
use screensaver_common::styles::{TITLE_STYLE, TOP_LEFT};

use super::{body_text, truncate};

// =============================================================================
// Layout Constants
// =============================================================================

const STATUS_X: i32 = 10;
const TITLE_Y: i32 = 28;
const NAME_Y: i32 = 50;
const POSITION_Y: i32 = 63;
const LEGEND_Y: i32 = 80;
const LEGEND_STEP: i32 = 15;

/// Characters of the effect name that fit next to the margin.
const NAME_CHARS: usize = 15;

const CONTROLS_X: i32 = 2;
const CONTROLS_Y: i32 = 5;
const CONTROLS_STEP: i32 = 12;

const EXIT_POS: Point = Point::new(20, 60);

// =============================================================================
// Colors
// =============================================================================

const KEY_GREEN: Rgb888 = Rgb888::new(100, 255, 100);
const EXIT_RED: Rgb888 = Rgb888::new(255, 100, 100);

/// Button legend rows shown under the effect name.
pub type Legend = &'static [(&'static str, Rgb888)];

pub const SIMPLE_LEGEND: Legend = &[
    ("KEY1: Next ->", KEY_GREEN),
    ("KEY2: <- Prev", KEY_GREEN),
    ("KEY3: Exit", EXIT_RED),
];

pub const ADVANCED_LEGEND: Legend = &[
    ("KEY1: Next ->", KEY_GREEN),
    ("KEY2: <- Prev", KEY_GREEN),
    ("KEY3: Pause", KEY_GREEN),
];

const CONTROLS: &[&str] = &[
    "Button Controls:",
    "",
    "KEY1: Next ->",
    "KEY2: <- Prev",
    "KEY3: Pause",
    "UP: Favourites",
    "DOWN: Info",
    "PRESS: Exit",
];

/// Effect `position` of `total` (1-based) is about to start.
pub fn draw_status<D>(
    target: &mut D,
    position: usize,
    total: usize,
    name: &str,
    legend: Legend,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(to_565(STATUS_BG))?;

    let mut title: String<24> = String::new();
    let _ = write!(title, "Screensaver #{position}");
    Text::with_text_style(&title, Point::new(STATUS_X, TITLE_Y), TITLE_STYLE, TOP_LEFT).draw(target)?;

    body_text(target, truncate(name, NAME_CHARS), STATUS_X, NAME_Y, WHITE)?;

    let mut counter: String<12> = String::new();
    let _ = write!(counter, "{position}/{total}");
    body_text(target, &counter, STATUS_X, POSITION_Y, to_565(HINT))?;

    let mut y = LEGEND_Y;
    for &(line, color) in legend {
        body_text(target, line, STATUS_X, y, to_565(color))?;
        y += LEGEND_STEP;
    }
    Ok(())
}

/// Full button legend of the advanced switcher.
pub fn draw_controls<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(BLACK)?;
    let mut y = CONTROLS_Y;
    for line in CONTROLS {
        body_text(target, line, CONTROLS_X, y, WHITE)?;
        y += CONTROLS_STEP;
    }
    Ok(())
}

pub fn draw_exit<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(BLACK)?;
    body_text(target, "Switcher OFF", EXIT_POS.x, EXIT_POS.y, to_565(EXIT_RED))
}
