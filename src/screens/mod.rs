//! Screens the switchers draw while no effect owns the display.
//!
//! # Screens
//!
//! - **Status** ([`draw_status`]): effect number, name and button legend,
//!   shown between two effects
//! - **Info** ([`draw_info`]): name, category and wrapped description of
//!   the current effect (advanced switcher, joystick DOWN)
//! - **Controls** ([`draw_controls`]): full button legend at startup
//! - **Exit** ([`draw_exit`]): "Switcher OFF" before the display is cleared
//!
//! All screens draw onto any `DrawTarget<Color = Rgb565>`, so they can be
//! rendered into a [`crate::st7735::Framebuffer`] and checked in tests.
//! Only the 6x10 ASCII font is used for body text; arrows are spelled out.

mod info;
mod status;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use screensaver_common::styles::TOP_LEFT;

pub use info::{InfoLines, draw_info, wrap_words};
pub use status::{ADVANCED_LEGEND, Legend, SIMPLE_LEGEND, draw_controls, draw_exit, draw_status};

/// Draw `text` in the body font with its top-left corner at `(x, y)`.
fn body_text<D>(
    target: &mut D,
    text: &str,
    x: i32,
    y: i32,
    color: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(&FONT_6X10, color);
    Text::with_text_style(text, Point::new(x, y), style, TOP_LEFT).draw(target)?;
    Ok(())
}

/// First `max` characters of `text`.
fn truncate(
    text: &str,
    max: usize,
) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
