//! Color constants and conversion helpers for the screensavers.
//!
//! # Color Formats
//!
//! Effects describe their palettes in [`Rgb888`] (8 bits per channel) because
//! fades and blends are computed per channel in full precision. The display
//! itself is driven in [`Rgb565`] (5-6-5 bits), so every color passes through
//! [`to_565`] or one of the scaling helpers right before it is drawn.
//!
//! ## Rgb565 Color Format
//!
//! Rgb565 uses 16 bits per pixel: 5 bits red, 6 bits green, 5 bits blue.
//! This format is native to the ST7735 controller and requires no conversion
//! when writing to the display buffer.

use embedded_graphics::pixelcolor::{Rgb565, Rgb888, RgbColor};

#[cfg(not(test))]
#[allow(unused_imports)]
use micromath::F32Ext;

// =============================================================================
// Standard Colors
// =============================================================================

/// Pure black (0, 0, 0). Default effect background.
pub const BLACK: Rgb565 = Rgb565::BLACK;

/// Pure white. Used for glyph leads and status text.
pub const WHITE: Rgb565 = Rgb565::WHITE;

/// Pure green. Used for the classic glyph trail.
pub const GREEN: Rgb565 = Rgb565::GREEN;

/// Pure yellow. Used for status screen titles.
pub const YELLOW: Rgb565 = Rgb565::YELLOW;

// =============================================================================
// Status Screen Colors
// =============================================================================

/// Background of the "now playing" status screen (0, 30, 0).
pub const STATUS_BG: Rgb888 = Rgb888::new(0, 30, 0);

/// Background of the info screen (0, 20, 40).
pub const INFO_BG: Rgb888 = Rgb888::new(0, 20, 40);

/// Light blue used for category lines on the info screen.
pub const INFO_CATEGORY: Rgb888 = Rgb888::new(200, 200, 255);

/// Pale green used for description lines on the info screen.
pub const INFO_TEXT: Rgb888 = Rgb888::new(200, 255, 200);

/// Gray used for control hints at the bottom of screens.
pub const HINT: Rgb888 = Rgb888::new(150, 150, 150);

// =============================================================================
// Conversion Helpers
// =============================================================================

/// Convert a full-precision color to the display format.
#[inline]
pub fn to_565(color: Rgb888) -> Rgb565 { Rgb565::from(color) }

/// Scale every channel of `color` by `factor`, saturating at 255.
///
/// Factors above 1.0 brighten the color; negative factors clamp to black.
pub fn scale(
    color: Rgb888,
    factor: f32,
) -> Rgb888 {
    let f = if factor > 0.0 { factor } else { 0.0 };
    let channel = |c: u8| -> u8 {
        let v = c as f32 * f;
        if v >= 255.0 { 255 } else { v as u8 }
    };
    Rgb888::new(channel(color.r()), channel(color.g()), channel(color.b()))
}

/// Scale a color by `factor` and convert it to the display format.
#[inline]
pub fn dim(
    color: Rgb888,
    factor: f32,
) -> Rgb565 {
    to_565(scale(color, factor))
}

/// Add two colors channel by channel, saturating at 255.
pub fn add(
    a: Rgb888,
    b: Rgb888,
) -> Rgb888 {
    Rgb888::new(
        a.r().saturating_add(b.r()),
        a.g().saturating_add(b.g()),
        a.b().saturating_add(b.b()),
    )
}

/// Convert HSV to RGB.
///
/// `hue` is in degrees and wraps; `saturation` and `value` are in `0.0..=1.0`.
pub fn hsv(
    hue: f32,
    saturation: f32,
    value: f32,
) -> Rgb888 {
    let mut h = hue % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    let c = value * saturation;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match h as u32 {
        0..60 => (c, x, 0.0),
        60..120 => (x, c, 0.0),
        120..180 => (0.0, c, x),
        180..240 => (0.0, x, c),
        240..300 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let channel = |v: f32| -> u8 {
        let scaled = (v + m) * 255.0;
        if scaled <= 0.0 {
            0
        } else if scaled >= 255.0 {
            255
        } else {
            scaled as u8
        }
    };
    Rgb888::new(channel(r), channel(g), channel(b))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_saturates() {
        let c = scale(Rgb888::new(200, 100, 0), 2.0);
        assert_eq!(c, Rgb888::new(255, 200, 0));
    }

    #[test]
    fn test_scale_negative_is_black() {
        assert_eq!(scale(Rgb888::WHITE, -1.0), Rgb888::BLACK);
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv(0.0, 1.0, 1.0), Rgb888::new(255, 0, 0));
        assert_eq!(hsv(120.0, 1.0, 1.0), Rgb888::new(0, 255, 0));
        assert_eq!(hsv(240.0, 1.0, 1.0), Rgb888::new(0, 0, 255));
    }

    #[test]
    fn test_hsv_wraps_hue() {
        assert_eq!(hsv(360.0, 1.0, 1.0), hsv(0.0, 1.0, 1.0));
        assert_eq!(hsv(-120.0, 1.0, 1.0), hsv(240.0, 1.0, 1.0));
    }

    #[test]
    fn test_add_saturates() {
        let c = add(Rgb888::new(250, 10, 0), Rgb888::new(10, 10, 0));
        assert_eq!(c, Rgb888::new(255, 20, 0));
    }
}
