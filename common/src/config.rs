//! Display geometry constants.
//!
//! # Optimization: Pre-computed Layout Constants
//!
//! Every effect simulates on the fixed 128x128 panel of the Waveshare 1.44"
//! LCD HAT. Derived values (centers, pixel count) are computed at compile
//! time so per-frame code never recalculates them.

// =============================================================================
// Display Configuration
// =============================================================================

/// Display width in pixels (ST7735S on the Waveshare 1.44" HAT: 128x128).
pub const SCREEN_WIDTH: u32 = 128;

/// Display height in pixels.
pub const SCREEN_HEIGHT: u32 = 128;

/// Width as `i32` for drawing code that works in signed coordinates.
pub const WIDTH_I: i32 = SCREEN_WIDTH as i32;

/// Height as `i32` for drawing code that works in signed coordinates.
pub const HEIGHT_I: i32 = SCREEN_HEIGHT as i32;

/// Width as `f32` for simulation code.
pub const WIDTH_F: f32 = SCREEN_WIDTH as f32;

/// Height as `f32` for simulation code.
pub const HEIGHT_F: f32 = SCREEN_HEIGHT as f32;

/// Total number of pixels on the panel.
pub const PIXEL_COUNT: usize = (SCREEN_WIDTH * SCREEN_HEIGHT) as usize;

/// Screen center X coordinate.
pub const CENTER_X: i32 = (SCREEN_WIDTH / 2) as i32;

/// Screen center Y coordinate.
pub const CENTER_Y: i32 = (SCREEN_HEIGHT / 2) as i32;

// =============================================================================
// Glyph Metrics
// =============================================================================

/// Width of one glyph cell of the mono font used by the rain effects.
pub const GLYPH_WIDTH: i32 = 6;

/// Height of one glyph cell of the mono font used by the rain effects.
pub const GLYPH_HEIGHT: i32 = 10;
