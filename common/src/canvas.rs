//! Persistent pixel canvas.
//!
//! Most effects redraw the whole frame every tick. A few (the spirograph)
//! let their drawing build up over time instead. [`Canvas`] keeps those pixels
//! between ticks and copies them onto the real target in one
//! `fill_contiguous` call.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::config::{PIXEL_COUNT, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Full-screen RGB565 pixel store that implements [`DrawTarget`].
pub struct Canvas {
    pixels: [Rgb565; PIXEL_COUNT],
}

impl Canvas {
    /// Create a canvas filled with `color`.
    pub const fn new(color: Rgb565) -> Self {
        Self {
            pixels: [color; PIXEL_COUNT],
        }
    }

    /// Fill the whole canvas with `color`.
    pub fn fill(
        &mut self,
        color: Rgb565,
    ) {
        self.pixels.fill(color);
    }

    /// Read a pixel, `None` outside the screen.
    pub fn pixel(
        &self,
        x: i32,
        y: i32,
    ) -> Option<Rgb565> {
        index(x, y).map(|i| self.pixels[i])
    }

    /// Copy the canvas onto `target` in a single contiguous fill.
    pub fn blit<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let area = Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
        target.fill_contiguous(&area, self.pixels.iter().copied())
    }
}

#[inline]
fn index(
    x: i32,
    y: i32,
) -> Option<usize> {
    if x >= 0 && x < SCREEN_WIDTH as i32 && y >= 0 && y < SCREEN_HEIGHT as i32 {
        Some(y as usize * SCREEN_WIDTH as usize + x as usize)
    } else {
        None
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size { Size::new(SCREEN_WIDTH, SCREEN_HEIGHT) }
}

impl DrawTarget for Canvas {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(
        &mut self,
        pixels: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(i) = index(point.x, point.y) {
                self.pixels[i] = color;
            }
        }
        Ok(())
    }

    fn clear(
        &mut self,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
