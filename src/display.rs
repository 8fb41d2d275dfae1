//! Display surface abstraction.
//!
//! Effects render into a [`Framebuffer`] and hand it to a [`DisplaySurface`]
//! in one call per frame. The real surface is the ST7735 panel; tests use
//! [`MemorySurface`], which keeps the frames it was given.

use anyhow::{Result, bail};
use embedded_graphics::pixelcolor::Rgb565;
use serde::Deserialize;

use crate::st7735::Framebuffer;

/// Panel scan direction, named after how the image appears on the HAT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// Joystick on the left, keys on the right.
    #[default]
    Upright,
    RotatedCw,
    UpsideDown,
    RotatedCcw,
}

impl Orientation {
    /// ST7735 MADCTL value (MY, MX, MV bits; RGB order).
    pub const fn madctl(self) -> u8 {
        match self {
            Self::Upright => 0x20,
            Self::RotatedCw => 0x40,
            Self::UpsideDown => 0xE0,
            Self::RotatedCcw => 0x80,
        }
    }

    /// Column/row offset of the visible 128x128 window inside controller RAM.
    pub const fn offsets(self) -> (u16, u16) {
        if self.madctl() & 0x20 != 0 { (1, 2) } else { (2, 1) }
    }
}

/// A fixed-size RGB565 screen that accepts whole frames.
pub trait DisplaySurface {
    /// Reset and configure the panel.
    fn initialize(
        &mut self,
        orientation: Orientation,
    ) -> Result<()>;

    /// Fill the whole panel with one color.
    fn clear(
        &mut self,
        color: Rgb565,
    ) -> Result<()>;

    /// Push a complete frame in a single transfer.
    fn present(
        &mut self,
        frame: &Framebuffer,
    ) -> Result<()>;
}

impl<S: DisplaySurface + ?Sized> DisplaySurface for Box<S> {
    fn initialize(
        &mut self,
        orientation: Orientation,
    ) -> Result<()> {
        (**self).initialize(orientation)
    }

    fn clear(
        &mut self,
        color: Rgb565,
    ) -> Result<()> {
        (**self).clear(color)
    }

    fn present(
        &mut self,
        frame: &Framebuffer,
    ) -> Result<()> {
        (**self).present(frame)
    }
}

// =============================================================================
// In-memory surface
// =============================================================================

/// Surface that records what it was asked to show.
#[derive(Default)]
pub struct MemorySurface {
    pub orientation: Option<Orientation>,
    pub presented: usize,
    pub clears: Vec<Rgb565>,
    pub last_frame: Option<Framebuffer>,
    /// Fail every `present` after this many successful ones.
    pub fail_after: Option<usize>,
}

impl MemorySurface {
    pub fn new() -> Self { Self::default() }

    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }
}

impl DisplaySurface for MemorySurface {
    fn initialize(
        &mut self,
        orientation: Orientation,
    ) -> Result<()> {
        self.orientation = Some(orientation);
        Ok(())
    }

    fn clear(
        &mut self,
        color: Rgb565,
    ) -> Result<()> {
        self.clears.push(color);
        Ok(())
    }

    fn present(
        &mut self,
        frame: &Framebuffer,
    ) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.presented >= limit) {
            bail!("panel write failed after {} frames", self.presented);
        }
        self.presented += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_row_column_exchange() {
        assert_eq!(Orientation::Upright.offsets(), (1, 2));
        assert_eq!(Orientation::RotatedCw.offsets(), (2, 1));
        assert_eq!(Orientation::UpsideDown.offsets(), (1, 2));
        assert_eq!(Orientation::RotatedCcw.offsets(), (2, 1));
    }

    #[test]
    fn test_memory_surface_failure_injection() {
        let mut surface = MemorySurface::failing_after(2);
        let frame = Framebuffer::new();
        assert!(surface.present(&frame).is_ok());
        assert!(surface.present(&frame).is_ok());
        assert!(surface.present(&frame).is_err());
        assert_eq!(surface.presented, 2);
    }
}
