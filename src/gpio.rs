//! HAT buttons read through the GPIO character device.
//!
//! The keys and joystick pull their lines to ground when pressed. The
//! character device ABI used here cannot enable the SoC pull-ups, so they
//! must be set at boot, e.g. in `/boot/config.txt`:
//!
//! ```text
//! gpio=5,6,13,16,19,20,21,26=ip,pu
//! ```

use anyhow::{Context, Result};
use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};

use crate::config::ButtonPins;
use crate::input::{Button, ButtonReader};

/// BCM pin of `button` in `pins`.
pub const fn pin_of(
    pins: &ButtonPins,
    button: Button,
) -> u32 {
    match button {
        Button::Key1 => pins.key1,
        Button::Key2 => pins.key2,
        Button::Key3 => pins.key3,
        Button::Up => pins.up,
        Button::Down => pins.down,
        Button::Left => pins.left,
        Button::Right => pins.right,
        Button::Press => pins.press,
    }
}

/// Input lines for the buttons a switcher uses.
pub struct CdevButtons {
    lines: Vec<(Button, LineHandle)>,
}

impl CdevButtons {
    /// Request `buttons` as inputs on `chip_path`.
    pub fn open(
        chip_path: &str,
        pins: &ButtonPins,
        buttons: impl IntoIterator<Item = Button>,
    ) -> Result<Self> {
        let mut chip = Chip::new(chip_path).with_context(|| format!("opening {chip_path}"))?;
        let mut lines = Vec::new();
        for button in buttons {
            let pin = pin_of(pins, button);
            let handle = chip
                .get_line(pin)
                .with_context(|| format!("getting {button:?} line {pin}"))?
                .request(LineRequestFlags::INPUT, 0, "lcd-switcher")
                .with_context(|| format!("requesting {button:?} line {pin}"))?;
            lines.push((button, handle));
        }
        log::debug!("opened {} button lines on {chip_path}", lines.len());
        Ok(Self { lines })
    }
}

impl ButtonReader for CdevButtons {
    fn is_pressed(
        &mut self,
        button: Button,
    ) -> Result<bool> {
        match self.lines.iter().find(|(b, _)| *b == button) {
            Some((_, handle)) => Ok(handle.get_value().with_context(|| format!("reading {button:?}"))? == 0),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pins() {
        let pins = ButtonPins::default();
        let mapped: Vec<u32> = Button::ALL.iter().map(|&b| pin_of(&pins, b)).collect();
        assert_eq!(mapped, vec![21, 20, 16, 6, 19, 5, 26, 13]);
    }
}
