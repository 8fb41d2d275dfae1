//! Effect simulations and shared constants for the LCD screensavers.
//!
//! This crate contains platform-agnostic code shared between the desktop
//! simulator and the Raspberry Pi binary:
//!
//! - [`colors`]: RGB565/RGB888 color constants and conversion helpers
//! - [`config`]: Display geometry constants
//! - [`styles`]: Pre-computed text styles for status screens
//! - [`speed`]: Frame-rate speed levels
//! - [`canvas`]: Persistent pixel canvas for effects that never clear
//! - [`effects`]: Every effect simulation behind the [`effects::Effect`] interface
//!
//! # no_std Compatibility
//!
//! This crate is `no_std` compatible. It avoids `std::time` entirely: effects
//! advance by discrete ticks and the caller decides how long a tick lasts.

#![cfg_attr(not(test), no_std)]
// Crate-level lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod canvas;
pub mod colors;
pub mod config;
pub mod effects;
pub mod speed;
pub mod styles;

// Re-export commonly used items
pub use colors::*;
pub use config::*;
pub use effects::{Effect, EffectKind, EffectState};
pub use speed::SpeedLevel;
