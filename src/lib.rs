// Crate-level lints: Allow common graphics patterns that pedantic lints flag
#![allow(clippy::cast_possible_truncation)] // u32->i32, f32->i32 casts for pixel math
#![allow(clippy::cast_possible_wrap)] // pids and pin numbers fit in i32
#![allow(clippy::cast_sign_loss)] // i32->u32 where we know sign is positive
#![allow(clippy::module_name_repetitions)] // ServiceError in service, etc.
#![allow(clippy::missing_errors_doc)] // errors are described on the error types

//! Screensavers for the Waveshare 1.44" ST7735 LCD HAT on a Raspberry Pi.
//!
//! Each effect runs in its own process and renders into a 128x128 RGB565
//! framebuffer that is pushed to the panel over SPI. Around that sit the
//! pieces that manage those processes:
//!
//! - [`render_loop`] drives one effect from `screensaver-common` onto a
//!   [`display::DisplaySurface`]
//! - [`orchestrator`] owns the running child and switches between effects
//! - [`switcher`] maps the HAT buttons onto the orchestrator, with status
//!   and info screens from [`screens`]
//! - [`service`] installs systemd units that start an effect at boot
//! - [`cleanup`] frees the display and GPIO lines held by strays
//! - [`cli`], [`menu`] and [`commands`] form the command-line front end

pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod gpio;
pub mod input;
pub mod logging;
pub mod menu;
pub mod orchestrator;
pub mod proc_scan;
pub mod process;
pub mod registry;
pub mod render_loop;
pub mod screens;
pub mod service;
pub mod signals;
pub mod st7735;
pub mod switcher;
