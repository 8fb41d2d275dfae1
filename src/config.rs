//! Runtime configuration.
//!
//! Everything that depends on wiring or taste lives here: SPI and GPIO
//! numbers, button debounce windows, switcher timings, service unit
//! location and logging. Values are read from an optional TOML file:
//!
//! ```toml
//! [display]
//! spi_speed_hz = 9000000
//! orientation = "upright"
//!
//! [switcher]
//! advanced_debounce_ms = 250
//!
//! [logging]
//! level = "debug"
//! file = "/var/log/lcd-screensaver.log"
//! ```
//!
//! Every section and field is optional; missing entries keep the defaults
//! below. Compile-time layout constants (screen size, frame delays) live in
//! the `screensaver-common` crate instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::display::Orientation;

// =============================================================================
// Defaults: Display (Waveshare 1.44" LCD HAT)
// =============================================================================

/// SPI device with the panel on chip-select 0.
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev0.0";

/// SPI clock. The ST7735S is specified up to 15 MHz; 9 MHz is reliable on the HAT.
pub const DEFAULT_SPI_SPEED_HZ: u32 = 9_000_000;

/// GPIO character device of the 40-pin header.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

/// Data/command select (BCM).
pub const DEFAULT_DC_PIN: u32 = 25;

/// Panel reset (BCM).
pub const DEFAULT_RST_PIN: u32 = 27;

/// Backlight enable (BCM).
pub const DEFAULT_BL_PIN: u32 = 24;

// =============================================================================
// Defaults: Switcher timing
// =============================================================================

/// Debounce window of the three-button switcher.
pub const SIMPLE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Debounce window of the advanced switcher.
pub const ADVANCED_DEBOUNCE: Duration = Duration::from_millis(300);

/// Button polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interval between checks for a crashed effect.
pub const CRASH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause before relaunching a crashed effect.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// SIGTERM grace period before SIGKILL (simple switcher).
pub const SIMPLE_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// SIGTERM grace period before SIGKILL (advanced switcher).
pub const ADVANCED_TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);

pub const STATUS_SCREEN_DURATION: Duration = Duration::from_millis(1500);
pub const INFO_SCREEN_DURATION: Duration = Duration::from_secs(2);
pub const CONTROLS_SCREEN_DURATION: Duration = Duration::from_secs(3);
pub const EXIT_SCREEN_DURATION: Duration = Duration::from_secs(2);

// =============================================================================
// Defaults: Service installation
// =============================================================================

/// Directory the systemd units are written to.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Account used when `$USER` is unset.
pub const FALLBACK_USER: &str = "pi";

// =============================================================================
// Configuration File
// =============================================================================

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub display: DisplayConfig,
    pub buttons: ButtonPins,
    pub switcher: SwitcherConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub effects: EffectsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub spi_device: String,
    pub spi_speed_hz: u32,
    pub gpio_chip: String,
    pub dc_pin: u32,
    pub rst_pin: u32,
    pub bl_pin: u32,
    pub orientation: Orientation,
    /// Overrides the orientation's column offset.
    pub x_offset: Option<u16>,
    /// Overrides the orientation's row offset.
    pub y_offset: Option<u16>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            spi_device: DEFAULT_SPI_DEVICE.to_string(),
            spi_speed_hz: DEFAULT_SPI_SPEED_HZ,
            gpio_chip: DEFAULT_GPIO_CHIP.to_string(),
            dc_pin: DEFAULT_DC_PIN,
            rst_pin: DEFAULT_RST_PIN,
            bl_pin: DEFAULT_BL_PIN,
            orientation: Orientation::default(),
            x_offset: None,
            y_offset: None,
        }
    }
}

/// BCM pin numbers of the HAT's keys and joystick. All are active low.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ButtonPins {
    pub key1: u32,
    pub key2: u32,
    pub key3: u32,
    pub up: u32,
    pub down: u32,
    pub left: u32,
    pub right: u32,
    pub press: u32,
}

impl Default for ButtonPins {
    fn default() -> Self {
        Self {
            key1: 21,
            key2: 20,
            key3: 16,
            up: 6,
            down: 19,
            left: 5,
            right: 26,
            press: 13,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwitcherConfig {
    pub simple_debounce_ms: u64,
    pub advanced_debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub crash_poll_interval_ms: u64,
    pub restart_delay_ms: u64,
    pub simple_terminate_timeout_ms: u64,
    pub advanced_terminate_timeout_ms: u64,
    pub status_screen_ms: u64,
    pub info_screen_ms: u64,
    pub controls_screen_ms: u64,
    pub exit_screen_ms: u64,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            simple_debounce_ms: ms(SIMPLE_DEBOUNCE),
            advanced_debounce_ms: ms(ADVANCED_DEBOUNCE),
            poll_interval_ms: ms(POLL_INTERVAL),
            crash_poll_interval_ms: ms(CRASH_POLL_INTERVAL),
            restart_delay_ms: ms(RESTART_DELAY),
            simple_terminate_timeout_ms: ms(SIMPLE_TERMINATE_TIMEOUT),
            advanced_terminate_timeout_ms: ms(ADVANCED_TERMINATE_TIMEOUT),
            status_screen_ms: ms(STATUS_SCREEN_DURATION),
            info_screen_ms: ms(INFO_SCREEN_DURATION),
            controls_screen_ms: ms(CONTROLS_SCREEN_DURATION),
            exit_screen_ms: ms(EXIT_SCREEN_DURATION),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Defaults to [`DEFAULT_UNIT_DIR`].
    pub unit_dir: Option<PathBuf>,
    /// Defaults to `$USER`, then [`FALLBACK_USER`].
    pub user: Option<String>,
    /// Defaults to the current working directory.
    pub working_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn unit_dir(&self) -> PathBuf {
        self.unit_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIT_DIR))
    }

    pub fn user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| FALLBACK_USER.to_string())
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    /// Optional log file, appended to.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectsConfig {
    /// Speed level 1..=10, 6 is nominal.
    pub speed: u8,
}

impl Default for EffectsConfig {
    fn default() -> Self { Self { speed: screensaver_common::speed::NORMAL_LEVEL } }
}

impl Config {
    /// Default location: `$XDG_CONFIG_HOME/lcd-screensaver/config.toml`.
    pub fn default_path() -> Option<PathBuf> { dirs::config_dir().map(|d| d.join("lcd-screensaver").join("config.toml")) }

    /// Load `explicit` if given, otherwise the default path when it exists.
    ///
    /// A missing default file yields the defaults; a missing explicit file or
    /// a malformed one is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> { Ok(toml::from_str(text)?) }
}

impl SwitcherConfig {
    pub const fn simple_debounce(&self) -> Duration { Duration::from_millis(self.simple_debounce_ms) }

    pub const fn advanced_debounce(&self) -> Duration { Duration::from_millis(self.advanced_debounce_ms) }

    pub const fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

    pub const fn crash_poll_interval(&self) -> Duration { Duration::from_millis(self.crash_poll_interval_ms) }

    pub const fn restart_delay(&self) -> Duration { Duration::from_millis(self.restart_delay_ms) }

    pub const fn simple_terminate_timeout(&self) -> Duration { Duration::from_millis(self.simple_terminate_timeout_ms) }

    pub const fn advanced_terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.advanced_terminate_timeout_ms)
    }

    pub const fn status_screen(&self) -> Duration { Duration::from_millis(self.status_screen_ms) }

    pub const fn info_screen(&self) -> Duration { Duration::from_millis(self.info_screen_ms) }

    pub const fn controls_screen(&self) -> Duration { Duration::from_millis(self.controls_screen_ms) }

    pub const fn exit_screen(&self) -> Duration { Duration::from_millis(self.exit_screen_ms) }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.display.spi_device, DEFAULT_SPI_DEVICE);
        assert_eq!(config.buttons, ButtonPins::default());
        assert_eq!(config.switcher.simple_debounce(), SIMPLE_DEBOUNCE);
        assert_eq!(config.switcher.advanced_terminate_timeout(), ADVANCED_TERMINATE_TIMEOUT);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.effects.speed, 6);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = Config::parse(
            r#"
            [display]
            spi_speed_hz = 4000000
            orientation = "rotated-cw"

            [buttons]
            key1 = 4

            [switcher]
            advanced_debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.display.spi_speed_hz, 4_000_000);
        assert_eq!(config.display.orientation, Orientation::RotatedCw);
        assert_eq!(config.display.dc_pin, DEFAULT_DC_PIN);
        assert_eq!(config.buttons.key1, 4);
        assert_eq!(config.buttons.key2, 20);
        assert_eq!(config.switcher.advanced_debounce(), Duration::from_millis(250));
        assert_eq!(config.switcher.simple_debounce(), SIMPLE_DEBOUNCE);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(Config::parse("[display]\nbrightness = 3\n").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }

    #[test]
    fn test_malformed_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging\nlevel = 1").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_service_overrides() {
        let config = Config::parse(
            r#"
            [service]
            unit_dir = "/tmp/units"
            user = "kiosk"
            working_dir = "/opt/lcd"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.unit_dir(), PathBuf::from("/tmp/units"));
        assert_eq!(config.service.user(), "kiosk");
        assert_eq!(config.service.working_dir(), PathBuf::from("/opt/lcd"));
    }
}
