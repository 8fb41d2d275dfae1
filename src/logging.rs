//! Logger setup.
//!
//! Every process (effect, switcher, CLI) installs the same backend once:
//! stderr in mixed mode, plus an optional append-only log file. The level
//! comes from the config and can be overridden with `LCD_LOG`.

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::config::LoggingConfig;

/// Environment variable overriding the configured level.
pub const LEVEL_ENV: &str = "LCD_LOG";

/// Resolve the level from the override first, then the config.
pub fn resolve_level(
    configured: &str,
    override_value: Option<&str>,
) -> Result<LevelFilter> {
    let raw = override_value.unwrap_or(configured);
    LevelFilter::from_str(raw.trim()).with_context(|| format!("invalid log level {raw:?}"))
}

/// Install the global logger. Calling it twice is an error from `log`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_level = std::env::var(LEVEL_ENV).ok();
    let level = resolve_level(&config.level, env_level.as_deref())?;

    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Off)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(path) = &config.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        loggers.push(WriteLogger::new(level, log_config, file));
    }

    CombinedLogger::init(loggers).context("installing logger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        assert_eq!(resolve_level("info", Some("debug")).unwrap(), LevelFilter::Debug);
        assert_eq!(resolve_level("warn", None).unwrap(), LevelFilter::Warn);
    }

    #[test]
    fn test_level_is_case_insensitive() {
        assert_eq!(resolve_level("TRACE", None).unwrap(), LevelFilter::Trace);
        assert_eq!(resolve_level(" off ", None).unwrap(), LevelFilter::Off);
    }

    #[test]
    fn test_bad_level_is_error() {
        let err = resolve_level("info", Some("loud")).unwrap_err();
        assert!(err.to_string().contains("loud"));
    }
}
