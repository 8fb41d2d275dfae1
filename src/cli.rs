//! Command-line parsing.
//!
//! Arguments are parsed by hand into an [`Invocation`]. Parsing is pure so
//! it can be tested; printing usage and choosing the exit code is left to
//! `main`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use screensaver_common::SpeedLevel;

use crate::registry::EffectRegistry;
use crate::switcher::Mode;

/// Exit code for usage errors.
pub const USAGE_EXIT_CODE: u8 = 2;

/// Default run time of `test`.
pub const DEFAULT_TEST_SECONDS: u64 = 30;

/// Default journal lines of `service logs`.
pub const DEFAULT_LOG_LINES: usize = 50;

pub const USAGE: &str = "\
LCD screensavers for the Waveshare 1.44\" LCD HAT

USAGE:
    lcd-screensaver [--config PATH]                  interactive menu
    lcd-screensaver [--config PATH] <COMMAND>

COMMANDS:
    <id|key> [--speed N] [--duration S]             run an effect in the foreground
    run <id|key> [--speed N] [--duration S]         same as above
    random                                          run a random effect
    list                                            list all effects
    background <id|key|random|switcher>             start detached and print the pid
    switcher [simple|advanced]                      button switcher (default advanced)
    service install <id|key> [--start]              boot service for an effect
    service stable [--start]                        stable matrix rain service
    service random [--start]                        random effect service
    service status                                  state of every known unit
    service disable                                 stop and disable every unit
    service logs [N]                                last N journal lines (default 50)
    cleanup                                         free the display and GPIO lines
    test <id|key> [SECONDS]                         run as a child for a while (default 30)
    help                                            show this message

OPTIONS:
    --config PATH    configuration file (default ~/.config/lcd-screensaver/config.toml)
    --speed N        speed level 1-10 (6 is normal)
    --duration S     stop after S seconds

ENVIRONMENT:
    LCD_LOG          log level override (error, warn, info, debug, trace)";

/// Overrides for a foreground run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub speed: Option<SpeedLevel>,
    pub duration: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundTarget {
    Effect(String),
    Random,
    Switcher,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCommand {
    Install { selector: String, start: bool },
    Stable { start: bool },
    Random { start: bool },
    Status,
    Disable,
    Logs(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Menu,
    Help,
    List,
    Run { selector: String, flags: RunFlags },
    Random,
    Background(BackgroundTarget),
    Switcher(Mode),
    Service(ServiceCommand),
    Cleanup,
    Test { selector: String, seconds: u64 },
}

/// Parsed command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub invocation: Invocation,
}

/// Bad command line; `main` prints it with the usage and exits 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

fn usage(message: impl Into<String>) -> UsageError { UsageError(message.into()) }

/// Parse the arguments after the program name.
pub fn parse(
    args: &[String],
    registry: &EffectRegistry,
) -> Result<Cli, UsageError> {
    let (config, rest) = take_config(args)?;
    let words: Vec<&str> = rest.iter().map(String::as_str).collect();

    let invocation = match words.as_slice() {
        [] => Invocation::Menu,
        ["help" | "--help" | "-h", extra @ ..] => {
            no_more("help", extra)?;
            Invocation::Help
        }
        ["list", extra @ ..] => {
            no_more("list", extra)?;
            Invocation::List
        }
        ["random", extra @ ..] => {
            no_more("random", extra)?;
            Invocation::Random
        }
        ["cleanup", extra @ ..] => {
            no_more("cleanup", extra)?;
            Invocation::Cleanup
        }
        ["run"] => return Err(usage("run needs an effect id or key")),
        ["run", selector, flags @ ..] => Invocation::Run {
            selector: (*selector).to_string(),
            flags: run_flags(flags)?,
        },
        ["background", target] => Invocation::Background(match *target {
            "random" => BackgroundTarget::Random,
            "switcher" => BackgroundTarget::Switcher,
            selector => BackgroundTarget::Effect(selector.to_string()),
        }),
        ["background", ..] => return Err(usage("background takes exactly one of <id|key|random|switcher>")),
        ["switcher"] => Invocation::Switcher(Mode::Advanced),
        ["switcher", mode] => Invocation::Switcher(mode.parse().map_err(|e: anyhow::Error| usage(e.to_string()))?),
        ["switcher", ..] => return Err(usage("too many arguments for switcher")),
        ["service", sub @ ..] => Invocation::Service(service_command(sub)?),
        ["test"] => return Err(usage("test needs an effect id or key")),
        ["test", selector, extra @ ..] => {
            let seconds = match extra {
                [] => DEFAULT_TEST_SECONDS,
                [s] => s.parse().map_err(|_| usage(format!("invalid test duration: {s}")))?,
                _ => return Err(usage("too many arguments for test")),
            };
            Invocation::Test {
                selector: (*selector).to_string(),
                seconds,
            }
        }
        [selector, flags @ ..] if registry.resolve(selector).is_some() => Invocation::Run {
            selector: (*selector).to_string(),
            flags: run_flags(flags)?,
        },
        [other, ..] => return Err(usage(format!("Unknown command: {other}"))),
    };

    Ok(Cli { config, invocation })
}

/// Remove `--config PATH` (or `--config=PATH`) from anywhere in `args`.
fn take_config(args: &[String]) -> Result<(Option<PathBuf>, Vec<String>), UsageError> {
    let mut config = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().ok_or_else(|| usage("--config needs a path"))?;
            config = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((config, rest))
}

fn no_more(
    command: &str,
    extra: &[&str],
) -> Result<(), UsageError> {
    if extra.is_empty() {
        Ok(())
    } else {
        Err(usage(format!("too many arguments for {command}")))
    }
}

fn run_flags(args: &[&str]) -> Result<RunFlags, UsageError> {
    let mut flags = RunFlags::default();
    let mut iter = args.iter();
    while let Some(&arg) = iter.next() {
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .or_else(|| iter.next().copied())
                .ok_or_else(|| usage(format!("{name} needs a value")))
        };
        match name {
            "--speed" => {
                let raw = value()?;
                let level = raw
                    .parse::<u8>()
                    .ok()
                    .and_then(SpeedLevel::new)
                    .ok_or_else(|| usage(format!("speed must be 1-10, got {raw}")))?;
                flags.speed = Some(level);
            }
            "--duration" => {
                let raw = value()?;
                let seconds = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s > 0.0)
                    .ok_or_else(|| usage(format!("invalid duration: {raw}")))?;
                flags.duration = Some(Duration::from_secs_f64(seconds));
            }
            other => return Err(usage(format!("unknown option: {other}"))),
        }
    }
    Ok(flags)
}

fn service_command(args: &[&str]) -> Result<ServiceCommand, UsageError> {
    let start = |extra: &[&str]| match extra {
        [] => Ok(false),
        ["--start"] => Ok(true),
        _ => Err(usage("expected at most --start")),
    };
    match args {
        ["install", selector, extra @ ..] => Ok(ServiceCommand::Install {
            selector: (*selector).to_string(),
            start: start(extra)?,
        }),
        ["install"] => Err(usage("service install needs an effect id or key")),
        ["stable", extra @ ..] => Ok(ServiceCommand::Stable { start: start(extra)? }),
        ["random", extra @ ..] => Ok(ServiceCommand::Random { start: start(extra)? }),
        ["status"] => Ok(ServiceCommand::Status),
        ["disable"] => Ok(ServiceCommand::Disable),
        ["logs"] => Ok(ServiceCommand::Logs(DEFAULT_LOG_LINES)),
        ["logs", n] => n
            .parse()
            .map(ServiceCommand::Logs)
            .map_err(|_| usage(format!("invalid line count: {n}"))),
        [] => Err(usage("service needs a subcommand")),
        [other, ..] => Err(usage(format!("unknown or malformed service command: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_words(words: &[&str]) -> Result<Cli, UsageError> {
        let args: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
        parse(&args, &EffectRegistry::builtin())
    }

    fn invocation(words: &[&str]) -> Invocation { parse_words(words).unwrap().invocation }

    fn run(selector: &str) -> Invocation {
        Invocation::Run {
            selector: selector.to_string(),
            flags: RunFlags::default(),
        }
    }

    #[test]
    fn test_no_args_opens_menu() {
        assert_eq!(invocation(&[]), Invocation::Menu);
    }

    #[test]
    fn test_single_effect_argument() {
        assert_eq!(invocation(&["9"]), run("9"));
        assert_eq!(invocation(&["raindrops"]), run("raindrops"));
        assert_eq!(invocation(&["timer_medium"]), run("timer_medium"));
        assert_eq!(invocation(&["run", "campfire"]), run("campfire"));
    }

    #[test]
    fn test_one_word_commands() {
        assert_eq!(invocation(&["help"]), Invocation::Help);
        assert_eq!(invocation(&["-h"]), Invocation::Help);
        assert_eq!(invocation(&["--help"]), Invocation::Help);
        assert_eq!(invocation(&["list"]), Invocation::List);
        assert_eq!(invocation(&["random"]), Invocation::Random);
        assert_eq!(invocation(&["cleanup"]), Invocation::Cleanup);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse_words(&["frobnicate"]).unwrap_err(), UsageError("Unknown command: frobnicate".into()));
        assert!(parse_words(&["99"]).is_err());
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(parse_words(&["list", "extra"]).is_err());
        assert!(parse_words(&["random", "1"]).is_err());
        assert!(parse_words(&["background", "1", "2"]).is_err());
        assert!(parse_words(&["switcher", "simple", "now"]).is_err());
        assert!(parse_words(&["test", "1", "5", "6"]).is_err());
    }

    #[test]
    fn test_run_flags() {
        let parsed = invocation(&["run", "plasma_field", "--speed", "9", "--duration=2.5"]);
        assert_eq!(parsed, Invocation::Run {
            selector: "plasma_field".to_string(),
            flags: RunFlags {
                speed: SpeedLevel::new(9),
                duration: Some(Duration::from_millis(2500)),
            },
        });
        assert!(parse_words(&["run", "1", "--speed", "11"]).is_err());
        assert!(parse_words(&["run", "1", "--speed"]).is_err());
        assert!(parse_words(&["run", "1", "--duration", "-1"]).is_err());
        assert!(parse_words(&["run", "1", "--fast"]).is_err());
    }

    #[test]
    fn test_config_anywhere() {
        let cli = parse_words(&["run", "1", "--config", "/tmp/lcd.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lcd.toml")));
        assert_eq!(cli.invocation, run("1"));

        let cli = parse_words(&["--config=/etc/lcd.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/lcd.toml")));
        assert_eq!(cli.invocation, Invocation::Menu);

        assert!(parse_words(&["--config"]).is_err());
    }

    #[test]
    fn test_background_targets() {
        assert_eq!(
            invocation(&["background", "random"]),
            Invocation::Background(BackgroundTarget::Random)
        );
        assert_eq!(
            invocation(&["background", "switcher"]),
            Invocation::Background(BackgroundTarget::Switcher)
        );
        assert_eq!(
            invocation(&["background", "14"]),
            Invocation::Background(BackgroundTarget::Effect("14".into()))
        );
    }

    #[test]
    fn test_switcher_modes() {
        assert_eq!(invocation(&["switcher"]), Invocation::Switcher(Mode::Advanced));
        assert_eq!(invocation(&["switcher", "simple"]), Invocation::Switcher(Mode::Simple));
        assert!(parse_words(&["switcher", "fancy"]).is_err());
    }

    #[test]
    fn test_service_commands() {
        assert_eq!(
            invocation(&["service", "install", "7", "--start"]),
            Invocation::Service(ServiceCommand::Install {
                selector: "7".into(),
                start: true,
            })
        );
        assert_eq!(
            invocation(&["service", "stable"]),
            Invocation::Service(ServiceCommand::Stable { start: false })
        );
        assert_eq!(
            invocation(&["service", "logs"]),
            Invocation::Service(ServiceCommand::Logs(DEFAULT_LOG_LINES))
        );
        assert_eq!(invocation(&["service", "logs", "10"]), Invocation::Service(ServiceCommand::Logs(10)));
        assert_eq!(invocation(&["service", "status"]), Invocation::Service(ServiceCommand::Status));
        assert!(parse_words(&["service"]).is_err());
        assert!(parse_words(&["service", "status", "now"]).is_err());
        assert!(parse_words(&["service", "install", "7", "--later"]).is_err());
    }

    #[test]
    fn test_test_mode() {
        assert_eq!(invocation(&["test", "5"]), Invocation::Test {
            selector: "5".into(),
            seconds: DEFAULT_TEST_SECONDS,
        });
        assert_eq!(invocation(&["test", "5", "10"]), Invocation::Test {
            selector: "5".into(),
            seconds: 10,
        });
        assert!(parse_words(&["test", "5", "soon"]).is_err());
    }

    #[test]
    fn test_usage_mentions_every_command() {
        for word in ["run", "random", "list", "background", "switcher", "service", "cleanup", "test"] {
            assert!(USAGE.contains(word), "{word}");
        }
    }
}
