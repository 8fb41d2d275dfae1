//! Interactive menu shown when the binary is started without arguments.
//!
//! The menu only turns numeric codes into [`Invocation`]s; executing them is
//! the caller's job. Input and output are generic so the whole dialogue can
//! be driven from a test.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use crate::cli::{BackgroundTarget, DEFAULT_LOG_LINES, DEFAULT_TEST_SECONDS, Invocation, RunFlags, ServiceCommand};
use crate::registry::{EffectRegistry, Stability, Target};
use crate::switcher::Mode;

// =============================================================================
// Codes
// =============================================================================

pub const CODE_EXIT: u32 = 0;
pub const CODE_SIMPLE_SWITCHER: u32 = 80;
pub const CODE_ADVANCED_SWITCHER: u32 = 81;
pub const CODE_BACKGROUND: u32 = 50;
pub const CODE_BOOT_MANAGER: u32 = 51;
pub const CODE_BACKGROUND_SWITCHER: u32 = 52;
pub const CODE_STABLE_SERVICE: u32 = 90;
pub const CODE_RANDOM_SERVICE: u32 = 91;
pub const CODE_DISABLE: u32 = 92;
pub const CODE_STATUS: u32 = 93;
pub const CODE_CLEANUP: u32 = 94;
pub const CODE_STATUS_ALT: u32 = 95;
pub const CODE_DISABLE_ALT: u32 = 96;
pub const CODE_LOGS: u32 = 97;
pub const CODE_TEST: u32 = 99;

const MANAGEMENT: &[(u32, &str)] = &[
    (CODE_BACKGROUND, "Start an effect in the background"),
    (CODE_BOOT_MANAGER, "Install an effect as boot screensaver"),
    (CODE_BACKGROUND_SWITCHER, "Start the button switcher in the background"),
    (CODE_STABLE_SERVICE, "Install the stable matrix rain service"),
    (CODE_RANDOM_SERVICE, "Install the random effect service"),
    (CODE_DISABLE, "Stop and disable every service"),
    (CODE_STATUS, "Service status"),
    (CODE_CLEANUP, "Free the display and GPIO lines"),
    (CODE_LOGS, "Boot service logs"),
    (CODE_TEST, "Test an effect"),
    (CODE_EXIT, "Exit"),
];

/// Outcome of one menu prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuChoice {
    Invoke(Invocation),
    /// Unknown code or bad follow-up answer; the menu is shown again.
    Invalid(String),
    Exit,
}

// =============================================================================
// Rendering
// =============================================================================

/// Menu text: the catalog grouped by category, then the management codes.
pub fn render(registry: &EffectRegistry) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "\n=== LCD Screensavers ===");
    for (category, members) in registry.by_category() {
        let _ = writeln!(text, "\n[{category}]");
        for descriptor in members {
            let marker = if descriptor.stability == Stability::Stable { " *" } else { "" };
            let _ = writeln!(text, "  {:>2}. {}{marker}", descriptor.id, descriptor.name);
        }
    }
    let _ = writeln!(text, "\n[Management]");
    for (code, label) in MANAGEMENT {
        let _ = writeln!(text, "  {code:>2}. {label}");
    }
    let _ = writeln!(text, "\n* recommended for unattended use");
    text
}

// =============================================================================
// Dialogue
// =============================================================================

/// Read one line; `None` on end of input.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask for a code and any follow-up answers it needs.
pub fn choose<R: BufRead, W: Write>(
    registry: &EffectRegistry,
    input: &mut R,
    output: &mut W,
) -> io::Result<MenuChoice> {
    let Some(answer) = prompt(input, output, "Choice: ")? else {
        return Ok(MenuChoice::Exit);
    };
    let Ok(code) = answer.parse::<u32>() else {
        return Ok(MenuChoice::Invalid(format!("Invalid choice: {answer}")));
    };

    let invocation = match code {
        CODE_EXIT => return Ok(MenuChoice::Exit),
        CODE_SIMPLE_SWITCHER => Invocation::Switcher(Mode::Simple),
        CODE_ADVANCED_SWITCHER => Invocation::Switcher(Mode::Advanced),
        CODE_BACKGROUND => {
            let Some(selector) = prompt(input, output, "Effect id, key or 'random': ")? else {
                return Ok(MenuChoice::Exit);
            };
            if selector == "random" {
                Invocation::Background(BackgroundTarget::Random)
            } else if registry.resolve(&selector).is_some() {
                Invocation::Background(BackgroundTarget::Effect(selector))
            } else {
                return Ok(unknown_effect(&selector));
            }
        }
        CODE_BOOT_MANAGER => {
            let Some(selector) = prompt(input, output, "Effect id for the boot screensaver: ")? else {
                return Ok(MenuChoice::Exit);
            };
            if registry.resolve(&selector).is_none() {
                return Ok(unknown_effect(&selector));
            }
            Invocation::Service(ServiceCommand::Install { selector, start: true })
        }
        CODE_BACKGROUND_SWITCHER => Invocation::Background(BackgroundTarget::Switcher),
        CODE_STABLE_SERVICE => Invocation::Service(ServiceCommand::Stable { start: true }),
        CODE_RANDOM_SERVICE => Invocation::Service(ServiceCommand::Random { start: true }),
        CODE_DISABLE | CODE_DISABLE_ALT => Invocation::Service(ServiceCommand::Disable),
        CODE_STATUS | CODE_STATUS_ALT => Invocation::Service(ServiceCommand::Status),
        CODE_CLEANUP => Invocation::Cleanup,
        CODE_LOGS => Invocation::Service(ServiceCommand::Logs(DEFAULT_LOG_LINES)),
        CODE_TEST => {
            let Some(selector) = prompt(input, output, "Effect id to test: ")? else {
                return Ok(MenuChoice::Exit);
            };
            if registry.resolve(&selector).is_none() {
                return Ok(unknown_effect(&selector));
            }
            let Some(seconds) = prompt(input, output, &format!("Seconds [{DEFAULT_TEST_SECONDS}]: "))? else {
                return Ok(MenuChoice::Exit);
            };
            let seconds = match seconds.as_str() {
                "" => DEFAULT_TEST_SECONDS,
                s => match s.parse() {
                    Ok(n) if n > 0 => n,
                    _ => return Ok(MenuChoice::Invalid(format!("Invalid duration: {s}"))),
                },
            };
            Invocation::Test { selector, seconds }
        }
        id => match registry.by_id(id) {
            Some(descriptor) => match descriptor.target {
                Target::Effect(_) => Invocation::Run {
                    selector: id.to_string(),
                    flags: RunFlags::default(),
                },
                Target::SimpleSwitcher => Invocation::Switcher(Mode::Simple),
                Target::AdvancedSwitcher => Invocation::Switcher(Mode::Advanced),
            },
            None => return Ok(MenuChoice::Invalid(format!("Invalid choice: {code}"))),
        },
    };
    Ok(MenuChoice::Invoke(invocation))
}

fn unknown_effect(selector: &str) -> MenuChoice { MenuChoice::Invalid(format!("Unknown effect: {selector}")) }

/// Show the menu and execute choices until `0` or end of input.
///
/// Failures of a single choice are reported and the menu continues.
pub fn run<R, W, E>(
    registry: &EffectRegistry,
    input: &mut R,
    output: &mut W,
    mut execute: E,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    E: FnMut(&Invocation) -> anyhow::Result<()>,
{
    loop {
        write!(output, "{}", render(registry))?;
        match choose(registry, input, output)? {
            MenuChoice::Exit => {
                writeln!(output, "Goodbye")?;
                return Ok(());
            }
            MenuChoice::Invalid(message) => writeln!(output, "{message}")?,
            MenuChoice::Invoke(invocation) => {
                if let Err(e) = execute(&invocation) {
                    log::error!("{e:#}");
                    writeln!(output, "Error: {e:#}")?;
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn answer(lines: &str) -> MenuChoice {
        let registry = EffectRegistry::builtin();
        let mut input = Cursor::new(lines.as_bytes().to_vec());
        let mut output = Vec::new();
        choose(&registry, &mut input, &mut output).unwrap()
    }

    #[test]
    fn test_render_lists_categories_and_codes() {
        let text = render(&EffectRegistry::builtin());
        assert!(text.contains("[Matrix/Rain]"));
        assert!(text.contains("   1. Fixed Matrix Rain (Stable) *"));
        assert!(text.contains("  94. Free the display and GPIO lines"));
        assert!(text.contains("   0. Exit"));
    }

    #[test]
    fn test_effect_codes_run_in_foreground() {
        assert_eq!(
            answer("9\n"),
            MenuChoice::Invoke(Invocation::Run {
                selector: "9".to_string(),
                flags: RunFlags::default(),
            })
        );
    }

    #[test]
    fn test_switcher_codes() {
        assert_eq!(answer("80\n"), MenuChoice::Invoke(Invocation::Switcher(Mode::Simple)));
        assert_eq!(answer("81\n"), MenuChoice::Invoke(Invocation::Switcher(Mode::Advanced)));
        assert_eq!(answer("52\n"), MenuChoice::Invoke(Invocation::Background(BackgroundTarget::Switcher)));
    }

    #[test]
    fn test_management_aliases() {
        let disable = MenuChoice::Invoke(Invocation::Service(ServiceCommand::Disable));
        assert_eq!(answer("92\n"), disable);
        assert_eq!(answer("96\n"), disable);
        let status = MenuChoice::Invoke(Invocation::Service(ServiceCommand::Status));
        assert_eq!(answer("93\n"), status);
        assert_eq!(answer("95\n"), status);
        assert_eq!(answer("94\n"), MenuChoice::Invoke(Invocation::Cleanup));
        assert_eq!(
            answer("97\n"),
            MenuChoice::Invoke(Invocation::Service(ServiceCommand::Logs(DEFAULT_LOG_LINES)))
        );
    }

    #[test]
    fn test_follow_up_prompts() {
        assert_eq!(
            answer("50\nrandom\n"),
            MenuChoice::Invoke(Invocation::Background(BackgroundTarget::Random))
        );
        assert_eq!(
            answer("51\n7\n"),
            MenuChoice::Invoke(Invocation::Service(ServiceCommand::Install {
                selector: "7".to_string(),
                start: true,
            }))
        );
        assert_eq!(
            answer("99\n3\n\n"),
            MenuChoice::Invoke(Invocation::Test {
                selector: "3".to_string(),
                seconds: DEFAULT_TEST_SECONDS,
            })
        );
        assert_eq!(
            answer("99\n3\n5\n"),
            MenuChoice::Invoke(Invocation::Test {
                selector: "3".to_string(),
                seconds: 5,
            })
        );
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(answer("abc\n"), MenuChoice::Invalid("Invalid choice: abc".to_string()));
        assert_eq!(answer("77\n"), MenuChoice::Invalid("Invalid choice: 77".to_string()));
        assert_eq!(answer("99\n3\nsoon\n"), MenuChoice::Invalid("Invalid duration: soon".to_string()));
        assert_eq!(answer("51\nnope\n"), MenuChoice::Invalid("Unknown effect: nope".to_string()));
    }

    #[test]
    fn test_end_of_input_exits() {
        assert_eq!(answer(""), MenuChoice::Exit);
        assert_eq!(answer("0\n"), MenuChoice::Exit);
        assert_eq!(answer("50\n"), MenuChoice::Exit);
    }

    #[test]
    fn test_loop_executes_until_exit() {
        let registry = EffectRegistry::builtin();
        let mut input = Cursor::new(b"94\n77\n93\n0\n".to_vec());
        let mut output = Vec::new();
        let mut seen = Vec::new();
        run(&registry, &mut input, &mut output, |invocation| {
            seen.push(invocation.clone());
            anyhow::ensure!(*invocation != Invocation::Cleanup, "lines busy");
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![Invocation::Cleanup, Invocation::Service(ServiceCommand::Status)]
        );
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Error: lines busy"));
        assert!(text.contains("Invalid choice: 77"));
        assert!(text.ends_with("Goodbye\n"));
    }
}
