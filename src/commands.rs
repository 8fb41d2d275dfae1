//! Execution of parsed invocations.
//!
//! Everything that touches real hardware or the service manager is wired up
//! here; the pieces themselves live in their own modules and are tested
//! against fakes.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use rand::seq::SliceRandom;
use screensaver_common::SpeedLevel;

use crate::cleanup::{CLEANUP_GRACE, cleanup};
use crate::cli::{BackgroundTarget, Invocation, RunFlags, ServiceCommand, USAGE};
use crate::config::Config;
use crate::gpio::CdevButtons;
use crate::menu;
use crate::orchestrator::{Orchestrator, SystemConflicts};
use crate::proc_scan::{StraySweeper, SweepScope};
use crate::process::{Launcher, ProcessHandle, SelfExecLauncher};
use crate::registry::{EffectDescriptor, EffectRegistry, Stability, Target};
use crate::render_loop::{RunOptions, run_effect};
use crate::service::{Profile, ServiceInstaller, SystemRunner, format_status, own_unit};
use crate::signals::{SignalGuard, StopFlag};
use crate::st7735::open_hat;
use crate::switcher::{Mode, Switcher};

// =============================================================================
// Test Mode And Background Launch
// =============================================================================

/// Run `descriptor` as a child for `duration`.
///
/// Surviving the whole duration is success and returns how long it ran. An
/// early exit, whatever its status, is an error carrying that status.
pub fn test_effect<L: Launcher>(
    launcher: &L,
    descriptor: &EffectDescriptor,
    duration: Duration,
) -> Result<Duration> {
    let command = launcher
        .command(descriptor)
        .ok_or_else(|| anyhow!("{} cannot be launched", descriptor.key))?;
    let mut handle =
        ProcessHandle::spawn(command, descriptor.key).with_context(|| format!("spawning {}", descriptor.key))?;
    let started = Instant::now();

    match handle.wait_timeout(duration).context("waiting for the effect")? {
        Some(status) => bail!(
            "{} exited after {:.1}s with {status}",
            descriptor.name,
            started.elapsed().as_secs_f32()
        ),
        None => {
            let ran = started.elapsed();
            handle.terminate(CLEANUP_GRACE).context("stopping the effect")?;
            Ok(ran)
        }
    }
}

/// Start `descriptor` in its own process group with output discarded and
/// return its pid without waiting for it.
pub fn launch_detached<L: Launcher>(
    launcher: &L,
    descriptor: &EffectDescriptor,
) -> Result<u32> {
    let mut command = launcher
        .command(descriptor)
        .ok_or_else(|| anyhow!("{} cannot be launched", descriptor.key))?;
    command.stdout(Stdio::null()).stderr(Stdio::null());
    let handle =
        ProcessHandle::spawn(command, descriptor.key).with_context(|| format!("spawning {}", descriptor.key))?;
    // Dropping the handle neither kills nor waits for the child.
    Ok(handle.pid())
}

/// A uniformly chosen renderable effect.
pub fn random_effect(registry: &EffectRegistry) -> Option<&EffectDescriptor> {
    let candidates: Vec<&EffectDescriptor> = registry.renderable().collect();
    candidates.choose(&mut rand::thread_rng()).copied()
}

// =============================================================================
// Application
// =============================================================================

pub struct App<'a> {
    config: &'a Config,
    config_path: Option<PathBuf>,
    registry: &'a EffectRegistry,
}

impl<'a> App<'a> {
    pub fn new(
        config: &'a Config,
        config_path: Option<PathBuf>,
        registry: &'a EffectRegistry,
    ) -> Self {
        Self {
            config,
            config_path,
            registry,
        }
    }

    pub fn execute(
        &self,
        invocation: &Invocation,
    ) -> Result<()> {
        match invocation {
            Invocation::Menu => self.menu(),
            Invocation::Help => {
                println!("{USAGE}");
                Ok(())
            }
            Invocation::List => {
                self.list();
                Ok(())
            }
            Invocation::Run { selector, flags } => {
                let descriptor = self.descriptor(selector)?;
                self.run_foreground(descriptor, *flags)
            }
            Invocation::Random => {
                let descriptor = random_effect(self.registry).context("no effects available")?;
                log::info!("random pick: #{} {}", descriptor.id, descriptor.name);
                self.run_foreground(descriptor, RunFlags::default())
            }
            Invocation::Background(target) => self.background(target),
            Invocation::Switcher(mode) => self.switcher(*mode),
            Invocation::Service(command) => self.service(command),
            Invocation::Cleanup => {
                let mut runner = SystemRunner::new();
                let report = cleanup(&mut runner, &StraySweeper::for_current_exe(), CLEANUP_GRACE);
                println!("{report}");
                Ok(())
            }
            Invocation::Test { selector, seconds } => self.test(selector, *seconds),
        }
    }

    fn descriptor(
        &self,
        selector: &str,
    ) -> Result<&'a EffectDescriptor> {
        self.registry
            .resolve(selector)
            .with_context(|| format!("Unknown effect: {selector}"))
    }

    /// Self-exec launcher forwarding `--config`.
    fn launcher(&self) -> Result<SelfExecLauncher> {
        let launcher = SelfExecLauncher::current().context("locating the executable")?;
        Ok(match &self.config_path {
            Some(path) => launcher.with_args(["--config".to_string(), path.display().to_string()]),
            None => launcher,
        })
    }

    fn menu(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        menu::run(self.registry, &mut input, &mut output, |invocation| self.execute(invocation))
            .context("menu input")
    }

    fn list(&self) {
        for (category, members) in self.registry.by_category() {
            println!("{category}");
            for descriptor in members {
                let stable = if descriptor.stability == Stability::Stable { " [stable]" } else { "" };
                println!(
                    "  {:>2}  {:<18} {}{stable}",
                    descriptor.id, descriptor.key, descriptor.name
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Foreground
    // -------------------------------------------------------------------------

    fn run_foreground(
        &self,
        descriptor: &EffectDescriptor,
        flags: RunFlags,
    ) -> Result<()> {
        let kind = match descriptor.target {
            Target::Effect(kind) => kind,
            Target::SimpleSwitcher => return self.switcher(Mode::Simple),
            Target::AdvancedSwitcher => return self.switcher(Mode::Advanced),
        };

        let speed = match flags.speed {
            Some(speed) => speed,
            None => SpeedLevel::new(self.config.effects.speed).unwrap_or_else(|| {
                log::warn!("configured speed {} out of range, using normal", self.config.effects.speed);
                SpeedLevel::default()
            }),
        };

        let stop = StopFlag::new();
        let _guard = SignalGuard::install(stop.clone())?;
        let mut panel = open_hat(&self.config.display)?;

        let mut options = RunOptions::new(rand::random());
        options.speed = speed;
        options.duration = flags.duration;
        options.orientation = self.config.display.orientation;

        log::info!("running #{} {} at speed {:?}", descriptor.id, descriptor.name, speed);
        let summary = run_effect(kind, &mut panel, options, &stop)?;
        log::info!("{} stopped after {} frames ({:?})", descriptor.key, summary.frames, summary.reason);
        Ok(())
    }

    fn switcher(
        &self,
        mode: Mode,
    ) -> Result<()> {
        let timing = self.config.switcher.clone();
        let stop = StopFlag::new();
        let _guard = SignalGuard::install(stop.clone())?;

        let buttons = CdevButtons::open(&self.config.display.gpio_chip, &self.config.buttons, mode.buttons())?;
        let conflicts = SystemConflicts::new(
            SystemRunner::new(),
            StraySweeper::for_current_exe(),
            mode.terminate_timeout(&timing),
        )
        .with_own_unit(own_unit());
        let orchestrator = Orchestrator::new(self.registry, mode.playlist(self.registry), self.launcher()?, conflicts)
            .with_timing(mode.terminate_timeout(&timing), timing.restart_delay());

        let display = self.config.display.clone();
        let orientation = display.orientation;
        let mut switcher = Switcher::new(
            mode,
            orchestrator,
            buttons,
            move || open_hat(&display),
            timing,
            orientation,
            stop,
        );
        log::info!("{mode} switcher started");
        switcher.run()
    }

    // -------------------------------------------------------------------------
    // Detached
    // -------------------------------------------------------------------------

    fn background(
        &self,
        target: &BackgroundTarget,
    ) -> Result<()> {
        let descriptor = match target {
            BackgroundTarget::Effect(selector) => self.descriptor(selector)?,
            BackgroundTarget::Random => random_effect(self.registry).context("no effects available")?,
            BackgroundTarget::Switcher => self
                .registry
                .all()
                .iter()
                .find(|d| d.target == Target::AdvancedSwitcher)
                .context("advanced switcher missing from the registry")?,
        };

        let sweeper = StraySweeper::for_current_exe();
        let scope = match descriptor.target {
            Target::Effect(_) => SweepScope::Effects,
            _ => SweepScope::Everything,
        };
        let report = sweeper.sweep(scope, &[], CLEANUP_GRACE);
        if report.found > 0 {
            log::info!("stopped {} previous process(es)", report.found);
        }

        let pid = launch_detached(&self.launcher()?, descriptor)?;
        println!("Started #{} {} in the background (pid {pid})", descriptor.id, descriptor.name);
        Ok(())
    }

    fn test(
        &self,
        selector: &str,
        seconds: u64,
    ) -> Result<()> {
        let descriptor = self.descriptor(selector)?;
        let sweeper = StraySweeper::for_current_exe();
        sweeper.sweep(SweepScope::Effects, &[], CLEANUP_GRACE);

        println!("Testing #{} {} for {seconds}s...", descriptor.id, descriptor.name);
        let ran = test_effect(&self.launcher()?, descriptor, Duration::from_secs(seconds))?;
        println!("PASS: {} ran for {:.1}s without exiting", descriptor.name, ran.as_secs_f32());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    fn service(
        &self,
        command: &ServiceCommand,
    ) -> Result<()> {
        let service = &self.config.service;
        let exe = std::env::current_exe().context("locating the executable")?;
        let mut installer = ServiceInstaller::new(
            self.registry,
            SystemRunner::new(),
            service.unit_dir(),
            service.user(),
            service.working_dir(),
            exe,
        )
        .with_sweeper(StraySweeper::for_current_exe());

        let installed = match command {
            ServiceCommand::Install { selector, start } => {
                let descriptor = self.descriptor(selector)?;
                Some(installer.install(descriptor.id, *start)?)
            }
            ServiceCommand::Stable { start } => Some(installer.install_profile(Profile::Stable, *start)?),
            ServiceCommand::Random { start } => Some(installer.install_profile(Profile::Random, *start)?),
            ServiceCommand::Status => {
                println!("{}", format_status(&installer.status()?));
                None
            }
            ServiceCommand::Disable => {
                let count = installer.disable_all()?;
                println!("Disabled {count} unit(s)");
                None
            }
            ServiceCommand::Logs(lines) => {
                println!("{}", installer.logs(*lines)?);
                None
            }
        };

        if let Some(unit) = installed {
            println!(
                "Installed {} as {}",
                unit.description,
                installer.unit_dir().join(unit.file_name()).display()
            );
            println!("{}", format_status(&installer.status()?));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptLauncher;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    #[test]
    fn test_surviving_the_duration_passes() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("raindrops", "exec sleep 30");
        let registry = EffectRegistry::builtin();

        let ran = test_effect(&launcher, registry.by_key("raindrops").unwrap(), Duration::from_millis(200)).unwrap();
        assert!(ran >= Duration::from_millis(200));
    }

    #[test]
    fn test_early_exit_fails_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("raindrops", "exit 3");
        let registry = EffectRegistry::builtin();

        let err = test_effect(&launcher, registry.by_key("raindrops").unwrap(), Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("exit status: 3"), "{err}");
    }

    #[test]
    fn test_early_clean_exit_still_fails() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("raindrops", "exit 0");
        let registry = EffectRegistry::builtin();

        assert!(test_effect(&launcher, registry.by_key("raindrops").unwrap(), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_unlaunchable_effect_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        let registry = EffectRegistry::builtin();

        assert!(launch_detached(&launcher, registry.by_id(2).unwrap()).is_err());
        assert!(test_effect(&launcher, registry.by_id(2).unwrap(), Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_detached_child_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("raindrops", "exec sleep 30");
        let registry = EffectRegistry::builtin();

        let pid = launch_detached(&launcher, registry.by_key("raindrops").unwrap()).unwrap();
        let pid = Pid::from_raw(pid as i32);
        std::thread::sleep(Duration::from_millis(50));
        assert!(kill(pid, None).is_ok());

        kill(pid, Signal::SIGKILL).unwrap();
        // Reap so the test leaves no zombie behind.
        let _ = nix::sys::wait::waitpid(pid, None);
    }

    #[test]
    fn test_random_effect_is_renderable() {
        let registry = EffectRegistry::builtin();
        for _ in 0..50 {
            let pick = random_effect(&registry).unwrap();
            assert!(pick.kind().is_some());
        }
    }
}
