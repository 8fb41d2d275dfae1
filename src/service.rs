//! systemd unit generation and management.
//!
//! The installer renders a [`ServiceUnit`] for one of three profiles, stages
//! it in a user-writable temp file and copies it into the unit directory with
//! `install -m 644`. That command and `systemctl` both go through a
//! [`CommandRunner`], so they get `sudo` together. Failures of the external
//! commands are reported with their exit status and stderr, never retried.

use std::fmt::{self, Write as _};
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::proc_scan::{StraySweeper, SweepScope};
use crate::process::SelfExecLauncher;
use crate::registry::EffectRegistry;

// =============================================================================
// Unit names
// =============================================================================

/// Unit installed by `service install`.
pub const BOOT_UNIT: &str = "lcd-boot-screensaver";

/// Unit installed by `service stable`.
pub const STABLE_UNIT: &str = "lcd-stable";

/// Unit installed by `service random`.
pub const RANDOM_UNIT: &str = "lcd-random";

/// Every unit this suite has ever installed.
pub const KNOWN_UNITS: &[&str] = &[
    BOOT_UNIT,
    STABLE_UNIT,
    "lcd-glyph-locked",
    "lcd-button-switcher",
    RANDOM_UNIT,
    "lcd-screensaver",
];

/// Known units that render effects directly.
pub const EFFECT_UNITS: &[&str] = &[BOOT_UNIT, STABLE_UNIT, "lcd-glyph-locked", RANDOM_UNIT, "lcd-screensaver"];

/// Set in every generated unit to the unit's own name.
pub const UNIT_ENV: &str = "LCD_SCREENSAVER_UNIT";

/// Effect used by the stable profile.
pub const STABLE_EFFECT_ID: u32 = 1;

const STRAY_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ServiceError {
    MissingEffect(u32),
    /// An external command ran and failed.
    Privileged {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    Io {
        context: String,
        source: io::Error,
    },
}

impl fmt::Display for ServiceError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::MissingEffect(id) => write!(f, "effect {id} not found"),
            Self::Privileged { command, status, stderr } => {
                match status {
                    Some(code) => write!(f, "`{command}` failed with exit code {code}")?,
                    None => write!(f, "`{command}` was killed by a signal")?,
                }
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            Self::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

// =============================================================================
// Command runner
// =============================================================================

/// Captured result of an external command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `systemctl` and `journalctl`.
pub trait CommandRunner {
    fn run(
        &mut self,
        program: &str,
        args: &[&str],
    ) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(
        &mut self,
        program: &str,
        args: &[&str],
    ) -> io::Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Real commands, through `sudo` unless already root.
#[derive(Clone, Copy, Debug)]
pub struct SystemRunner {
    sudo: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            sudo: !nix::unistd::geteuid().is_root(),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self { Self::new() }
}

impl CommandRunner for SystemRunner {
    fn run(
        &mut self,
        program: &str,
        args: &[&str],
    ) -> io::Result<CommandOutput> {
        let mut command = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg(program);
            c
        } else {
            Command::new(program)
        };
        log::debug!("running {program} {}", args.join(" "));
        let output = command.args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// =============================================================================
// Unit model
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restart {
    Always,
    OnFailure,
}

impl Restart {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnFailure => "on-failure",
        }
    }
}

/// Which unit to install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Chosen effect at boot, always restarted.
    Boot(u32),
    /// The stable glyph rain with tight limits.
    Stable,
    /// A random effect per start.
    Random,
}

/// A systemd service unit. [`Display`](fmt::Display) renders the INI text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceUnit {
    pub name: &'static str,
    pub description: String,
    pub user: String,
    pub group: String,
    pub working_dir: PathBuf,
    pub exec_start: Vec<String>,
    pub restart: Restart,
    pub restart_sec: u32,
    pub memory_max: Option<&'static str>,
    pub cpu_quota: Option<&'static str>,
    pub wants_multi_user: bool,
}

impl ServiceUnit {
    pub fn file_name(&self) -> String { format!("{}.service", self.name) }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

impl fmt::Display for ServiceUnit {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "[Unit]")?;
        writeln!(f, "Description={}", self.description)?;
        writeln!(f, "After=multi-user.target")?;
        if self.wants_multi_user {
            writeln!(f, "Wants=multi-user.target")?;
        }
        writeln!(f)?;

        writeln!(f, "[Service]")?;
        writeln!(f, "Type=simple")?;
        writeln!(f, "User={}", self.user)?;
        writeln!(f, "Group={}", self.group)?;
        writeln!(f, "WorkingDirectory={}", self.working_dir.display())?;
        let exec: Vec<String> = self.exec_start.iter().map(|a| quote(a)).collect();
        writeln!(f, "ExecStart={}", exec.join(" "))?;
        writeln!(f, "Restart={}", self.restart.as_str())?;
        writeln!(f, "RestartSec={}", self.restart_sec)?;
        writeln!(f, "StandardOutput=journal")?;
        writeln!(f, "StandardError=journal")?;
        if let Some(max) = self.memory_max {
            writeln!(f, "MemoryMax={max}")?;
        }
        if let Some(quota) = self.cpu_quota {
            writeln!(f, "CPUQuota={quota}")?;
        }
        writeln!(f, "Environment=DISPLAY=:0")?;
        writeln!(f, "Environment={UNIT_ENV}={}", self.name)?;
        writeln!(f)?;

        writeln!(f, "[Install]")?;
        writeln!(f, "WantedBy=multi-user.target")
    }
}

/// State of one known unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub active: bool,
    pub description: Option<String>,
}

impl fmt::Display for UnitStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let enabled = if self.enabled { "enabled" } else { "disabled" };
        let active = if self.active { "active" } else { "inactive" };
        write!(f, "{:<22} {enabled:<9} {active:<9}", self.name)?;
        if let Some(description) = &self.description {
            write!(f, "{description}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Installer
// =============================================================================

pub struct ServiceInstaller<'r, R> {
    registry: &'r EffectRegistry,
    runner: R,
    unit_dir: PathBuf,
    user: String,
    working_dir: PathBuf,
    exe: PathBuf,
    sweeper: Option<StraySweeper>,
}

impl<'r, R: CommandRunner> ServiceInstaller<'r, R> {
    pub fn new(
        registry: &'r EffectRegistry,
        runner: R,
        unit_dir: PathBuf,
        user: String,
        working_dir: PathBuf,
        exe: PathBuf,
    ) -> Self {
        Self {
            registry,
            runner,
            unit_dir,
            user,
            working_dir,
            exe,
            sweeper: None,
        }
    }

    /// Also sweep stray effect processes in [`disable_all`](Self::disable_all).
    pub fn with_sweeper(
        mut self,
        sweeper: StraySweeper,
    ) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    pub fn runner(&self) -> &R { &self.runner }

    pub fn unit_dir(&self) -> &Path { &self.unit_dir }

    /// Build the unit for `profile` without touching the system.
    pub fn unit(
        &self,
        profile: Profile,
    ) -> Result<ServiceUnit> {
        let launcher = SelfExecLauncher::new(self.exe.clone());
        let exe = self.exe.display().to_string();
        let base = |name: &'static str, description: String, exec_start: Vec<String>| ServiceUnit {
            name,
            description,
            user: self.user.clone(),
            group: self.user.clone(),
            working_dir: self.working_dir.clone(),
            exec_start,
            restart: Restart::Always,
            restart_sec: 10,
            memory_max: None,
            cpu_quota: None,
            wants_multi_user: true,
        };

        match profile {
            Profile::Boot(id) => {
                let descriptor = self.registry.by_id(id).ok_or(ServiceError::MissingEffect(id))?;
                let mut exec = vec![exe];
                exec.extend(launcher.args_for(descriptor));
                Ok(ServiceUnit {
                    memory_max: Some("250M"),
                    cpu_quota: Some("75%"),
                    ..base(BOOT_UNIT, format!("LCD Boot Screensaver #{id}: {}", descriptor.name), exec)
                })
            }
            Profile::Stable => {
                let descriptor = self
                    .registry
                    .by_id(STABLE_EFFECT_ID)
                    .ok_or(ServiceError::MissingEffect(STABLE_EFFECT_ID))?;
                let mut exec = vec![exe];
                exec.extend(launcher.args_for(descriptor));
                Ok(ServiceUnit {
                    memory_max: Some("200M"),
                    cpu_quota: Some("50%"),
                    ..base(STABLE_UNIT, "Waveshare LCD Stable Matrix Rain (Memory-Safe)".to_string(), exec)
                })
            }
            Profile::Random => Ok(ServiceUnit {
                restart: Restart::OnFailure,
                restart_sec: 30,
                wants_multi_user: false,
                ..base(RANDOM_UNIT, "LCD Random Screensaver".to_string(), vec![exe, "random".to_string()])
            }),
        }
    }

    /// Install the boot unit for effect `id`.
    pub fn install(
        &mut self,
        id: u32,
        start: bool,
    ) -> Result<ServiceUnit> {
        self.install_profile(Profile::Boot(id), start)
    }

    /// Replace every known unit with the one for `profile`.
    pub fn install_profile(
        &mut self,
        profile: Profile,
        start: bool,
    ) -> Result<ServiceUnit> {
        let unit = self.unit(profile)?;
        let staged = stage(&unit).map_err(|source| ServiceError::Io {
            context: format!("staging {}", unit.file_name()),
            source,
        })?;
        self.disable_units()?;

        let path = self.unit_dir.join(unit.file_name());
        let source = staged.path().display().to_string();
        let target = path.display().to_string();
        self.checked("install", &["-m", "644", &source, &target])?;
        log::info!("wrote {}", path.display());

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", unit.name])?;
        if start {
            self.systemctl(&["start", unit.name])?;
        }
        log::info!("installed {} ({})", unit.name, unit.description);
        Ok(unit)
    }

    /// Enabled/active state and description of every known unit.
    pub fn status(&mut self) -> Result<Vec<UnitStatus>> {
        let mut statuses = Vec::with_capacity(KNOWN_UNITS.len());
        for &name in KNOWN_UNITS {
            let enabled = self.query(&["is-enabled", name])? == "enabled";
            let active = self.query(&["is-active", name])? == "active";
            let description = self
                .query(&["show", "-p", "Description", "--value", name])
                .ok()
                .filter(|d| !d.is_empty());
            statuses.push(UnitStatus {
                name,
                enabled,
                active,
                description,
            });
        }
        Ok(statuses)
    }

    /// Stop and disable every known unit and sweep stray effects.
    pub fn disable_all(&mut self) -> Result<usize> {
        let disabled = self.disable_units()?;
        if let Some(sweeper) = &self.sweeper {
            let report = sweeper.sweep(SweepScope::Effects, &[], STRAY_GRACE);
            if report.found > 0 {
                log::warn!("terminated {} stray effect process(es)", report.found);
            }
        }
        self.systemctl(&["daemon-reload"])?;
        Ok(disabled)
    }

    /// Recent journal lines of the boot unit.
    pub fn logs(
        &mut self,
        lines: usize,
    ) -> Result<String> {
        let unit = format!("{BOOT_UNIT}.service");
        let count = lines.to_string();
        self.checked("journalctl", &["-u", &unit, "--no-pager", "-n", &count])
    }

    /// Returns how many units were stopped or disabled.
    fn disable_units(&mut self) -> Result<usize> {
        let mut touched = 0;
        for &name in KNOWN_UNITS {
            let active = self.query(&["is-active", name])? == "active";
            let enabled = self.query(&["is-enabled", name])? == "enabled";
            if active {
                self.systemctl(&["stop", name])?;
                log::info!("stopped {name}");
            }
            if enabled {
                self.systemctl(&["disable", name])?;
                log::info!("disabled {name}");
            }
            if active || enabled {
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn systemctl(
        &mut self,
        args: &[&str],
    ) -> Result<String> {
        self.checked("systemctl", args)
    }

    /// Query commands exit non-zero for "disabled"/"inactive"; only stdout matters.
    fn query(
        &mut self,
        args: &[&str],
    ) -> Result<String> {
        let output = self.spawn("systemctl", args)?;
        Ok(output.stdout.trim().to_string())
    }

    fn checked(
        &mut self,
        program: &str,
        args: &[&str],
    ) -> Result<String> {
        let output = self.spawn(program, args)?;
        if !output.success {
            let command = format!("{program} {}", args.join(" "));
            log::error!("{command} failed: {}", output.stderr.trim());
            return Err(ServiceError::Privileged {
                command,
                status: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    fn spawn(
        &mut self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput> {
        self.runner.run(program, args).map_err(|source| ServiceError::Io {
            context: format!("running {program}"),
            source,
        })
    }
}

/// Render `unit` into a temp file, removed when the handle drops.
fn stage(unit: &ServiceUnit) -> io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!(".{}.", unit.name))
        .suffix(".service")
        .tempfile()?;
    file.write_all(unit.to_string().as_bytes())?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// Unit this process was started by, if it is one of ours.
pub fn own_unit() -> Option<String> { std::env::var(UNIT_ENV).ok().filter(|u| KNOWN_UNITS.contains(&u.as_str())) }

/// Plain-text status table for the CLI.
pub fn format_status(statuses: &[UnitStatus]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<22} {:<9} {:<9}DESCRIPTION", "UNIT", "ENABLED", "ACTIVE");
    for status in statuses {
        let _ = writeln!(out, "{status}");
    }
    out
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory systemctl that tracks enabled and active units.

    use std::collections::BTreeSet;

    use super::*;

    #[derive(Default)]
    pub struct FakeSystemctl {
        pub enabled: BTreeSet<String>,
        pub active: BTreeSet<String>,
        pub calls: Vec<String>,
        /// Any command starting with this fails with exit code 1.
        pub fail_on: Option<String>,
        /// Where `show -p Description` reads unit files from.
        pub unit_dir: Option<PathBuf>,
    }

    impl FakeSystemctl {
        pub fn new(unit_dir: &Path) -> Self {
            Self {
                unit_dir: Some(unit_dir.to_path_buf()),
                ..Self::default()
            }
        }

        fn description(
            &self,
            unit: &str,
        ) -> String {
            self.unit_dir
                .as_ref()
                .and_then(|dir| fs::read_to_string(dir.join(format!("{unit}.service"))).ok())
                .and_then(|text| {
                    text.lines()
                        .find_map(|l| l.strip_prefix("Description=").map(str::to_string))
                })
                .unwrap_or_default()
        }
    }

    impl CommandRunner for FakeSystemctl {
        fn run(
            &mut self,
            program: &str,
            args: &[&str],
        ) -> io::Result<CommandOutput> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.push(line.clone());
            if self.fail_on.as_deref().is_some_and(|prefix| line.starts_with(prefix)) {
                return Ok(CommandOutput {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "Access denied\n".to_string(),
                });
            }

            let unit = args.last().copied().unwrap_or_default().to_string();
            let (success, stdout) = match (program, args.first().copied()) {
                ("systemctl", Some("is-enabled")) => {
                    let on = self.enabled.contains(&unit);
                    (on, if on { "enabled\n" } else { "disabled\n" }.to_string())
                }
                ("systemctl", Some("is-active")) => {
                    let on = self.active.contains(&unit);
                    (on, if on { "active\n" } else { "inactive\n" }.to_string())
                }
                ("systemctl", Some("show")) => (true, format!("{}\n", self.description(&unit))),
                ("systemctl", Some("enable")) => {
                    self.enabled.insert(unit);
                    (true, String::new())
                }
                ("systemctl", Some("disable")) => {
                    self.enabled.remove(&unit);
                    (true, String::new())
                }
                ("systemctl", Some("start")) => {
                    self.active.insert(unit);
                    (true, String::new())
                }
                ("systemctl", Some("stop")) => {
                    self.active.remove(&unit);
                    (true, String::new())
                }
                ("journalctl", _) => (true, "-- No entries --\n".to_string()),
                ("install", _) => match args {
                    [.., source, target] => {
                        if let Err(err) = fs::copy(source, target) {
                            return Ok(CommandOutput {
                                success: false,
                                code: Some(1),
                                stdout: String::new(),
                                stderr: format!("install: cannot create regular file '{target}': {err}\n"),
                            });
                        }
                        (true, String::new())
                    }
                    _ => (false, String::new()),
                },
                _ => (true, String::new()),
            };
            Ok(CommandOutput {
                success,
                code: Some(if success { 0 } else { 3 }),
                stdout,
                stderr: String::new(),
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
