//! Child process handles and launchers.
//!
//! Effects run as separate processes so that a crash or a leak in one
//! animation never takes the switcher down. [`ProcessHandle`] wraps the
//! spawned child and knows how to signal it and wait with a timeout;
//! [`Launcher`] turns a registry entry into the command line to spawn.

use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

use crate::registry::{EffectDescriptor, Target};

/// Interval between exit checks while waiting.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Outcome of a bounded termination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Already gone before we asked.
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
}

/// A spawned child in its own process group.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    label: String,
}

impl ProcessHandle {
    /// Spawn `command` as the leader of a new process group.
    pub fn spawn(
        mut command: Command,
        label: impl Into<String>,
    ) -> io::Result<Self> {
        command.process_group(0).stdin(Stdio::null());
        let child = command.spawn()?;
        Ok(Self {
            child,
            label: label.into(),
        })
    }

    pub fn pid(&self) -> u32 { self.child.id() }

    pub fn label(&self) -> &str { &self.label }

    /// Send `signal` to the child's process group. A group that already
    /// exited is not an error.
    pub fn signal(
        &self,
        signal: Signal,
    ) -> Result<(), Errno> {
        match killpg(Pid::from_raw(self.pid() as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Exit status if the child has exited, without blocking.
    pub fn try_exit(&mut self) -> io::Result<Option<ExitStatus>> { self.child.try_wait() }

    /// Wait at most `timeout` for the child to exit.
    pub fn wait_timeout(
        &mut self,
        timeout: Duration,
    ) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL.min(deadline - now));
        }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
    pub fn terminate(
        mut self,
        grace: Duration,
    ) -> io::Result<Termination> {
        if self.child.try_wait()?.is_some() {
            return Ok(Termination::AlreadyExited);
        }

        self.signal(Signal::SIGTERM).map_err(io::Error::from)?;
        // A stopped child only sees SIGTERM once continued.
        self.signal(Signal::SIGCONT).map_err(io::Error::from)?;

        if self.wait_timeout(grace)?.is_some() {
            log::info!("{} (pid {}) terminated", self.label, self.pid());
            return Ok(Termination::Terminated);
        }

        log::warn!("{} (pid {}) ignored SIGTERM for {:?}, killing", self.label, self.pid(), grace);
        self.signal(Signal::SIGKILL).map_err(io::Error::from)?;
        self.child.wait()?;
        Ok(Termination::Killed)
    }
}

// =============================================================================
// Launchers
// =============================================================================

/// Resolves registry entries into commands.
pub trait Launcher {
    /// Command that runs `descriptor`, or `None` if it cannot be started here.
    fn command(
        &self,
        descriptor: &EffectDescriptor,
    ) -> Option<Command>;
}

/// Runs effects by re-executing this binary: `<exe> run <key>`.
#[derive(Clone, Debug)]
pub struct SelfExecLauncher {
    exe: PathBuf,
    extra_args: Vec<String>,
}

impl SelfExecLauncher {
    pub fn new(exe: PathBuf) -> Self {
        Self {
            exe,
            extra_args: Vec::new(),
        }
    }

    /// Launcher for the running executable.
    pub fn current() -> io::Result<Self> { Ok(Self::new(std::env::current_exe()?)) }

    /// Append arguments (e.g. `--config PATH`) to every command.
    pub fn with_args(
        mut self,
        args: impl IntoIterator<Item = String>,
    ) -> Self {
        self.extra_args.extend(args);
        self
    }

    pub fn exe(&self) -> &std::path::Path { &self.exe }

    /// Argument vector (after the executable) for `descriptor`.
    pub fn args_for(
        &self,
        descriptor: &EffectDescriptor,
    ) -> Vec<String> {
        let (command, argument) = match descriptor.target {
            Target::Effect(_) => ("run", descriptor.key),
            Target::SimpleSwitcher => ("switcher", "simple"),
            Target::AdvancedSwitcher => ("switcher", "advanced"),
        };
        let mut args = vec![command.to_string(), argument.to_string()];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Launcher for SelfExecLauncher {
    fn command(
        &self,
        descriptor: &EffectDescriptor,
    ) -> Option<Command> {
        if !self.exe.is_file() {
            return None;
        }
        let mut command = Command::new(&self.exe);
        command.args(self.args_for(descriptor));
        Some(command)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Launcher backed by shell scripts in a temporary directory.

    use std::fs;
    use std::path::Path;

    use super::*;

    pub struct ScriptLauncher {
        dir: PathBuf,
    }

    impl ScriptLauncher {
        pub fn new(dir: &Path) -> Self { Self { dir: dir.to_path_buf() } }

        /// Install `body` as the script for `key`.
        pub fn script(
            &self,
            key: &str,
            body: &str,
        ) {
            fs::write(self.dir.join(key), format!("{body}\n")).unwrap();
        }
    }

    impl Launcher for ScriptLauncher {
        fn command(
            &self,
            descriptor: &EffectDescriptor,
        ) -> Option<Command> {
            // Interpreted, not exec'd: no ETXTBSY while another thread writes.
            let path = self.dir.join(descriptor.key);
            path.is_file().then(|| {
                let mut command = Command::new("/bin/sh");
                command.arg(path);
                command
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptLauncher;
    use super::*;
    use crate::registry::EffectRegistry;

    fn sleeper() -> Command {
        let mut command = Command::new("/bin/sh");
        command.args(["-c", "sleep 30"]);
        command
    }

    #[test]
    fn test_terminate_running_child() {
        let handle = ProcessHandle::spawn(sleeper(), "sleeper").unwrap();
        assert_eq!(handle.terminate(Duration::from_secs(2)).unwrap(), Termination::Terminated);
    }

    #[test]
    fn test_stubborn_child_is_killed() {
        let mut command = Command::new("/bin/sh");
        command.args(["-c", "trap '' TERM; while true; do sleep 0.05; done"]);
        let handle = ProcessHandle::spawn(command, "stubborn").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.terminate(Duration::from_millis(200)).unwrap(), Termination::Killed);
    }

    #[test]
    fn test_exited_child_reports_status() {
        let mut command = Command::new("/bin/sh");
        command.args(["-c", "exit 3"]);
        let mut handle = ProcessHandle::spawn(command, "exit3").unwrap();
        let status = handle.wait_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(handle.terminate(Duration::from_secs(1)).unwrap(), Termination::AlreadyExited);
    }

    #[test]
    fn test_wait_timeout_expires() {
        let mut handle = ProcessHandle::spawn(sleeper(), "sleeper").unwrap();
        assert!(handle.wait_timeout(Duration::from_millis(50)).unwrap().is_none());
        handle.terminate(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_paused_child_still_terminates() {
        let handle = ProcessHandle::spawn(sleeper(), "sleeper").unwrap();
        handle.signal(Signal::SIGSTOP).unwrap();
        assert_eq!(handle.terminate(Duration::from_secs(2)).unwrap(), Termination::Terminated);
    }

    #[test]
    fn test_self_exec_arguments() {
        let registry = EffectRegistry::builtin();
        let launcher = SelfExecLauncher::new(PathBuf::from("/usr/bin/lcd-screensaver"))
            .with_args(["--config".to_string(), "/etc/lcd.toml".to_string()]);
        let effect = registry.by_id(9).unwrap();
        assert_eq!(launcher.args_for(effect), vec!["run", "raindrops", "--config", "/etc/lcd.toml"]);
        let switcher = registry.by_id(81).unwrap();
        assert_eq!(launcher.args_for(switcher), vec!["switcher", "advanced", "--config", "/etc/lcd.toml"]);
    }

    #[test]
    fn test_missing_executable_does_not_resolve() {
        let registry = EffectRegistry::builtin();
        let launcher = SelfExecLauncher::new(PathBuf::from("/nonexistent/lcd-screensaver"));
        assert!(launcher.command(registry.by_id(1).unwrap()).is_none());
    }

    #[test]
    fn test_script_launcher_resolves_only_installed_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("raindrops", "exit 0");
        let registry = EffectRegistry::builtin();
        assert!(launcher.command(registry.by_key("raindrops").unwrap()).is_some());
        assert!(launcher.command(registry.by_key("campfire").unwrap()).is_none());
    }
}
