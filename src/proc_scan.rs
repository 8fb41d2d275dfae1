//! Finding and stopping stray screensaver processes.
//!
//! A previous switcher, a `background` launch or a crashed service can leave
//! effect processes behind that still hold the SPI bus and GPIO lines. They
//! are found by their exact command line in `/proc/<pid>/cmdline`: our own
//! executable name followed by one of the subcommands that drive the
//! display.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Subcommands that render an effect.
const EFFECT_SUBCOMMANDS: &[&str] = &["run", "random"];

/// Subcommands that run a switcher.
const SWITCHER_SUBCOMMANDS: &[&str] = &["switcher"];

/// Which strays to look for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepScope {
    /// Effect renderers only.
    Effects,
    /// Effects and switchers.
    Everything,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrayProcess {
    pub pid: u32,
    pub args: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub terminated: usize,
    pub killed: usize,
}

/// Scanner for processes started from this suite's executable.
#[derive(Clone, Debug)]
pub struct StraySweeper {
    proc_root: PathBuf,
    exe_name: String,
}

impl StraySweeper {
    pub fn new(
        proc_root: impl Into<PathBuf>,
        exe_name: impl Into<String>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            exe_name: exe_name.into(),
        }
    }

    /// Sweeper for `/proc` matching the running executable's file name.
    pub fn for_current_exe() -> Self {
        let exe_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        Self::new("/proc", exe_name)
    }

    fn matches(
        &self,
        args: &[String],
        scope: SweepScope,
    ) -> bool {
        let Some(argv0) = args.first() else {
            return false;
        };
        let program = Path::new(argv0).file_name().map(|n| n.to_string_lossy());
        if program.as_deref() != Some(self.exe_name.as_str()) {
            return false;
        }
        let Some(sub) = args.get(1).map(String::as_str) else {
            return false;
        };
        EFFECT_SUBCOMMANDS.contains(&sub) || (scope == SweepScope::Everything && SWITCHER_SUBCOMMANDS.contains(&sub))
    }

    /// Matching processes, never including our own pid or `exclude`.
    pub fn find(
        &self,
        scope: SweepScope,
        exclude: &[u32],
    ) -> Vec<StrayProcess> {
        let own = std::process::id();
        let Ok(entries) = fs::read_dir(&self.proc_root) else {
            log::warn!("cannot read {}", self.proc_root.display());
            return Vec::new();
        };

        let mut found: Vec<StrayProcess> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok().map(|pid| (pid, entry.path())))
            .filter(|(pid, _)| *pid != own && !exclude.contains(pid))
            .filter_map(|(pid, path)| {
                let raw = fs::read(path.join("cmdline")).ok()?;
                let args: Vec<String> = raw
                    .split(|&b| b == 0)
                    .filter(|a| !a.is_empty())
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .collect();
                self.matches(&args, scope).then_some(StrayProcess { pid, args })
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        found
    }

    /// SIGTERM every match, wait up to `grace`, SIGKILL the survivors.
    pub fn sweep(
        &self,
        scope: SweepScope,
        exclude: &[u32],
        grace: Duration,
    ) -> SweepReport {
        let strays = self.find(scope, exclude);
        let mut report = SweepReport {
            found: strays.len(),
            ..SweepReport::default()
        };
        if strays.is_empty() {
            return report;
        }

        for stray in &strays {
            log::warn!("terminating stray process {} ({})", stray.pid, stray.args.join(" "));
            send(stray.pid, Signal::SIGTERM);
            send(stray.pid, Signal::SIGCONT);
        }

        let deadline = Instant::now() + grace;
        let mut alive: Vec<u32> = strays.iter().map(|s| s.pid).collect();
        while !alive.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            alive.retain(|&pid| self.is_alive(pid));
        }
        alive.retain(|&pid| self.is_alive(pid));

        for &pid in &alive {
            log::warn!("stray process {pid} survived SIGTERM, killing");
            send(pid, Signal::SIGKILL);
        }
        report.killed = alive.len();
        report.terminated = strays.len() - alive.len();
        report
    }

    /// Exited but unreaped processes still accept signals; they count as gone.
    fn is_alive(
        &self,
        pid: u32,
    ) -> bool {
        if matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)) {
            return false;
        }
        let stat = fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat"));
        stat.ok().and_then(|s| process_state(&s)) != Some('Z')
    }
}

/// State letter from a `/proc/<pid>/stat` line. The command name may itself
/// contain parentheses, so the state follows the last `)`.
fn process_state(stat: &str) -> Option<char> { stat.rsplit_once(')')?.1.trim_start().chars().next() }

fn send(
    pid: u32,
    signal: Signal,
) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal)
        && e != Errno::ESRCH
    {
        log::error!("sending {signal} to {pid}: {e}");
    }
}
