//! Process orchestrator: one effect child at a time.
//!
//! The orchestrator owns the session (playlist position, current child,
//! paused flag) and is the only place that starts or stops effect
//! processes. Before a new child starts, every other holder of the display
//! is removed: the previous child, supervised units that run effects, and
//! stray `run` processes of this suite.

use std::fmt;
use std::io;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::config::{ADVANCED_TERMINATE_TIMEOUT, RESTART_DELAY};
use crate::proc_scan::{StraySweeper, SweepScope};
use crate::process::{Launcher, ProcessHandle};
use crate::registry::{EffectDescriptor, EffectRegistry};
use crate::service::{CommandRunner, EFFECT_UNITS};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum OrchestratorError {
    /// Unknown id or position, or the launcher cannot start it.
    MissingEffect(String),
    /// The child could not be started.
    Spawn {
        key: &'static str,
        source: io::Error,
    },
    /// Signalling or reaping the child failed.
    Signal {
        pid: u32,
        source: io::Error,
    },
}

impl fmt::Display for OrchestratorError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::MissingEffect(what) => write!(f, "effect not found: {what}"),
            Self::Spawn { key, source } => write!(f, "failed to start {key}: {source}"),
            Self::Signal { pid, source } => write!(f, "failed to signal pid {pid}: {source}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingEffect(_) => None,
            Self::Spawn { source, .. } | Self::Signal { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

// =============================================================================
// Conflicts
// =============================================================================

/// Removes other holders of the display before a child starts.
pub trait ConflictResolver {
    /// Stop competing units and processes, never touching `exclude`.
    fn clear_conflicts(
        &mut self,
        exclude: &[u32],
    );
}

/// Stops active effect units through systemd and sweeps stray processes.
///
/// The unit that started this process is never stopped: a switcher installed
/// as the boot unit would otherwise take itself down.
pub struct SystemConflicts<R> {
    runner: R,
    sweeper: StraySweeper,
    grace: Duration,
    own_unit: Option<String>,
}

impl<R: CommandRunner> SystemConflicts<R> {
    pub fn new(
        runner: R,
        sweeper: StraySweeper,
        grace: Duration,
    ) -> Self {
        Self {
            runner,
            sweeper,
            grace,
            own_unit: None,
        }
    }

    pub fn with_own_unit(
        mut self,
        unit: Option<String>,
    ) -> Self {
        self.own_unit = unit;
        self
    }

    pub fn runner(&self) -> &R { &self.runner }
}

impl<R: CommandRunner> ConflictResolver for SystemConflicts<R> {
    fn clear_conflicts(
        &mut self,
        exclude: &[u32],
    ) {
        for unit in EFFECT_UNITS {
            if self.own_unit.as_deref() == Some(unit) {
                continue;
            }
            let active = self
                .runner
                .run("systemctl", &["is-active", "--quiet", unit])
                .is_ok_and(|out| out.success);
            if !active {
                continue;
            }
            log::warn!("stopping {unit}, it holds the display");
            match self.runner.run("systemctl", &["stop", unit]) {
                Ok(out) if out.success => {}
                Ok(out) => log::error!("systemctl stop {unit}: {}", out.stderr.trim()),
                Err(e) => log::error!("systemctl stop {unit}: {e}"),
            }
        }

        let report = self.sweeper.sweep(SweepScope::Effects, exclude, self.grace);
        if report.found > 0 {
            log::warn!("removed {} stray effect(s), {} killed", report.found, report.killed);
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Mutable switcher session.
#[derive(Debug, Default)]
pub struct Session {
    pub current_index: usize,
    pub current_id: Option<u32>,
    pub child: Option<ProcessHandle>,
    pub paused: bool,
}

pub struct Orchestrator<'r, L, C> {
    registry: &'r EffectRegistry,
    playlist: Vec<u32>,
    launcher: L,
    conflicts: C,
    session: Session,
    terminate_timeout: Duration,
    restart_delay: Duration,
}

impl<'r, L: Launcher, C: ConflictResolver> Orchestrator<'r, L, C> {
    pub fn new(
        registry: &'r EffectRegistry,
        playlist: Vec<u32>,
        launcher: L,
        conflicts: C,
    ) -> Self {
        Self {
            registry,
            playlist,
            launcher,
            conflicts,
            session: Session::default(),
            terminate_timeout: ADVANCED_TERMINATE_TIMEOUT,
            restart_delay: RESTART_DELAY,
        }
    }

    pub fn with_timing(
        mut self,
        terminate_timeout: Duration,
        restart_delay: Duration,
    ) -> Self {
        self.terminate_timeout = terminate_timeout;
        self.restart_delay = restart_delay;
        self
    }

    pub fn registry(&self) -> &'r EffectRegistry { self.registry }

    pub fn playlist(&self) -> &[u32] { &self.playlist }

    pub fn conflicts(&self) -> &C { &self.conflicts }

    pub fn current_index(&self) -> usize { self.session.current_index }

    pub fn current_id(&self) -> Option<u32> { self.session.current_id }

    pub fn is_paused(&self) -> bool { self.session.paused }

    pub fn child_pid(&self) -> Option<u32> { self.session.child.as_ref().map(ProcessHandle::pid) }

    /// Descriptor at playlist position `index`.
    pub fn descriptor_at(
        &self,
        index: usize,
    ) -> Option<&'r EffectDescriptor> {
        self.playlist.get(index).and_then(|&id| self.registry.by_id(id))
    }

    /// Playlist position `step` entries away from the current one, wrapping.
    pub fn position_after(
        &self,
        step: isize,
    ) -> usize {
        let len = self.playlist.len() as isize;
        if len == 0 {
            return 0;
        }
        (self.session.current_index as isize + step).rem_euclid(len) as usize
    }

    /// Descriptor for `id` if it exists and the launcher can start it.
    pub fn resolve(
        &self,
        id: u32,
    ) -> Result<&'r EffectDescriptor> {
        self.registry
            .by_id(id)
            .filter(|d| self.launcher.command(d).is_some())
            .ok_or_else(|| OrchestratorError::MissingEffect(format!("id {id}")))
    }

    /// Replace the current child with effect `id`.
    ///
    /// An unknown id leaves the current child running. If the new child fails
    /// to start, the session has no current effect.
    pub fn switch_to(
        &mut self,
        id: u32,
    ) -> Result<()> {
        let descriptor = self.resolve(id)?;
        let command = self
            .launcher
            .command(descriptor)
            .ok_or_else(|| OrchestratorError::MissingEffect(descriptor.key.to_string()))?;

        self.stop()?;
        self.conflicts.clear_conflicts(&[]);

        self.session.current_id = None;
        self.session.paused = false;

        let handle = ProcessHandle::spawn(command, descriptor.key).map_err(|source| OrchestratorError::Spawn {
            key: descriptor.key,
            source,
        })?;
        log::info!("started {} #{} (pid {})", descriptor.name, id, handle.pid());
        if let Some(index) = self.playlist.iter().position(|&p| p == id) {
            self.session.current_index = index;
        }
        self.session.current_id = Some(id);
        self.session.child = Some(handle);
        Ok(())
    }

    /// Switch to playlist position `index`.
    pub fn jump_to(
        &mut self,
        index: usize,
    ) -> Result<()> {
        let id = *self
            .playlist
            .get(index)
            .ok_or_else(|| OrchestratorError::MissingEffect(format!("playlist position {index}")))?;
        self.switch_to(id)
    }

    pub fn next(&mut self) -> Result<()> { self.jump_to(self.position_after(1)) }

    pub fn previous(&mut self) -> Result<()> { self.jump_to(self.position_after(-1)) }

    /// Terminate the current child, if any.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.session.child.take() else {
            return Ok(());
        };
        self.session.paused = false;
        let pid = handle.pid();
        log::info!("stopping {} (pid {pid})", handle.label());
        handle
            .terminate(self.terminate_timeout)
            .map(|_| ())
            .map_err(|source| OrchestratorError::Signal { pid, source })
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.session.paused {
            return Ok(());
        }
        if self.send(Signal::SIGSTOP)? {
            self.session.paused = true;
            log::info!("paused");
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.session.paused {
            return Ok(());
        }
        if self.send(Signal::SIGCONT)? {
            self.session.paused = false;
            log::info!("resumed");
        }
        Ok(())
    }

    /// Pause a running child or resume a paused one. Returns the new state.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.session.paused { self.resume()? } else { self.pause()? }
        Ok(self.session.paused)
    }

    /// Relaunch the current effect if its child exited.
    pub fn restart_if_crashed(&mut self) -> Result<bool> {
        let Some(handle) = self.session.child.as_mut() else {
            return Ok(false);
        };
        let pid = handle.pid();
        let status = handle
            .try_exit()
            .map_err(|source| OrchestratorError::Signal { pid, source })?;
        let Some(status) = status else {
            return Ok(false);
        };

        log::warn!("{} (pid {pid}) exited with {status}, restarting", handle.label());
        self.session.child = None;
        self.session.paused = false;
        let Some(id) = self.session.current_id else {
            return Ok(false);
        };
        std::thread::sleep(self.restart_delay);
        self.switch_to(id)?;
        Ok(true)
    }

    /// Returns `false` when there is no child to signal.
    fn send(
        &self,
        signal: Signal,
    ) -> Result<bool> {
        let Some(handle) = self.session.child.as_ref() else {
            return Ok(false);
        };
        handle.signal(signal).map_err(|errno| OrchestratorError::Signal {
            pid: handle.pid(),
            source: io::Error::from(errno),
        })?;
        Ok(true)
    }
}

impl<L, C> Drop for Orchestrator<'_, L, C> {
    fn drop(&mut self) {
        if let Some(handle) = self.session.child.take()
            && let Err(e) = handle.terminate(self.terminate_timeout)
        {
            log::error!("terminating child on shutdown: {e}");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptLauncher;
    use crate::service::testing::FakeSystemctl;
    use crate::service::{BOOT_UNIT, STABLE_UNIT};
    use std::process::Command;
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingConflicts {
        calls: usize,
    }

    impl ConflictResolver for CountingConflicts {
        fn clear_conflicts(
            &mut self,
            _exclude: &[u32],
        ) {
            self.calls += 1;
        }
    }

    const SLEEP: &str = "sleep 30";

    fn setup(registry: &EffectRegistry) -> (TempDir, Orchestrator<'_, ScriptLauncher, CountingConflicts>) {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        for key in ["glyph_rain1_fixed", "glyph_rain1", "glyph_rain2"] {
            launcher.script(key, SLEEP);
        }
        let orchestrator = Orchestrator::new(registry, vec![1, 2, 3], launcher, CountingConflicts::default())
            .with_timing(Duration::from_secs(2), Duration::from_millis(10));
        (dir, orchestrator)
    }

    fn is_gone(pid: u32) -> bool { matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)) }

    #[test]
    fn test_switch_replaces_previous_child() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);

        orchestrator.switch_to(1).unwrap();
        let first = orchestrator.child_pid().unwrap();
        orchestrator.switch_to(2).unwrap();
        let second = orchestrator.child_pid().unwrap();

        assert_ne!(first, second);
        assert!(is_gone(first));
        assert_eq!(orchestrator.current_id(), Some(2));
        assert_eq!(orchestrator.current_index(), 1);
        assert_eq!(orchestrator.conflicts().calls, 2);
    }

    #[test]
    fn test_switching_back_keeps_one_child() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);

        let mut pids = Vec::new();
        for id in [1, 2, 1] {
            orchestrator.switch_to(id).unwrap();
            pids.push(orchestrator.child_pid().unwrap());
        }
        assert_eq!(orchestrator.current_id(), Some(1));
        assert!(is_gone(pids[0]));
        assert!(is_gone(pids[1]));
        assert!(!is_gone(pids[2]));
    }

    #[test]
    fn test_unknown_id_keeps_current_child() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);

        orchestrator.switch_to(1).unwrap();
        let pid = orchestrator.child_pid().unwrap();

        let err = orchestrator.switch_to(999).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingEffect(_)));
        // Known id without a script is missing too
        assert!(matches!(orchestrator.switch_to(14), Err(OrchestratorError::MissingEffect(_))));

        assert_eq!(orchestrator.child_pid(), Some(pid));
        assert_eq!(orchestrator.current_id(), Some(1));
        assert!(!is_gone(pid));
    }

    #[test]
    fn test_stop_without_child_is_noop() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);
        orchestrator.stop().unwrap();
        assert!(orchestrator.child_pid().is_none());
        assert_eq!(orchestrator.conflicts().calls, 0);
    }

    #[test]
    fn test_pause_resume_without_child_is_noop() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);
        orchestrator.pause().unwrap();
        assert!(!orchestrator.is_paused());
        assert!(!orchestrator.toggle_pause().unwrap());
    }

    #[test]
    fn test_toggle_pause_tracks_state() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);
        orchestrator.switch_to(1).unwrap();

        assert!(orchestrator.toggle_pause().unwrap());
        assert!(orchestrator.is_paused());
        assert!(!orchestrator.toggle_pause().unwrap());

        orchestrator.pause().unwrap();
        // Switching clears the paused flag and still terminates the stopped child
        let pid = orchestrator.child_pid().unwrap();
        orchestrator.switch_to(2).unwrap();
        assert!(!orchestrator.is_paused());
        assert!(is_gone(pid));
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);

        assert_eq!(orchestrator.position_after(-1), 2);
        orchestrator.previous().unwrap();
        assert_eq!(orchestrator.current_id(), Some(3));
        orchestrator.next().unwrap();
        assert_eq!(orchestrator.current_id(), Some(1));
        orchestrator.next().unwrap();
        assert_eq!(orchestrator.current_index(), 1);
        assert!(orchestrator.jump_to(7).is_err());
        assert_eq!(orchestrator.current_index(), 1);
    }

    #[test]
    fn test_crashed_child_is_relaunched() {
        let registry = EffectRegistry::builtin();
        let (dir, mut orchestrator) = setup(&registry);
        let launcher = ScriptLauncher::new(dir.path());
        launcher.script("glyph_rain1_fixed", "exit 1");

        orchestrator.switch_to(1).unwrap();
        let first = orchestrator.child_pid().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        // The next launch should stay up
        launcher.script("glyph_rain1_fixed", SLEEP);

        assert!(orchestrator.restart_if_crashed().unwrap());
        let second = orchestrator.child_pid().unwrap();
        assert_ne!(first, second);
        assert_eq!(orchestrator.current_id(), Some(1));
        assert!(!orchestrator.restart_if_crashed().unwrap());
    }

    #[test]
    fn test_no_restart_without_child() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);
        assert!(!orchestrator.restart_if_crashed().unwrap());
    }

    #[test]
    fn test_drop_terminates_child() {
        let registry = EffectRegistry::builtin();
        let (_dir, mut orchestrator) = setup(&registry);
        orchestrator.switch_to(3).unwrap();
        let pid = orchestrator.child_pid().unwrap();
        drop(orchestrator);
        assert!(is_gone(pid));
    }

    /// Scripts for every key except `missing`, which points at no program.
    struct PartlyMissing {
        scripts: ScriptLauncher,
        missing: &'static str,
    }

    impl Launcher for PartlyMissing {
        fn command(
            &self,
            descriptor: &EffectDescriptor,
        ) -> Option<Command> {
            if descriptor.key == self.missing {
                return Some(Command::new("/nonexistent/lcd-screensaver"));
            }
            self.scripts.command(descriptor)
        }
    }

    #[test]
    fn test_failed_spawn_clears_current_effect() {
        let registry = EffectRegistry::builtin();
        let dir = tempfile::tempdir().unwrap();
        let scripts = ScriptLauncher::new(dir.path());
        for key in ["glyph_rain1_fixed", "glyph_rain2"] {
            scripts.script(key, SLEEP);
        }
        let launcher = PartlyMissing {
            scripts,
            missing: "glyph_rain1",
        };
        let mut orchestrator = Orchestrator::new(&registry, vec![1, 2, 3], launcher, CountingConflicts::default())
            .with_timing(Duration::from_secs(2), Duration::from_millis(10));

        orchestrator.switch_to(1).unwrap();
        let first = orchestrator.child_pid().unwrap();

        let err = orchestrator.switch_to(2).unwrap_err();
        assert!(matches!(err, OrchestratorError::Spawn { key: "glyph_rain1", .. }));
        assert!(is_gone(first));
        assert_eq!(orchestrator.current_id(), None);
        assert_eq!(orchestrator.child_pid(), None);
        assert_eq!(orchestrator.current_index(), 0);
        assert!(!orchestrator.restart_if_crashed().unwrap());

        orchestrator.switch_to(3).unwrap();
        assert_eq!(orchestrator.current_id(), Some(3));
        assert_eq!(orchestrator.current_index(), 2);
    }

    fn conflicts(own_unit: Option<&str>) -> SystemConflicts<FakeSystemctl> {
        let mut runner = FakeSystemctl::default();
        runner.active.insert(BOOT_UNIT.to_string());
        runner.active.insert(STABLE_UNIT.to_string());
        SystemConflicts::new(
            runner,
            StraySweeper::new("/nonexistent/proc", "lcd-screensaver"),
            Duration::from_millis(100),
        )
        .with_own_unit(own_unit.map(str::to_string))
    }

    #[test]
    fn test_conflicts_stop_active_effect_units() {
        let mut conflicts = conflicts(None);
        conflicts.clear_conflicts(&[]);
        assert!(conflicts.runner().active.is_empty());
    }

    #[test]
    fn test_conflicts_spare_own_unit() {
        let mut conflicts = conflicts(Some(BOOT_UNIT));
        conflicts.clear_conflicts(&[]);

        let runner = conflicts.runner();
        assert!(runner.active.contains(BOOT_UNIT));
        assert!(!runner.active.contains(STABLE_UNIT));
        assert!(runner.calls.contains(&"systemctl stop lcd-stable".to_string()));
        assert!(!runner.calls.iter().any(|c| c.ends_with(BOOT_UNIT)));
    }

    #[test]
    fn test_error_messages() {
        let err = OrchestratorError::MissingEffect("id 42".to_string());
        assert_eq!(err.to_string(), "effect not found: id 42");
        let err = OrchestratorError::Spawn {
            key: "campfire",
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to start campfire"));
    }
}
