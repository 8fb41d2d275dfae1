//! GPIO cleanup: free the display and button lines.
//!
//! Stops every known unit, then terminates every effect and switcher
//! process of this suite except ourselves.

use std::fmt;
use std::time::Duration;

use crate::proc_scan::{StraySweeper, SweepReport, SweepScope};
use crate::service::{CommandRunner, KNOWN_UNITS};

/// Grace period between SIGTERM and SIGKILL.
pub const CLEANUP_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub units_stopped: Vec<&'static str>,
    /// Units that were active but would not stop.
    pub units_failed: Vec<&'static str>,
    pub processes: SweepReport,
}

impl fmt::Display for CleanupReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "units stopped:       {}", self.units_stopped.len())?;
        if !self.units_failed.is_empty() {
            writeln!(f, "units not stopped:   {}", self.units_failed.join(", "))?;
        }
        writeln!(f, "processes found:     {}", self.processes.found)?;
        writeln!(f, "terminated cleanly:  {}", self.processes.terminated)?;
        write!(f, "killed:              {}", self.processes.killed)
    }
}

pub fn cleanup<R: CommandRunner>(
    runner: &mut R,
    sweeper: &StraySweeper,
    grace: Duration,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for &unit in KNOWN_UNITS {
        let active = runner
            .run("systemctl", &["is-active", "--quiet", unit])
            .is_ok_and(|out| out.success);
        if !active {
            continue;
        }
        match runner.run("systemctl", &["stop", unit]) {
            Ok(out) if out.success => {
                log::info!("stopped {unit}");
                report.units_stopped.push(unit);
            }
            Ok(out) => {
                log::error!("systemctl stop {unit}: {}", out.stderr.trim());
                report.units_failed.push(unit);
            }
            Err(e) => {
                log::error!("systemctl stop {unit}: {e}");
                report.units_failed.push(unit);
            }
        }
    }

    report.processes = sweeper.sweep(SweepScope::Everything, &[], grace);
    log::info!(
        "cleanup done: {} unit(s), {} process(es), {} killed",
        report.units_stopped.len(),
        report.processes.found,
        report.processes.killed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::FakeSystemctl;

    #[test]
    fn test_stops_only_active_units() {
        let mut runner = FakeSystemctl::default();
        runner.active.insert("lcd-stable".to_string());
        runner.active.insert("lcd-button-switcher".to_string());
        let sweeper = StraySweeper::new("/nonexistent/proc", "lcd-screensaver");

        let report = cleanup(&mut runner, &sweeper, Duration::ZERO);
        assert_eq!(report.units_stopped, vec!["lcd-stable", "lcd-button-switcher"]);
        assert!(report.units_failed.is_empty());
        assert!(runner.active.is_empty());
        assert_eq!(report.processes, SweepReport::default());
    }

    #[test]
    fn test_failed_stop_is_reported() {
        let mut runner = FakeSystemctl::default();
        runner.active.insert("lcd-random".to_string());
        runner.fail_on = Some("systemctl stop".to_string());
        let sweeper = StraySweeper::new("/nonexistent/proc", "lcd-screensaver");

        let report = cleanup(&mut runner, &sweeper, Duration::ZERO);
        assert!(report.units_stopped.is_empty());
        assert_eq!(report.units_failed, vec!["lcd-random"]);
        assert!(report.to_string().contains("units not stopped:   lcd-random"));
    }
}
