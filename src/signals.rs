//! Termination signal handling.
//!
//! A background thread turns SIGINT/SIGTERM into a shared stop flag that the
//! render loop and the switcher check once per frame or poll. Nothing else
//! happens in signal context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

/// Cloneable "please stop" flag.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self { Self::default() }

    pub fn request_stop(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn should_stop(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Owns the signal thread; closes the iterator and joins on drop.
#[derive(Debug)]
pub struct SignalGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalGuard {
    /// Start listening for SIGINT and SIGTERM.
    pub fn install(flag: StopFlag) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).context("registering signal handlers")?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for signal in signals.forever() {
                log::info!("received signal {signal}, stopping");
                flag.request_stop();
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        assert!(!clone.should_stop());
        flag.request_stop();
        assert!(clone.should_stop());
    }

    #[test]
    fn test_guard_closes_cleanly() {
        let guard = SignalGuard::install(StopFlag::new()).unwrap();
        drop(guard);
    }
}
