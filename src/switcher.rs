//! Button-driven switchers.
//!
//! A switcher is a single thread that polls the HAT buttons every few
//! milliseconds, turns debounced presses into [`Command`]s and drives the
//! [`Orchestrator`]. Between effects it briefly opens the display itself to
//! show a status screen; the panel is dropped again before the next child
//! starts, because the GPIO lines can only have one owner.
//!
//! # States
//!
//! ```text
//! Idle ──press──▶ dispatch ──▶ Idle
//!   │                 │
//!   └──signal─────────┴──Exit──▶ ShuttingDown ──▶ stop child, "Switcher OFF", clear
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use screensaver_common::colors::BLACK;

use crate::config::SwitcherConfig;
use crate::display::{DisplaySurface, Orientation};
use crate::input::{ADVANCED_MAP, Button, ButtonMap, ButtonReader, Command, InputController, SIMPLE_MAP};
use crate::orchestrator::{ConflictResolver, Orchestrator};
use crate::process::Launcher;
use crate::registry::{EffectRegistry, FAVOURITES, SIMPLE_PLAYLIST};
use crate::screens::{self, ADVANCED_LEGEND, Legend, SIMPLE_LEGEND};
use crate::signals::StopFlag;
use crate::st7735::Framebuffer;

// =============================================================================
// Modes
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Three keys over a curated playlist.
    Simple,
    /// Keys and joystick over the whole catalog.
    Advanced,
}

impl Mode {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Advanced => "advanced",
        }
    }

    pub const fn map(self) -> ButtonMap {
        match self {
            Self::Simple => SIMPLE_MAP,
            Self::Advanced => ADVANCED_MAP,
        }
    }

    pub const fn legend(self) -> Legend {
        match self {
            Self::Simple => SIMPLE_LEGEND,
            Self::Advanced => ADVANCED_LEGEND,
        }
    }

    pub const fn debounce(
        self,
        config: &SwitcherConfig,
    ) -> Duration {
        match self {
            Self::Simple => config.simple_debounce(),
            Self::Advanced => config.advanced_debounce(),
        }
    }

    pub const fn terminate_timeout(
        self,
        config: &SwitcherConfig,
    ) -> Duration {
        match self {
            Self::Simple => config.simple_terminate_timeout(),
            Self::Advanced => config.advanced_terminate_timeout(),
        }
    }

    /// Registry ids cycled by this mode.
    pub fn playlist(
        self,
        registry: &EffectRegistry,
    ) -> Vec<u32> {
        match self {
            Self::Simple => registry.playlist(SIMPLE_PLAYLIST),
            Self::Advanced => registry.full_playlist(),
        }
    }

    /// Buttons whose lines must be requested.
    pub fn buttons(self) -> impl Iterator<Item = Button> { self.map().iter().map(|&(button, _)| button) }
}

impl fmt::Display for Mode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(Self::Simple),
            "advanced" => Ok(Self::Advanced),
            other => anyhow::bail!("unknown switcher mode '{other}' (expected simple or advanced)"),
        }
    }
}

/// Where the switcher is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitcherState {
    Idle,
    ShuttingDown,
}

// =============================================================================
// Switcher
// =============================================================================

pub struct Switcher<'r, L, C, B, F> {
    mode: Mode,
    orchestrator: Orchestrator<'r, L, C>,
    buttons: B,
    input: InputController,
    open_display: F,
    timing: SwitcherConfig,
    orientation: Orientation,
    stop: StopFlag,
    favourite: usize,
    state: SwitcherState,
}

impl<'r, L, C, B, F, S> Switcher<'r, L, C, B, F>
where
    L: Launcher,
    C: ConflictResolver,
    B: ButtonReader,
    F: FnMut() -> Result<S>,
    S: DisplaySurface,
{
    pub fn new(
        mode: Mode,
        orchestrator: Orchestrator<'r, L, C>,
        buttons: B,
        open_display: F,
        timing: SwitcherConfig,
        orientation: Orientation,
        stop: StopFlag,
    ) -> Self {
        Self {
            input: InputController::new(mode.map(), mode.debounce(&timing)),
            mode,
            orchestrator,
            buttons,
            open_display,
            timing,
            orientation,
            stop,
            favourite: 0,
            state: SwitcherState::Idle,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<'r, L, C> { &self.orchestrator }

    pub fn state(&self) -> SwitcherState { self.state }

    /// Run until the exit button or a termination signal.
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "{} switcher active, {} effects in playlist",
            self.mode,
            self.orchestrator.playlist().len()
        );

        if self.mode == Mode::Advanced {
            self.show(self.timing.controls_screen(), |frame| screens::draw_controls(frame));
        }
        self.switch(self.orchestrator.current_index());

        let mut last_crash_poll = Instant::now();
        while self.state == SwitcherState::Idle {
            if self.stop.should_stop() {
                log::info!("termination signal received");
                break;
            }

            let now = Instant::now();
            let command = self.input.poll(&mut self.buttons, now).context("reading buttons")?;
            if let Some(command) = command {
                self.state = self.dispatch(command);
            }

            if now.saturating_duration_since(last_crash_poll) >= self.timing.crash_poll_interval() {
                last_crash_poll = now;
                if let Err(e) = self.orchestrator.restart_if_crashed() {
                    log::error!("restarting crashed effect: {e}");
                }
            }

            std::thread::sleep(self.timing.poll_interval());
        }

        self.shutdown();
        Ok(())
    }

    /// Apply one command.
    pub fn dispatch(
        &mut self,
        command: Command,
    ) -> SwitcherState {
        match command {
            Command::Next => self.switch(self.orchestrator.position_after(1)),
            Command::Previous => self.switch(self.orchestrator.position_after(-1)),
            Command::NextFavourite => {
                self.favourite = (self.favourite + 1) % FAVOURITES.len();
                let index = FAVOURITES[self.favourite];
                log::info!("favourite {} -> #{}", self.favourite, index + 1);
                self.switch(index);
            }
            Command::TogglePause => match self.orchestrator.toggle_pause() {
                Ok(paused) => log::info!("{}", if paused { "paused" } else { "resumed" }),
                Err(e) => log::error!("pause toggle: {e}"),
            },
            Command::ShowInfo => self.show_info(),
            Command::Exit => {
                log::info!("exit requested");
                return SwitcherState::ShuttingDown;
            }
        }
        SwitcherState::Idle
    }

    /// Stop the current child, show the status screen, start `index`.
    fn switch(
        &mut self,
        index: usize,
    ) {
        let Some(descriptor) = self.orchestrator.descriptor_at(index) else {
            log::error!("no effect at playlist position {index}");
            return;
        };
        if let Err(e) = self.orchestrator.resolve(descriptor.id) {
            log::error!("{e}");
            return;
        }
        if let Err(e) = self.orchestrator.stop() {
            log::error!("stopping current effect: {e}");
        }

        let total = self.orchestrator.playlist().len();
        let legend = self.mode.legend();
        self.show(self.timing.status_screen(), |frame| {
            screens::draw_status(frame, index + 1, total, descriptor.name, legend)
        });

        if let Err(e) = self.orchestrator.jump_to(index) {
            log::error!("{e}");
        }
    }

    /// The effect holds the display lines, so it is stopped for the info
    /// screen and started again afterwards, paused if it was paused.
    fn show_info(&mut self) {
        let index = self.orchestrator.current_index();
        let Some(descriptor) = self.orchestrator.descriptor_at(index) else {
            return;
        };
        let paused = self.orchestrator.is_paused();
        let running = self.orchestrator.child_pid().is_some();

        if let Err(e) = self.orchestrator.stop() {
            log::error!("stopping current effect: {e}");
        }
        self.show(self.timing.info_screen(), |frame| {
            screens::draw_info(frame, index + 1, descriptor, paused)
        });

        if running {
            if let Err(e) = self.orchestrator.switch_to(descriptor.id) {
                log::error!("{e}");
            } else if paused && let Err(e) = self.orchestrator.pause() {
                log::error!("{e}");
            }
        }
    }

    fn shutdown(&mut self) {
        self.state = SwitcherState::ShuttingDown;
        if let Err(e) = self.orchestrator.stop() {
            log::error!("stopping current effect: {e}");
        }
        self.show(self.timing.exit_screen(), |frame| screens::draw_exit(frame));
        match (self.open_display)() {
            Ok(mut display) => {
                if let Err(e) = display
                    .initialize(self.orientation)
                    .and_then(|()| display.clear(BLACK))
                {
                    log::warn!("clearing display: {e:#}");
                }
            }
            Err(e) => log::warn!("opening display: {e:#}"),
        }
        log::info!("{} switcher stopped", self.mode);
    }

    /// Open the display, draw one screen, hold it, release the display.
    ///
    /// Screens are cosmetic: failures are logged and the switcher goes on.
    fn show(
        &mut self,
        hold: Duration,
        draw: impl FnOnce(&mut Framebuffer) -> Result<(), core::convert::Infallible>,
    ) {
        let mut frame = Framebuffer::new();
        let _ = draw(&mut frame);

        let shown = (self.open_display)().and_then(|mut display| {
            display.initialize(self.orientation)?;
            display.present(&frame)
        });
        if let Err(e) = shown {
            log::warn!("status screen not shown: {e:#}");
            return;
        }

        let deadline = Instant::now() + hold;
        while Instant::now() < deadline && !self.stop.should_stop() {
            std::thread::sleep(self.timing.poll_interval().min(deadline.saturating_duration_since(Instant::now())));
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
    use embedded_graphics::pixelcolor::Rgb565;
    use screensaver_common::colors::{INFO_BG, STATUS_BG, to_565};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct Quiet;

    impl ConflictResolver for Quiet {
        fn clear_conflicts(
            &mut self,
            _exclude: &[u32],
        ) {
        }
    }

    /// Presses one button per poll. A poll starts when KEY1 is read, which
    /// is first in both maps. Requests stop once the script runs out.
    struct ScriptedButtons {
        script: VecDeque<Option<Button>>,
        current: Option<Button>,
        stop: StopFlag,
    }

    impl ScriptedButtons {
        fn new(
            script: &[Option<Button>],
            stop: StopFlag,
        ) -> Self {
            Self {
                script: script.iter().copied().collect(),
                current: None,
                stop,
            }
        }
    }

    impl ButtonReader for ScriptedButtons {
        fn is_pressed(
            &mut self,
            button: Button,
        ) -> Result<bool> {
            if button == Button::Key1 {
                match self.script.pop_front() {
                    Some(next) => self.current = next,
                    None => {
                        self.current = None;
                        self.stop.request_stop();
                    }
                }
            }
            Ok(self.current == Some(button))
        }
    }

    /// Background color of every presented frame and every clear.
    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Shown {
        Frame(Rgb565),
        Clear(Rgb565),
    }

    struct SharedSurface(Rc<RefCell<Vec<Shown>>>);

    impl DisplaySurface for SharedSurface {
        fn initialize(
            &mut self,
            _orientation: Orientation,
        ) -> Result<()> {
            Ok(())
        }

        fn clear(
            &mut self,
            color: Rgb565,
        ) -> Result<()> {
            self.0.borrow_mut().push(Shown::Clear(color));
            Ok(())
        }

        fn present(
            &mut self,
            frame: &Framebuffer,
        ) -> Result<()> {
            let bg = frame.pixel(127, 127).unwrap_or(BLACK);
            self.0.borrow_mut().push(Shown::Frame(bg));
            Ok(())
        }
    }

    fn fast_timing() -> SwitcherConfig {
        SwitcherConfig {
            simple_debounce_ms: 0,
            advanced_debounce_ms: 0,
            poll_interval_ms: 1,
            crash_poll_interval_ms: 1,
            restart_delay_ms: 1,
            simple_terminate_timeout_ms: 2000,
            advanced_terminate_timeout_ms: 2000,
            status_screen_ms: 0,
            info_screen_ms: 0,
            controls_screen_ms: 0,
            exit_screen_ms: 0,
        }
    }

    fn scripts(registry: &EffectRegistry) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptLauncher::new(dir.path());
        for descriptor in registry.renderable() {
            launcher.script(descriptor.key, "sleep 30");
        }
        dir
    }

    fn run_switcher(
        mode: Mode,
        script: &[Option<Button>],
    ) -> (Vec<Shown>, Option<u32>, Vec<u32>) {
        let registry = EffectRegistry::builtin();
        let dir = scripts(&registry);
        let timing = fast_timing();
        let orchestrator = Orchestrator::new(
            &registry,
            mode.playlist(&registry),
            ScriptLauncher::new(dir.path()),
            Quiet,
        )
        .with_timing(mode.terminate_timeout(&timing), timing.restart_delay());

        let stop = StopFlag::new();
        let shown = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&shown);
        let mut switcher = Switcher::new(
            mode,
            orchestrator,
            ScriptedButtons::new(script, stop.clone()),
            move || Ok(SharedSurface(Rc::clone(&log))),
            timing,
            Orientation::Upright,
            stop,
        );
        switcher.run().unwrap();

        assert_eq!(switcher.state(), SwitcherState::ShuttingDown);
        let child = switcher.orchestrator().child_pid();
        let playlist = switcher.orchestrator().playlist().to_vec();
        let shown = shown.borrow().clone();
        (shown, child, playlist)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("simple".parse::<Mode>().unwrap(), Mode::Simple);
        assert_eq!("advanced".parse::<Mode>().unwrap(), Mode::Advanced);
        assert!("fancy".parse::<Mode>().is_err());
        assert_eq!(Mode::Advanced.to_string(), "advanced");
    }

    #[test]
    fn test_mode_buttons_and_playlists() {
        let registry = EffectRegistry::builtin();
        assert_eq!(Mode::Simple.buttons().count(), 3);
        assert_eq!(Mode::Advanced.buttons().count(), 6);
        assert_eq!(Mode::Simple.playlist(&registry).len(), 10);
        assert_eq!(Mode::Advanced.playlist(&registry).len(), 34);
    }

    #[test]
    fn test_simple_switcher_exit_sequence() {
        let (shown, child, _) = run_switcher(Mode::Simple, &[
            Some(Button::Key1),
            None,
            Some(Button::Key3),
        ]);

        let status = Shown::Frame(to_565(STATUS_BG));
        // Start-up status, status for KEY1, exit screen, final clear
        assert_eq!(shown, vec![status.clone(), status, Shown::Frame(BLACK), Shown::Clear(BLACK)]);
        assert!(child.is_none());
    }

    #[test]
    fn test_signal_stops_switcher() {
        let (shown, child, _) = run_switcher(Mode::Simple, &[]);
        assert_eq!(shown.last(), Some(&Shown::Clear(BLACK)));
        assert!(child.is_none());
    }

    #[test]
    fn test_advanced_switcher_shows_controls_and_info() {
        let (shown, child, playlist) = run_switcher(Mode::Advanced, &[
            Some(Button::Down),
            None,
            Some(Button::Press),
        ]);

        assert_eq!(playlist.len(), 34);
        assert_eq!(shown[0], Shown::Frame(BLACK));
        assert_eq!(shown[1], Shown::Frame(to_565(STATUS_BG)));
        assert_eq!(shown[2], Shown::Frame(to_565(INFO_BG)));
        assert!(child.is_none());
    }

    #[test]
    fn test_dispatch_moves_through_playlist() {
        let registry = EffectRegistry::builtin();
        let dir = scripts(&registry);
        let timing = fast_timing();
        let orchestrator = Orchestrator::new(
            &registry,
            Mode::Advanced.playlist(&registry),
            ScriptLauncher::new(dir.path()),
            Quiet,
        )
        .with_timing(Duration::from_secs(2), Duration::from_millis(1));
        let stop = StopFlag::new();
        let mut switcher = Switcher::new(
            Mode::Advanced,
            orchestrator,
            ScriptedButtons::new(&[], stop.clone()),
            || Ok(crate::display::MemorySurface::new()),
            timing,
            Orientation::Upright,
            stop,
        );

        assert_eq!(switcher.dispatch(Command::Previous), SwitcherState::Idle);
        assert_eq!(switcher.orchestrator().current_index(), 23);
        assert_eq!(switcher.dispatch(Command::Next), SwitcherState::Idle);
        assert_eq!(switcher.orchestrator().current_index(), 0);

        switcher.dispatch(Command::NextFavourite);
        assert_eq!(switcher.orchestrator().current_index(), FAVOURITES[1]);
        switcher.dispatch(Command::NextFavourite);
        assert_eq!(switcher.orchestrator().current_index(), FAVOURITES[2]);

        switcher.dispatch(Command::TogglePause);
        assert!(switcher.orchestrator().is_paused());
        let before = switcher.orchestrator().child_pid();
        switcher.dispatch(Command::ShowInfo);
        // Restarted after the info screen, still paused
        assert!(switcher.orchestrator().is_paused());
        assert_ne!(switcher.orchestrator().child_pid(), before);

        assert_eq!(switcher.dispatch(Command::Exit), SwitcherState::ShuttingDown);
    }
}
