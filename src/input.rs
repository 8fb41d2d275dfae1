//! Button debounce handling and command mapping for the switchers.
//!
//! Each button has its own edge detector ([`ButtonState`]); on top of that
//! the [`InputController`] keeps one global gate so that two presses inside
//! the debounce window produce a single command, even on different buttons.
//! Time is passed in explicitly so the logic can be tested without sleeping.

use std::time::{Duration, Instant};

/// Buttons and joystick directions on the HAT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Key1,
    Key2,
    Key3,
    Up,
    Down,
    Left,
    Right,
    Press,
}

impl Button {
    pub const ALL: [Self; 8] = [
        Self::Key1,
        Self::Key2,
        Self::Key3,
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::Press,
    ];
}

/// What a switcher should do in response to a press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    TogglePause,
    NextFavourite,
    ShowInfo,
    Exit,
}

/// Button to command table.
pub type ButtonMap = &'static [(Button, Command)];

/// Three-button switcher: KEY1 next, KEY2 previous, KEY3 exit.
pub const SIMPLE_MAP: ButtonMap = &[
    (Button::Key1, Command::Next),
    (Button::Key2, Command::Previous),
    (Button::Key3, Command::Exit),
];

/// Advanced switcher: keys plus joystick.
pub const ADVANCED_MAP: ButtonMap = &[
    (Button::Key1, Command::Next),
    (Button::Key2, Command::Previous),
    (Button::Key3, Command::TogglePause),
    (Button::Up, Command::NextFavourite),
    (Button::Down, Command::ShowInfo),
    (Button::Press, Command::Exit),
];

/// Source of raw button levels.
pub trait ButtonReader {
    /// `true` while the button is held (line pulled low).
    fn is_pressed(
        &mut self,
        button: Button,
    ) -> anyhow::Result<bool>;
}

// =============================================================================
// Edge detection
// =============================================================================

/// Button debounce state with time-based edge detection.
pub struct ButtonState {
    was_pressed: bool,
    last_change: Option<Instant>,
    debounce: Duration,
}

impl ButtonState {
    /// Create a new button state (not pressed).
    pub const fn new(debounce: Duration) -> Self {
        Self {
            was_pressed: false,
            last_change: None,
            debounce,
        }
    }

    /// Returns true only on the released-to-pressed edge.
    ///
    /// A level change is ignored while the previous accepted change is
    /// younger than the debounce window.
    pub fn just_pressed(
        &mut self,
        pressed: bool,
        now: Instant,
    ) -> bool {
        if pressed != self.was_pressed {
            if let Some(last) = self.last_change
                && now.saturating_duration_since(last) < self.debounce
            {
                return false;
            }

            self.was_pressed = pressed;
            self.last_change = Some(now);
            return pressed;
        }

        false
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Debounced mapping from button levels to switcher commands.
pub struct InputController {
    map: ButtonMap,
    buttons: Vec<(Button, Command, ButtonState)>,
    debounce: Duration,
    last_command: Option<Instant>,
}

impl InputController {
    pub fn new(
        map: ButtonMap,
        debounce: Duration,
    ) -> Self {
        Self {
            map,
            buttons: map
                .iter()
                .map(|&(button, command)| (button, command, ButtonState::new(debounce)))
                .collect(),
            debounce,
            last_command: None,
        }
    }

    pub fn map(&self) -> ButtonMap { self.map }

    /// Feed one sample of a button's level.
    pub fn sample(
        &mut self,
        button: Button,
        pressed: bool,
        now: Instant,
    ) -> Option<Command> {
        let (_, command, state) = self.buttons.iter_mut().find(|(b, _, _)| *b == button)?;
        if !state.just_pressed(pressed, now) {
            return None;
        }
        let command = *command;

        if let Some(last) = self.last_command
            && now.saturating_duration_since(last) < self.debounce
        {
            log::debug!("{button:?} inside debounce window, ignored");
            return None;
        }
        self.last_command = Some(now);
        log::debug!("{button:?} pressed -> {command:?}");
        Some(command)
    }

    /// Read every mapped button once; returns the first accepted command.
    pub fn poll<R: ButtonReader + ?Sized>(
        &mut self,
        reader: &mut R,
        now: Instant,
    ) -> anyhow::Result<Option<Command>> {
        let mut accepted = None;
        for &(button, _) in self.map {
            let pressed = reader.is_pressed(button)?;
            if let Some(command) = self.sample(button, pressed, now)
                && accepted.is_none()
            {
                accepted = Some(command);
            }
        }
        Ok(accepted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
