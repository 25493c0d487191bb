//! `gilrs` backend for the controller poller.

use gilrs::{Axis, Button, Gamepad, Gilrs};

use crate::controller::{buttons, GamepadReader, GamepadState, ReaderFactory};
use crate::error::{CaptureError, CaptureResult};

const BUTTON_MAP: [(Button, u16); 14] = [
    (Button::DPadUp, buttons::DPAD_UP),
    (Button::DPadDown, buttons::DPAD_DOWN),
    (Button::DPadLeft, buttons::DPAD_LEFT),
    (Button::DPadRight, buttons::DPAD_RIGHT),
    (Button::Start, buttons::START),
    (Button::Select, buttons::BACK),
    (Button::LeftThumb, buttons::LEFT_THUMB),
    (Button::RightThumb, buttons::RIGHT_THUMB),
    (Button::LeftTrigger, buttons::LEFT_SHOULDER),
    (Button::RightTrigger, buttons::RIGHT_SHOULDER),
    (Button::South, buttons::A),
    (Button::East, buttons::B),
    (Button::West, buttons::X),
    (Button::North, buttons::Y),
];

/// Reads every connected pad through `gilrs`.
pub struct GilrsReader {
    gilrs: Gilrs,
}

impl GilrsReader {
    /// Initializes the backend.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Backend`] if `gilrs` could not start.
    pub fn new() -> CaptureResult<Self> {
        let gilrs = Gilrs::new().map_err(|e| CaptureError::Backend(e.to_string()))?;
        for (id, gamepad) in gilrs.gamepads() {
            tracing::info!("Controller [{}] \"{}\" connected", id, gamepad.name());
        }
        Ok(Self { gilrs })
    }

    /// Factory for [`ControllerPoller::spawn`](crate::controller::ControllerPoller::spawn).
    #[must_use]
    pub fn factory() -> ReaderFactory {
        Box::new(|| Ok(Box::new(Self::new()?) as Box<dyn GamepadReader>))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn axis(gamepad: &Gamepad<'_>, axis: Axis) -> i16 {
    (gamepad.value(axis).clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

fn state_of(gamepad: &Gamepad<'_>) -> GamepadState {
    let buttons = BUTTON_MAP
        .iter()
        .filter(|(button, _)| gamepad.is_pressed(*button))
        .fold(0u16, |acc, (_, bit)| acc | bit);

    GamepadState {
        buttons,
        left_x: axis(gamepad, Axis::LeftStickX),
        left_y: axis(gamepad, Axis::LeftStickY),
        right_x: axis(gamepad, Axis::RightStickX),
        right_y: axis(gamepad, Axis::RightStickY),
    }
}

impl GamepadReader for GilrsReader {
    fn poll(&mut self) -> CaptureResult<Vec<GamepadState>> {
        // Pump events so the cached state is current.
        while self.gilrs.next_event().is_some() {}

        Ok(self
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(_, gamepad)| state_of(&gamepad))
            .collect())
    }
}

impl std::fmt::Debug for GilrsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GilrsReader")
            .field("gamepads", &self.gilrs.gamepads().count())
            .finish()
    }
}
