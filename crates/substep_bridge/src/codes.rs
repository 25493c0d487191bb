//! # Bridge Code Tables
//!
//! Kernel codes as the helper writes them, and their binding codes on the
//! host side.
//!
//! ```text
//!   keyboard     EV_KEY   set-1 scan code (0xE0xx for extended keys)
//!   mouse        EV_KEY   BTN_* + MOUSE_CODE_OFFSET
//!   touchscreen  EV_KEY   BTN_TOUCH
//!   controller   EV_KEY   BTN_A.. ; EV_ABS sticks, hat, triggers
//! ```

use input_linux_sys::{
    ABS_HAT0X, ABS_HAT0Y, ABS_RX, ABS_RY, ABS_RZ, ABS_X, ABS_Y, ABS_Z, BTN_A, BTN_B, BTN_SELECT,
    BTN_START, BTN_TL, BTN_TR, BTN_X, BTN_Y,
};
use substep_capture::controller::{LEFT_STICK_DEADZONE, RIGHT_STICK_DEADZONE};
use substep_core::time::filetime_from_unix;
use substep_core::ControllerCode;

/// Added to mouse button codes so they never collide with keyboard scan codes.
pub const MOUSE_CODE_OFFSET: u16 = 0x3000;

/// Hat deadzone.
pub const HAT_DEADZONE: i32 = 10;
/// Trigger values above this count as pressed.
pub const TRIGGER_THRESHOLD: i32 = 30;

/// Controller buttons by kernel code.
pub const CONTROLLER_BUTTONS: [(i32, ControllerCode); 8] = [
    (BTN_A, ControllerCode::A),
    (BTN_B, ControllerCode::B),
    (BTN_X, ControllerCode::X),
    (BTN_Y, ControllerCode::Y),
    (BTN_TL, ControllerCode::Lb),
    (BTN_TR, ControllerCode::Rb),
    (BTN_SELECT, ControllerCode::Back),
    (BTN_START, ControllerCode::Start),
];

/// A directional axis: beyond `deadzone` on the negative side presses
/// `negative`, on the positive side `positive`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisSpec {
    /// Kernel axis code.
    pub axis: i32,
    /// Magnitude that must be exceeded.
    pub deadzone: i32,
    /// Code pressed below `-deadzone`.
    pub negative: ControllerCode,
    /// Code pressed above `deadzone`.
    pub positive: ControllerCode,
}

/// Directional axes: both sticks (left on `ABS_X`/`ABS_Y`, right on
/// `ABS_RX`/`ABS_RY`) and the hat.
#[allow(clippy::cast_lossless)]
pub const AXES: [AxisSpec; 6] = [
    AxisSpec {
        axis: ABS_X,
        deadzone: LEFT_STICK_DEADZONE as i32,
        negative: ControllerCode::LeftStickLeft,
        positive: ControllerCode::LeftStickRight,
    },
    AxisSpec {
        axis: ABS_Y,
        deadzone: LEFT_STICK_DEADZONE as i32,
        negative: ControllerCode::LeftStickUp,
        positive: ControllerCode::LeftStickDown,
    },
    AxisSpec {
        axis: ABS_RX,
        deadzone: RIGHT_STICK_DEADZONE as i32,
        negative: ControllerCode::RightStickLeft,
        positive: ControllerCode::RightStickRight,
    },
    AxisSpec {
        axis: ABS_RY,
        deadzone: RIGHT_STICK_DEADZONE as i32,
        negative: ControllerCode::RightStickUp,
        positive: ControllerCode::RightStickDown,
    },
    AxisSpec {
        axis: ABS_HAT0X,
        deadzone: HAT_DEADZONE,
        negative: ControllerCode::Left,
        positive: ControllerCode::Right,
    },
    AxisSpec {
        axis: ABS_HAT0Y,
        deadzone: HAT_DEADZONE,
        negative: ControllerCode::Up,
        positive: ControllerCode::Down,
    },
];

impl AxisSpec {
    /// Direction code pressed at `value`, if any.
    #[must_use]
    pub const fn direction(&self, value: i32) -> Option<ControllerCode> {
        if value < -self.deadzone {
            Some(self.negative)
        } else if value > self.deadzone {
            Some(self.positive)
        } else {
            None
        }
    }
}

/// Controller button of a kernel key code.
#[must_use]
pub fn controller_button(code: u16) -> Option<ControllerCode> {
    CONTROLLER_BUTTONS
        .iter()
        .find(|(kernel, _)| *kernel == i32::from(code))
        .map(|(_, button)| *button)
}

/// Directional axis of a kernel axis code.
#[must_use]
pub fn axis_spec(code: u16) -> Option<&'static AxisSpec> {
    AXES.iter().find(|spec| spec.axis == i32::from(code))
}

/// Trigger button of a kernel axis code: `ABS_Z` left, `ABS_RZ` right.
#[must_use]
pub fn trigger(code: u16) -> Option<ControllerCode> {
    match i32::from(code) {
        ABS_Z => Some(ControllerCode::Lt),
        ABS_RZ => Some(ControllerCode::Rt),
        _ => None,
    }
}

/// Record timestamp of a kernel `timeval`. Negative fields clamp to zero.
#[must_use]
pub fn record_time(tv_sec: i64, tv_usec: i64) -> u64 {
    let secs = u64::try_from(tv_sec).unwrap_or(0);
    let micros = u64::try_from(tv_usec).unwrap_or(0);
    filetime_from_unix(secs, micros).ticks()
}
