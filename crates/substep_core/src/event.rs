//! # Input Events and Steps
//!
//! The two values that flow through the pipeline.
//!
//! ```text
//!   Listener/Bridge ──InputEvent──> Input Queue ──> Step Builder ──Step──> Replay Loop
//! ```

use crate::time::Timestamp;

/// Smallest weight a step may carry.
///
/// A zero-length update would freeze the simulated object, so every weight
/// is floored here.
pub const MIN_STEP_WEIGHT: f64 = f32::MIN_POSITIVE as f64;

/// Logical action a physical signal resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Primary button.
    Jump = 1,
    /// Move left.
    Left = 2,
    /// Move right.
    Right = 3,
}

/// Direction of a discrete transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Button went down.
    Press,
    /// Button went up.
    Release,
}

impl Transition {
    /// Maps a boolean "is down" flag.
    #[must_use]
    pub const fn from_pressed(pressed: bool) -> Self {
        if pressed {
            Self::Press
        } else {
            Self::Release
        }
    }

    /// True for [`Transition::Press`].
    #[must_use]
    pub const fn is_press(self) -> bool {
        matches!(self, Self::Press)
    }
}

/// Which player an action belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerSlot {
    /// First player.
    P1,
    /// Second player.
    P2,
}

impl PlayerSlot {
    /// True for [`PlayerSlot::P1`].
    #[must_use]
    pub const fn is_p1(self) -> bool {
        matches!(self, Self::P1)
    }
}

/// A timestamped, resolved input transition.
///
/// Immutable once created; moved exactly once into the step sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    /// When the physical signal happened.
    pub timestamp: Timestamp,
    /// Resolved logical action.
    pub action: Action,
    /// Press or release.
    pub transition: Transition,
    /// Owning player.
    pub player: PlayerSlot,
}

impl InputEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(
        timestamp: Timestamp,
        action: Action,
        transition: Transition,
        player: PlayerSlot,
    ) -> Self {
        Self {
            timestamp,
            action,
            transition,
            player,
        }
    }
}

/// One slice of a physics step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    /// Transition that becomes active at the end of this slice.
    pub input: Option<InputEvent>,
    /// Fraction of one physics step, in `(0, 1]`.
    pub weight: f64,
    /// Final slice of its physics step.
    pub is_boundary: bool,
}

impl Step {
    /// What the replay loop hands out when it has nothing queued.
    pub const EMPTY: Self = Self {
        input: None,
        weight: 1.0,
        is_boundary: true,
    };

    /// A mid-step slice carrying `event`.
    #[must_use]
    pub fn with_input(event: InputEvent, weight: f64) -> Self {
        Self {
            input: Some(event),
            weight: weight.clamp(MIN_STEP_WEIGHT, 1.0),
            is_boundary: false,
        }
    }

    /// The closing slice of a physics step.
    #[must_use]
    pub fn boundary(weight: f64) -> Self {
        Self {
            input: None,
            weight: weight.clamp(MIN_STEP_WEIGHT, 1.0),
            is_boundary: true,
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_weight_floor() {
        assert_eq!(Step::boundary(0.0).weight, MIN_STEP_WEIGHT);
        assert_eq!(Step::boundary(-3.0).weight, MIN_STEP_WEIGHT);
        assert_eq!(Step::boundary(7.0).weight, 1.0);
        assert!(MIN_STEP_WEIGHT > 0.0);
    }

    #[test]
    fn test_empty_step() {
        let step = Step::default();
        assert!(step.is_boundary);
        assert!(step.input.is_none());
        assert_eq!(step.weight, 1.0);
    }

    #[test]
    fn test_transition_from_pressed() {
        assert!(Transition::from_pressed(true).is_press());
        assert!(!Transition::from_pressed(false).is_press());
    }
}
