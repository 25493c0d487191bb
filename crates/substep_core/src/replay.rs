//! # Replay Loop
//!
//! Hands out one frame's steps in order and applies each input transition
//! exactly once, on the pop *after* the step that carried it.
//!
//! ```text
//!   pop #1 ─> Step{input: press, 0.40}          (press recorded as pending)
//!   pop #2 ─> apply(press) ─> Step{boundary, 0.60}
//! ```
//!
//! The host advances its simulation by `delta * weight` for each popped
//! step, so the press takes effect exactly at the sub-step boundary where it
//! happened.
//!
//! ## States
//!
//! ```text
//!   Idle ──begin_frame──> Building ──load──> Replaying ──last boundary──> Idle
//!     ▲                                                                   │
//!     └──────────────────────── flush (pause, death, editor, disable) ────┘
//! ```

use std::collections::VecDeque;

use crate::event::{Action, InputEvent, PlayerSlot, Step, Transition};

/// Receives input transitions from the replay loop.
pub trait InputSink {
    /// Applies one press or release to the simulation.
    fn apply_input_transition(&mut self, action: Action, transition: Transition, player: PlayerSlot);
}

/// Where the replay loop is within a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayState {
    /// No frame in progress.
    #[default]
    Idle,
    /// The frame's inputs are being drained and placed.
    Building,
    /// Steps are being handed out.
    Replaying,
}

/// Per-frame step consumer.
#[derive(Debug, Default)]
pub struct ReplayLoop {
    steps: VecDeque<Step>,
    pending: Option<InputEvent>,
    state: ReplayState,
    applied: u64,
}

impl ReplayLoop {
    /// An idle loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters [`ReplayState::Building`] and drops anything left from the
    /// previous frame.
    pub fn begin_frame(&mut self) {
        self.steps.clear();
        self.pending = None;
        self.state = ReplayState::Building;
    }

    /// Installs the frame's steps.
    pub fn load(&mut self, steps: Vec<Step>) {
        self.steps = steps.into();
        self.pending = None;
        self.state = if self.steps.is_empty() {
            ReplayState::Idle
        } else {
            ReplayState::Replaying
        };
    }

    /// Returns the next step, first applying the previous step's input.
    ///
    /// With nothing queued this yields [`Step::EMPTY`], a whole boundary
    /// step, so the caller's loop always terminates.
    pub fn pop(&mut self, sink: &mut dyn InputSink) -> Step {
        let Some(front) = self.steps.pop_front() else {
            self.state = ReplayState::Idle;
            return Step::EMPTY;
        };

        if let Some(pending) = self.pending.take() {
            sink.apply_input_transition(pending.action, pending.transition, pending.player);
            self.applied += 1;
        }

        self.pending = front.input;
        if self.steps.is_empty() {
            self.state = ReplayState::Idle;
        }
        front
    }

    /// Drops all buffered steps and any pending input.
    pub fn flush(&mut self) {
        self.steps.clear();
        self.pending = None;
        self.state = ReplayState::Idle;
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReplayState {
        self.state
    }

    /// Steps not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Input transitions applied so far.
    #[must_use]
    pub const fn applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(Action, Transition, PlayerSlot)>,
    }

    impl InputSink for Recorder {
        fn apply_input_transition(&mut self, action: Action, transition: Transition, player: PlayerSlot) {
            self.calls.push((action, transition, player));
        }
    }

    fn event(transition: Transition) -> InputEvent {
        InputEvent::new(Timestamp::from_ticks(7), Action::Jump, transition, PlayerSlot::P2)
    }

    #[test]
    fn test_input_applied_on_following_pop() {
        let mut replay = ReplayLoop::new();
        let mut sink = Recorder::default();

        replay.begin_frame();
        assert_eq!(replay.state(), ReplayState::Building);
        replay.load(vec![
            Step::boundary(1.0),
            Step::with_input(event(Transition::Press), 0.25),
            Step::boundary(0.75),
        ]);
        assert_eq!(replay.state(), ReplayState::Replaying);

        assert!(replay.pop(&mut sink).is_boundary);
        let carrying = replay.pop(&mut sink);
        assert!(carrying.input.is_some());
        assert!(sink.calls.is_empty());

        let closing = replay.pop(&mut sink);
        assert!(closing.is_boundary);
        assert_eq!(sink.calls, vec![(Action::Jump, Transition::Press, PlayerSlot::P2)]);
        assert_eq!(replay.state(), ReplayState::Idle);
        assert_eq!(replay.applied(), 1);
    }

    #[test]
    fn test_each_input_applied_exactly_once() {
        let mut replay = ReplayLoop::new();
        let mut sink = Recorder::default();
        replay.load(vec![
            Step::with_input(event(Transition::Press), 0.1),
            Step::with_input(event(Transition::Release), 0.1),
            Step::with_input(event(Transition::Press), 0.1),
            Step::boundary(0.7),
        ]);
        while !replay.pop(&mut sink).is_boundary {}
        assert_eq!(sink.calls.len(), 3);
        assert_eq!(sink.calls[1].1, Transition::Release);

        // Exhausted loop hands out empty boundaries and applies nothing.
        assert_eq!(replay.pop(&mut sink), Step::EMPTY);
        assert_eq!(sink.calls.len(), 3);
    }

    #[test]
    fn test_flush_drops_pending_input() {
        let mut replay = ReplayLoop::new();
        let mut sink = Recorder::default();
        replay.load(vec![
            Step::with_input(event(Transition::Press), 0.5),
            Step::boundary(0.5),
        ]);
        let _ = replay.pop(&mut sink);
        replay.flush();
        assert_eq!(replay.remaining(), 0);
        assert_eq!(replay.pop(&mut sink), Step::EMPTY);
        assert!(sink.calls.is_empty());
    }
}
