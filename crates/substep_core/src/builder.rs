//! # Step Builder
//!
//! Splits one frame's elapsed time into `N` physics steps and places each
//! drained input at the fractional point where it happened.
//!
//! ## Frame Layout
//!
//! ```text
//!   last_frame                                                  current_frame
//!   │◄──────────────────────── frame_span ─────────────────────────►│
//!   ├──── step 0 ────┼──── step 1 ────┼──── step 2 ────┼──── step 3 ────┤
//!   │                │                │     ▲ press    │                │
//!   │   boundary 1.0 │   boundary 1.0 │ 0.40 │ bnd 0.60│   boundary 1.0 │
//!
//!   step_span = frame_span / N + 1
//!   step i covers [last_frame + step_span*i, last_frame + step_span*(i+1))
//! ```
//!
//! The `+ 1` keeps `step_span * N` strictly above the frame span, so an
//! input stamped at the very end of the frame still lands in the last step.
//!
//! Within one physics step the weights of the emitted steps sum to 1.0, and
//! no weight is ever zero (see [`MIN_STEP_WEIGHT`](crate::event::MIN_STEP_WEIGHT)).

use std::collections::VecDeque;

use crate::error::{CoreError, CoreResult};
use crate::event::{InputEvent, Step};
use crate::queue::{DrainPolicy, InputQueue};
use crate::time::{Timestamp, TimestampSource};

/// Frame boundary bookkeeping owned by the frame thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameClock {
    /// Start of the frame being built.
    pub last_frame: Timestamp,
    /// End of the frame being built.
    pub current_frame: Timestamp,
    /// No valid `last_frame` yet.
    pub first_frame: bool,
}

/// Why a frame was not subdivided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// First frame of a session; there is no previous boundary yet.
    FirstFrame,
    /// The host simulation is not running (editor, dead, paused, disabled).
    Inactive,
    /// The host reported a non-positive delta.
    NoElapsedTime,
}

/// What the consumer should do this frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FramePlan {
    /// Replay these steps in order.
    Subdivided(Vec<Step>),
    /// Run one ordinary whole-step update with no input splitting.
    Skip(SkipReason),
}

impl FramePlan {
    /// True for [`FramePlan::Skip`].
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Builder statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Frames that were subdivided.
    pub frames_built: u64,
    /// Frames that were skipped.
    pub frames_skipped: u64,
    /// Steps emitted.
    pub steps_emitted: u64,
    /// Inputs placed on a step.
    pub inputs_placed: u64,
}

/// Places `events` on the step grid of one frame.
///
/// Events are taken from the front of `events` while they fall inside the
/// frame's grid. Anything left over stays in the deque.
///
/// # Errors
///
/// Returns [`CoreError::ZeroStepCount`] if `step_count` is zero.
pub fn subdivide(
    last_frame: Timestamp,
    current_frame: Timestamp,
    step_count: u32,
    events: &mut VecDeque<InputEvent>,
) -> CoreResult<Vec<Step>> {
    if step_count == 0 {
        return Err(CoreError::ZeroStepCount(step_count));
    }

    let count = u64::from(step_count);
    let frame_span = current_frame.saturating_since(last_frame);
    let step_span = frame_span / count + 1;

    let mut steps = Vec::with_capacity(step_count as usize + events.len());

    for i in 0..count {
        let upper = step_span * (i + 1);
        let mut consumed = 0.0_f64;

        while let Some(front) = events.front() {
            let offset = front.timestamp.saturating_since(last_frame);
            if offset >= upper {
                break;
            }

            #[allow(clippy::cast_precision_loss)]
            let factor = (offset % step_span) as f64 / step_span as f64;
            steps.push(Step::with_input(*front, factor - consumed));
            consumed = factor;
            events.pop_front();
        }

        steps.push(Step::boundary(1.0 - consumed));
    }

    Ok(steps)
}

/// Per-frame step construction with session state.
#[derive(Debug)]
pub struct StepBuilder {
    frame: FrameClock,
    /// End of the previous subdivided frame.
    last_physics_frame: Timestamp,
    /// Drained events not yet placed.
    carried: VecDeque<InputEvent>,
    stats: BuilderStats,
}

impl StepBuilder {
    /// A builder waiting for its first frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame: FrameClock {
                first_frame: true,
                ..FrameClock::default()
            },
            last_physics_frame: Timestamp::ZERO,
            carried: VecDeque::new(),
            stats: BuilderStats::default(),
        }
    }

    /// Records the frame-start timestamp used by early cutoff.
    pub fn mark_frame_start(&mut self, now: Timestamp) {
        self.frame.current_frame = now;
    }

    /// Session reset: forget every buffered event and wait for a fresh
    /// first frame.
    pub fn reset(&mut self) {
        self.frame.first_frame = true;
        self.carried.clear();
    }

    /// The simulation is inactive this frame.
    #[must_use]
    pub fn short_circuit(&mut self) -> FramePlan {
        self.reset();
        self.stats.frames_skipped += 1;
        FramePlan::Skip(SkipReason::Inactive)
    }

    /// Records a frame the host reported with no elapsed time.
    #[must_use]
    pub fn skip_empty_frame(&mut self) -> FramePlan {
        self.stats.frames_skipped += 1;
        FramePlan::Skip(SkipReason::NoElapsedTime)
    }

    /// Drains `queue` and builds this frame's plan.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ZeroStepCount`] if `step_count` is zero. The
    /// builder state is untouched in that case.
    pub fn build(
        &mut self,
        step_count: u32,
        queue: &InputQueue,
        policy: DrainPolicy,
        clock: &dyn TimestampSource,
    ) -> CoreResult<FramePlan> {
        if step_count == 0 {
            return Err(CoreError::ZeroStepCount(step_count));
        }

        self.frame.last_frame = self.last_physics_frame;

        let drained = queue.drain(policy, self.frame.current_frame, clock);
        self.frame.current_frame = drained.boundary;
        self.carried.extend(drained.events);

        self.last_physics_frame = self.frame.current_frame;

        if self.frame.first_frame {
            self.frame.first_frame = false;
            if policy == DrainPolicy::Early {
                self.carried.clear();
            }
            self.stats.frames_skipped += 1;
            return Ok(FramePlan::Skip(SkipReason::FirstFrame));
        }

        let before = self.carried.len();
        let steps = subdivide(
            self.frame.last_frame,
            self.frame.current_frame,
            step_count,
            &mut self.carried,
        )?;

        self.stats.frames_built += 1;
        self.stats.steps_emitted += steps.len() as u64;
        self.stats.inputs_placed += (before - self.carried.len()) as u64;

        Ok(FramePlan::Subdivided(steps))
    }

    /// Current frame boundaries.
    #[must_use]
    pub const fn frame_clock(&self) -> FrameClock {
        self.frame
    }

    /// Events drained but not yet placed.
    #[must_use]
    pub fn carried_len(&self) -> usize {
        self.carried.len()
    }

    /// Builder statistics.
    #[must_use]
    pub const fn stats(&self) -> &BuilderStats {
        &self.stats
    }
}

impl Default for StepBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Action, PlayerSlot, Transition, MIN_STEP_WEIGHT};
    use crate::time::ManualClock;

    const EPSILON: f64 = 1e-9;

    fn press(t: u64) -> InputEvent {
        InputEvent::new(
            Timestamp::from_ticks(t),
            Action::Jump,
            Transition::Press,
            PlayerSlot::P1,
        )
    }

    fn physics_step_sums(steps: &[Step]) -> Vec<f64> {
        let mut sums = Vec::new();
        let mut acc = 0.0;
        for step in steps {
            acc += step.weight;
            if step.is_boundary {
                sums.push(acc);
                acc = 0.0;
            }
        }
        sums
    }

    #[test]
    fn test_empty_frame_yields_whole_boundaries() {
        for count in 1..=16 {
            let mut events = VecDeque::new();
            let steps = subdivide(
                Timestamp::from_ticks(1_000),
                Timestamp::from_ticks(17_667),
                count,
                &mut events,
            )
            .unwrap();
            assert_eq!(steps.len(), count as usize);
            for step in &steps {
                assert!(step.is_boundary);
                assert!(step.input.is_none());
                assert_eq!(step.weight, 1.0);
            }
        }
    }

    #[test]
    fn test_single_press_mid_frame() {
        let last = 1_000_000;
        let mut events = VecDeque::from([press(last + 10_000)]);
        let steps = subdivide(
            Timestamp::from_ticks(last),
            Timestamp::from_ticks(last + 16_667),
            4,
            &mut events,
        )
        .unwrap();

        assert_eq!(steps.len(), 5);
        assert!(steps[0].is_boundary && steps[0].weight == 1.0);
        assert!(steps[1].is_boundary && steps[1].weight == 1.0);

        let expected = 1_666.0 / 4_167.0;
        assert!(!steps[2].is_boundary);
        assert_eq!(steps[2].input, Some(press(last + 10_000)));
        assert!((steps[2].weight - expected).abs() < EPSILON);

        assert!(steps[3].is_boundary);
        assert!((steps[3].weight - (1.0 - expected)).abs() < EPSILON);
        assert!((steps[2].weight + steps[3].weight - 1.0).abs() < EPSILON);

        assert!(steps[4].is_boundary && steps[4].weight == 1.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_event_on_step_edge_belongs_to_later_step() {
        // span 4000, 4 steps => step_span 1001; edge of step 0 is offset 1001.
        let mut events = VecDeque::from([press(1_001)]);
        let steps = subdivide(Timestamp::ZERO, Timestamp::from_ticks(4_000), 4, &mut events).unwrap();

        assert!(steps[0].is_boundary);
        assert_eq!(steps[0].weight, 1.0);
        assert!(!steps[1].is_boundary);
        assert_eq!(steps[1].input, Some(press(1_001)));
        // Offset 0 within step 1: floored, never zero.
        assert_eq!(steps[1].weight, MIN_STEP_WEIGHT);
    }

    #[test]
    fn test_simultaneous_events_never_zero_weight() {
        let mut events = VecDeque::from([press(500), press(500), press(500)]);
        let steps = subdivide(Timestamp::ZERO, Timestamp::from_ticks(4_000), 2, &mut events).unwrap();
        for step in &steps {
            assert!(step.weight > 0.0);
        }
        assert_eq!(steps.iter().filter(|s| s.input.is_some()).count(), 3);
    }

    #[test]
    fn test_weights_sum_to_one_per_physics_step() {
        let last = 50_000u64;
        let span = 16_667u64;
        let mut events: VecDeque<InputEvent> =
            (0..40).map(|k| press(last + k * 397 % span)).collect();
        // Keep a single producer's monotonic order.
        events.make_contiguous().sort_by_key(|e| e.timestamp);

        for count in [1u32, 2, 3, 4, 7, 16] {
            let mut frame_events = events.clone();
            let steps = subdivide(
                Timestamp::from_ticks(last),
                Timestamp::from_ticks(last + span),
                count,
                &mut frame_events,
            )
            .unwrap();
            assert!(frame_events.is_empty());
            let sums = physics_step_sums(&steps);
            assert_eq!(sums.len(), count as usize);
            for sum in sums {
                assert!((sum - 1.0).abs() < 1e-6, "sum {sum} with {count} steps");
            }
            assert!(steps.iter().all(|s| s.weight > 0.0));
        }
    }

    #[test]
    fn test_zero_step_count_rejected() {
        let mut events = VecDeque::new();
        assert_eq!(
            subdivide(Timestamp::ZERO, Timestamp::from_ticks(10), 0, &mut events),
            Err(CoreError::ZeroStepCount(0))
        );
    }

    #[test]
    fn test_first_frame_skips_subdivision() {
        let clock = ManualClock::new(10_000);
        let queue = InputQueue::new();
        let mut builder = StepBuilder::new();

        queue.push(press(9_000));
        builder.mark_frame_start(clock.now());
        let plan = builder.build(4, &queue, DrainPolicy::Early, &clock).unwrap();
        assert_eq!(plan, FramePlan::Skip(SkipReason::FirstFrame));
        assert_eq!(builder.carried_len(), 0);

        // Second frame subdivides.
        clock.set(26_667);
        queue.push(press(20_000));
        builder.mark_frame_start(clock.now());
        let plan = builder.build(4, &queue, DrainPolicy::Early, &clock).unwrap();
        let FramePlan::Subdivided(steps) = plan else {
            panic!("expected subdivided frame");
        };
        assert_eq!(steps.iter().filter(|s| s.input.is_some()).count(), 1);
        assert_eq!(builder.frame_clock().last_frame.ticks(), 10_000);
        assert_eq!(builder.frame_clock().current_frame.ticks(), 26_667);
    }

    #[test]
    fn test_late_cutoff_uses_drain_time() {
        let clock = ManualClock::new(5_000);
        let queue = InputQueue::new();
        let mut builder = StepBuilder::new();

        let _ = builder.build(4, &queue, DrainPolicy::Late, &clock).unwrap();

        clock.set(21_667);
        queue.push(press(21_667));
        let plan = builder.build(4, &queue, DrainPolicy::Late, &clock).unwrap();
        let FramePlan::Subdivided(steps) = plan else {
            panic!("expected subdivided frame");
        };
        // The event at the drain instant is in this frame's last step.
        assert_eq!(steps.len(), 5);
        assert!(steps[3].input.is_some());
    }

    #[test]
    fn test_short_circuit_discards_buffered_events() {
        let clock = ManualClock::new(1_000);
        let queue = InputQueue::new();
        let mut builder = StepBuilder::new();

        builder.mark_frame_start(clock.now());
        let _ = builder.build(4, &queue, DrainPolicy::Early, &clock).unwrap();

        let plan = builder.short_circuit();
        assert_eq!(plan, FramePlan::Skip(SkipReason::Inactive));
        assert!(builder.frame_clock().first_frame);

        clock.set(2_000);
        builder.mark_frame_start(clock.now());
        let plan = builder.build(4, &queue, DrainPolicy::Early, &clock).unwrap();
        assert!(plan.is_skip());
        assert_eq!(builder.stats().frames_skipped, 3);
    }

    #[test]
    fn test_zero_step_count_leaves_state() {
        let clock = ManualClock::new(1_000);
        let queue = InputQueue::new();
        let mut builder = StepBuilder::new();
        queue.push(press(500));
        assert!(builder.build(0, &queue, DrainPolicy::Late, &clock).is_err());
        assert_eq!(queue.len(), 1);
        assert!(builder.frame_clock().first_frame);
    }
}
