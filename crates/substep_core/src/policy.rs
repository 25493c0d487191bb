//! # Step-Count Policies
//!
//! How many physics steps a frame is split into depends on the host's
//! fixed-step behaviour, which differs between host versions. The count is
//! therefore a pluggable policy rather than a constant.

/// Host timing for one frame, as seen at the physics-delta interception point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    /// Delta the host computed for this frame, seconds.
    pub modified_delta: f64,
    /// Real elapsed frame time, seconds.
    pub actual_delta: f64,
    /// Host time-scale.
    pub time_warp: f64,
}

/// Decides the number of physics steps for a frame.
pub trait StepCountPolicy: Send + Sync {
    /// Delta the host should continue with (may differ from its own).
    fn effective_delta(&self, timing: &FrameTiming) -> f64 {
        timing.modified_delta
    }

    /// Step count for the frame, `None` to skip subdivision.
    fn step_count(&self, timing: &FrameTiming) -> Option<u32>;
}

/// Four steps per 60 Hz tick, scaled by time-warp.
///
/// `round(max(1, (delta * 60 / min(1, warp)) * 4))`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuarterTickPolicy {
    /// Use `actual_delta * time_warp` instead of the host's delta.
    pub use_actual_delta: bool,
}

impl QuarterTickPolicy {
    /// Policy on the host's own delta.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            use_actual_delta: false,
        }
    }

    /// Policy on the real frame time.
    #[must_use]
    pub const fn actual_delta() -> Self {
        Self {
            use_actual_delta: true,
        }
    }
}

impl StepCountPolicy for QuarterTickPolicy {
    fn effective_delta(&self, timing: &FrameTiming) -> f64 {
        if self.use_actual_delta {
            timing.actual_delta * timing.time_warp
        } else {
            timing.modified_delta
        }
    }

    fn step_count(&self, timing: &FrameTiming) -> Option<u32> {
        let delta = self.effective_delta(timing);
        if delta <= 0.0 || !delta.is_finite() {
            return None;
        }
        let warp = timing.time_warp.min(1.0);
        if warp <= 0.0 {
            return None;
        }
        let steps = ((delta * 60.0 / warp) * 4.0).max(1.0).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = steps.min(f64::from(u32::MAX)) as u32;
        Some(count)
    }
}

/// Always the same number of steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedStepPolicy {
    /// Steps per frame, at least 1.
    pub steps: u32,
}

impl StepCountPolicy for FixedStepPolicy {
    fn step_count(&self, timing: &FrameTiming) -> Option<u32> {
        (timing.modified_delta > 0.0).then_some(self.steps.max(1))
    }
}
