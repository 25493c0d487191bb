//! # Host Collaborators
//!
//! The narrow interface the pipeline needs from the host simulation. All
//! knowledge of host object layout stays behind these traits.

use substep_core::InputSink;

/// Session state queried once per frame.
pub trait HostSession {
    /// A play session is running.
    fn is_in_simulation_session(&self) -> bool;

    /// The session is paused.
    fn is_paused(&self) -> bool;

    /// The host is in an editor rather than play.
    fn is_editor(&self) -> bool;

    /// The controlled object is dead.
    fn is_dead(&self) -> bool;

    /// Host time-scale.
    fn current_time_scale(&self) -> f64;

    /// Whether inputs should be placed this frame at all.
    fn is_active(&self) -> bool {
        self.is_in_simulation_session() && !self.is_paused() && !self.is_editor() && !self.is_dead()
    }
}

/// The simulated object, advanced one sub-step at a time.
pub trait Simulation: InputSink {
    /// Advances physics by `delta`.
    fn advance_sub_step(&mut self, delta: f64);

    /// Resolves collisions for a sub-step of `delta`.
    fn check_collisions(&mut self, delta: f64);

    /// Advances rotation for a sub-step of `delta`.
    fn update_rotation(&mut self, delta: f64);

    /// Completes the rotation left partial by the last sub-step.
    fn complete_fractional_rotation(&mut self);
}
