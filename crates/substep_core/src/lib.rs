//! # SUBSTEP Core Engine
//!
//! Sub-frame input timing for fixed-step simulations driven by a
//! variable-rate frame loop.
//!
//! An input that lands between two frames is placed at the fractional point
//! inside the physics step where it happened, instead of being snapped to
//! the next whole step.
//!
//! ## Data Flow
//!
//! ```text
//!   capture threads ──InputEvent──> InputQueue ──drain──> StepBuilder
//!                                                           │
//!                                                   Vec<Step>
//!                                                           ▼
//!   host update(delta * weight) <──pop()── ReplayLoop ──apply()──> InputSink
//! ```
//!
//! ## Rules
//!
//! 1. **Locks are short** - the queue and keybind locks are held only for a
//!    push, swap or drain
//! 2. **One clock domain** - every timestamp goes through a [`TimestampSource`]
//! 3. **No zero-length steps** - every weight is floored at [`MIN_STEP_WEIGHT`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use substep_core::{InputQueue, StepBuilder, ReplayLoop, DrainPolicy, Clock};
//!
//! let clock = Clock::native();
//! let queue = InputQueue::new();
//! let mut builder = StepBuilder::new();
//! let mut replay = ReplayLoop::new();
//!
//! builder.mark_frame_start(clock.now());
//! if let FramePlan::Subdivided(steps) = builder.build(4, &queue, DrainPolicy::Early, &clock)? {
//!     replay.load(steps);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod builder;
pub mod error;
pub mod event;
pub mod keybinds;
pub mod keymap;
pub mod policy;
pub mod queue;
pub mod replay;
pub mod scheduler;
pub mod settings;
pub mod time;

pub use builder::{subdivide, BuilderStats, FrameClock, FramePlan, SkipReason, StepBuilder};
pub use error::{CoreError, CoreResult};
pub use event::{Action, InputEvent, PlayerSlot, Step, Transition, MIN_STEP_WEIGHT};
pub use keybinds::{BindSlot, BindingConfig, BindingProvider, KeybindSnapshot, KeybindTable};
pub use keymap::{BindCode, ControllerCode};
pub use policy::{FixedStepPolicy, FrameTiming, QuarterTickPolicy, StepCountPolicy};
pub use queue::{DrainPolicy, Drained, InputQueue, QueueStatsSnapshot};
pub use replay::{InputSink, ReplayLoop, ReplayState};
pub use scheduler::{IntervalScheduler, ManualScheduler, Scheduler};
pub use settings::{Settings, SettingsStore};
pub use time::{Clock, ClockDomain, ManualClock, Timestamp, TimestampSource};
