//! # SUBSTEP
//!
//! Sub-frame input placement for fixed-step simulations. Inputs are
//! captured off the frame loop with precise timestamps, then each frame's
//! physics steps are split so every input lands at the instant it
//! actually happened.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SUBSTEP PIPELINE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐    │
//! │  │   CAPTURE       │     │   BRIDGE        │     │   PLATFORM      │    │
//! │  │  • Listener     │     │  • Helper proc  │     │  • Dispatch ts  │    │
//! │  │  • Controller   │     │  • Shared ring  │     │                 │    │
//! │  └────────┬────────┘     └────────┬────────┘     └────────┬────────┘    │
//! │           │                       │                       │             │
//! │           └───────────────────────┼───────────────────────┘             │
//! │                                   v                                     │
//! │                          ┌─────────────────┐                            │
//! │                          │   CORE          │                            │
//! │                          │  • InputQueue   │                            │
//! │                          │  • StepBuilder  │                            │
//! │                          │  • ReplayLoop   │                            │
//! │                          └────────┬────────┘                            │
//! │                                   v                                     │
//! │                          host Simulation                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `pipeline`: the owned per-host context and its frame hooks
//! - `host`: what the pipeline needs from the host
//! - `error`: pipeline errors

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod host;
pub mod pipeline;

pub use substep_bridge as bridge;
pub use substep_capture as capture;
pub use substep_core as core;

pub use error::{PipelineError, PipelineResult};
pub use host::{HostSession, Simulation};
pub use pipeline::{InputPipeline, PipelineStats};
