//! # SUBSTEP Bridge
//!
//! Carries raw device input from a helper process into the host when the
//! host cannot read background input itself.
//!
//! ## Data Flow
//!
//! ```text
//!   helper process                           host process
//!   ┌──────────────┐                         ┌──────────────────┐
//!   │  DeviceHub   │                         │  frame start     │
//!   │      │       │    ┌──────────────┐     │      │ drain(1ms)│
//!   │ record_for   │───>│ 20-slot ring │────>│ HostTranslator   │──> InputQueue
//!   │      │ push  │    │ + lock word  │     │                  │
//!   └──────────────┘    └──────────────┘     └──────────────────┘
//!          ▲                                          │
//!          └──────────── watchdog (host pid) ─────────┘
//! ```
//!
//! The host depends only on [`BoundedChannel`]: [`SharedRing`] is the
//! cross-process transport and [`LocalRing`] the in-process one.
//!
//! ## Timeouts
//!
//! A lock wait that runs out is "no data this poll", reported as
//! `Ok(None)` or [`PushOutcome::TimedOut`]. Only a lock that cannot be
//! taken at all is an error.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod codes;
pub mod diagnostic;
pub mod error;
pub mod helper;
pub mod record;
pub mod shared;
pub mod translate;

pub use channel::{BoundedChannel, LocalRing, PushOutcome};
pub use diagnostic::{DiagnosticLatch, DiagnosticSink, NO_DEVICES_MESSAGE};
pub use error::{BridgeError, BridgeResult};
pub use helper::{BridgeHelper, HelperConfig, HelperExit};
pub use record::{BridgeRecord, BUFFER_SIZE};
pub use shared::{LockOutcome, SharedRing, WatchdogHold};
pub use translate::HostTranslator;
