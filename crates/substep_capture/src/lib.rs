//! # SUBSTEP Capture
//!
//! Background threads that turn physical input into timestamped events.
//!
//! ## Threads
//!
//! ```text
//!   ┌───────────────┐   RawSignal   ┌──────────┐
//!   │  InputSource  │──────────────>│ Listener │──┐
//!   │ (evdev, chan) │               └──────────┘  │  InputEvent
//!   └───────────────┘                             ├────────────> InputQueue
//!   ┌───────────────┐  GamepadState ┌──────────┐  │
//!   │ GamepadReader │──────────────>│  Poller  │──┘
//!   └───────────────┘               └──────────┘
//! ```
//!
//! Every thread resolves signals through the shared
//! [`KeybindSnapshot`](substep_core::KeybindSnapshot), dedupes auto-repeat
//! with its own held set and stamps events with the pipeline clock.
//! Failures degrade capture to a no-op; they never reach the frame loop.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod context;
pub mod controller;
pub mod error;
pub mod evdev;
#[cfg(feature = "gamepad")]
pub mod gilrs_reader;
pub mod listener;
pub mod platform;
pub mod resolver;
pub mod source;

pub use context::CaptureContext;
pub use controller::{
    ControllerPoller, GamepadReader, GamepadState, PadTracker, PollerConfig, ReaderFactory,
    ScriptedReader,
};
pub use error::{CaptureError, CaptureResult};
pub use evdev::{DeviceClass, DeviceHub, EvdevSource, HubConfig};
#[cfg(feature = "gamepad")]
pub use gilrs_reader::GilrsReader;
pub use listener::{Listener, ListenerConfig, ListenerStats};
pub use platform::PendingTimestamp;
pub use resolver::{AltBindSink, CaptureFlags, HeldInputs, Resolution, SignalResolver};
pub use source::{ChannelSource, InputSource, MouseButton, RawSignal, SignalSender};
