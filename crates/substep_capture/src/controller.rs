//! # Controller Poller
//!
//! Controllers have no event stream worth trusting, so their state is
//! polled on a fixed cadence and diffed against the held set.
//!
//! ```text
//!   every interval:  poll all pads ──> pressed codes ──diff held──> press / release
//!                    (no pad found ──> log, stop polling)
//! ```
//!
//! Sticks become eight synthetic digital directions once they leave their
//! deadzone. Thumb clicks share the trigger codes.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use substep_core::{ControllerCode, Scheduler};

use crate::context::CaptureContext;
use crate::error::{CaptureError, CaptureResult};
use crate::resolver::{Resolution, SignalResolver};

/// Digital button bits of [`GamepadState::buttons`].
pub mod buttons {
    /// Dpad up.
    pub const DPAD_UP: u16 = 0x0001;
    /// Dpad down.
    pub const DPAD_DOWN: u16 = 0x0002;
    /// Dpad left.
    pub const DPAD_LEFT: u16 = 0x0004;
    /// Dpad right.
    pub const DPAD_RIGHT: u16 = 0x0008;
    /// Start.
    pub const START: u16 = 0x0010;
    /// Back.
    pub const BACK: u16 = 0x0020;
    /// Left stick click.
    pub const LEFT_THUMB: u16 = 0x0040;
    /// Right stick click.
    pub const RIGHT_THUMB: u16 = 0x0080;
    /// Left shoulder.
    pub const LEFT_SHOULDER: u16 = 0x0100;
    /// Right shoulder.
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    /// South face button.
    pub const A: u16 = 0x1000;
    /// East face button.
    pub const B: u16 = 0x2000;
    /// West face button.
    pub const X: u16 = 0x4000;
    /// North face button.
    pub const Y: u16 = 0x8000;
}

/// Left stick deadzone, in raw axis units.
pub const LEFT_STICK_DEADZONE: i16 = 7849;
/// Right stick deadzone, in raw axis units.
pub const RIGHT_STICK_DEADZONE: i16 = 8689;

const BUTTON_TABLE: [(u16, ControllerCode); 14] = [
    (buttons::DPAD_UP, ControllerCode::Up),
    (buttons::DPAD_DOWN, ControllerCode::Down),
    (buttons::DPAD_LEFT, ControllerCode::Left),
    (buttons::DPAD_RIGHT, ControllerCode::Right),
    (buttons::START, ControllerCode::Start),
    (buttons::BACK, ControllerCode::Back),
    (buttons::LEFT_THUMB, ControllerCode::Lt),
    (buttons::RIGHT_THUMB, ControllerCode::Rt),
    (buttons::LEFT_SHOULDER, ControllerCode::Lb),
    (buttons::RIGHT_SHOULDER, ControllerCode::Rb),
    (buttons::A, ControllerCode::A),
    (buttons::B, ControllerCode::B),
    (buttons::X, ControllerCode::X),
    (buttons::Y, ControllerCode::Y),
];

/// One pad's state at poll time. Axes are signed 16-bit, up is positive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GamepadState {
    /// Button bitmask, see [`buttons`].
    pub buttons: u16,
    /// Left stick X.
    pub left_x: i16,
    /// Left stick Y.
    pub left_y: i16,
    /// Right stick X.
    pub right_x: i16,
    /// Right stick Y.
    pub right_y: i16,
}

impl GamepadState {
    /// Every controller code currently down, sticks included.
    #[must_use]
    pub fn pressed_codes(&self) -> Vec<ControllerCode> {
        let mut codes: Vec<ControllerCode> = BUTTON_TABLE
            .iter()
            .filter(|(mask, _)| self.buttons & mask != 0)
            .map(|(_, code)| *code)
            .collect();

        let sticks = [
            (self.left_y > LEFT_STICK_DEADZONE, ControllerCode::LeftStickUp),
            (self.left_y < -LEFT_STICK_DEADZONE, ControllerCode::LeftStickDown),
            (self.left_x < -LEFT_STICK_DEADZONE, ControllerCode::LeftStickLeft),
            (self.left_x > LEFT_STICK_DEADZONE, ControllerCode::LeftStickRight),
            (self.right_y > RIGHT_STICK_DEADZONE, ControllerCode::RightStickUp),
            (self.right_y < -RIGHT_STICK_DEADZONE, ControllerCode::RightStickDown),
            (self.right_x < -RIGHT_STICK_DEADZONE, ControllerCode::RightStickLeft),
            (self.right_x > RIGHT_STICK_DEADZONE, ControllerCode::RightStickRight),
        ];
        codes.extend(sticks.iter().filter(|(on, _)| *on).map(|(_, code)| *code));
        codes
    }
}

/// Reads the state of every connected pad.
pub trait GamepadReader {
    /// One state per connected pad. Empty when none is connected.
    ///
    /// # Errors
    ///
    /// Backend failures. The poller stops on any error.
    fn poll(&mut self) -> CaptureResult<Vec<GamepadState>>;
}

/// Builds the reader on the poller thread, for backends that cannot be
/// moved between threads.
pub type ReaderFactory = Box<dyn FnOnce() -> CaptureResult<Box<dyn GamepadReader>> + Send>;

/// Held-state diffing across polls.
#[derive(Debug)]
pub struct PadTracker {
    resolver: SignalResolver,
}

impl PadTracker {
    /// Nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: SignalResolver::new(None),
        }
    }

    /// Diffs `pads` against the held set and enqueues bound transitions.
    /// Returns how many events were enqueued.
    pub fn apply(&mut self, pads: &[GamepadState], ctx: &CaptureContext) -> usize {
        let current: BTreeSet<u64> = pads
            .iter()
            .flat_map(GamepadState::pressed_codes)
            .map(ControllerCode::code)
            .collect();

        let released: Vec<u64> = self
            .resolver
            .held()
            .iter()
            .filter(|code| !current.contains(code))
            .collect();

        let mut enqueued = 0;
        for code in released {
            enqueued += usize::from(self.emit(code, false, ctx));
        }
        for code in current {
            enqueued += usize::from(self.emit(code, true, ctx));
        }
        enqueued
    }

    fn emit(&mut self, code: u64, pressed: bool, ctx: &CaptureContext) -> bool {
        match self.resolver.resolve_code(code, pressed, &ctx.keybinds) {
            resolution @ Resolution::Event { .. } => ctx.enqueue(resolution),
            Resolution::Duplicate | Resolution::Unbound | Resolution::Ignored => false,
        }
    }

    /// Number of codes held.
    #[must_use]
    pub fn held_len(&self) -> usize {
        self.resolver.held().len()
    }

    /// Forgets held state.
    pub fn clear(&mut self) {
        self.resolver.clear_held();
    }
}

impl Default for PadTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Poller configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between poll passes.
    pub interval: Duration,
    /// Idle wait while soft-toggled.
    pub idle_interval: Duration,
    /// Name of the poller thread.
    pub thread_name: &'static str,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_micros(500),
            idle_interval: Duration::from_millis(2_000),
            thread_name: "substep-controller",
        }
    }
}

/// Handle to the controller polling thread. Dropping it stops the thread.
pub struct ControllerPoller {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
}

impl ControllerPoller {
    /// Starts polling.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Spawn`] if the thread could not be created.
    pub fn spawn(
        factory: ReaderFactory,
        ctx: CaptureContext,
        mut scheduler: Box<dyn Scheduler>,
        config: PollerConfig,
    ) -> CaptureResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let passes = Arc::new(AtomicU64::new(0));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_passes = Arc::clone(&passes);

        let handle = thread::Builder::new()
            .name(config.thread_name.to_string())
            .spawn(move || {
                let mut reader = match factory() {
                    Ok(reader) => reader,
                    Err(e) => {
                        tracing::error!("Controller backend failed to start: {}", e);
                        return;
                    }
                };
                let mut tracker = PadTracker::new();

                while !thread_shutdown.load(Ordering::Relaxed) {
                    if ctx.flags.is_soft_toggled() {
                        scheduler.idle(config.idle_interval);
                        tracker.clear();
                        continue;
                    }

                    let started = scheduler.elapsed();
                    match reader.poll() {
                        Ok(pads) if pads.is_empty() => {
                            tracing::error!("No controller connected, controller polling stopped");
                            break;
                        }
                        Ok(pads) => {
                            tracker.apply(&pads, &ctx);
                        }
                        Err(e) => {
                            tracing::error!("Controller poll failed, polling stopped: {}", e);
                            break;
                        }
                    }
                    thread_passes.fetch_add(1, Ordering::Relaxed);

                    let spent = scheduler.elapsed().saturating_sub(started);
                    scheduler.pace(config.interval, spent);
                }
            })
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            passes,
        })
    }

    /// Completed poll passes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// True once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ControllerPoller {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ControllerPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerPoller")
            .field("passes", &self.passes())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Scripted reader: hands out one poll result per call, then reports no
/// pads.
#[derive(Debug, Default)]
pub struct ScriptedReader {
    script: std::collections::VecDeque<Vec<GamepadState>>,
}

impl ScriptedReader {
    /// A reader that replays `passes` in order.
    #[must_use]
    pub fn new(passes: Vec<Vec<GamepadState>>) -> Self {
        Self {
            script: passes.into(),
        }
    }
}

impl GamepadReader for ScriptedReader {
    fn poll(&mut self) -> CaptureResult<Vec<GamepadState>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
