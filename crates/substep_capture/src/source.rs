//! # Input Sources
//!
//! The listener thread never talks to an OS API directly. It pulls
//! [`RawSignal`]s from an [`InputSource`], so tests and alternate backends
//! can feed it without real devices.
//!
//! ```text
//!   OS / device ──> InputSource::next_signal ──> Listener ──> InputQueue
//! ```

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{CaptureError, CaptureResult};

/// Mouse button identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left / primary button.
    Primary,
    /// Right / secondary button.
    Secondary,
    /// Any other button.
    Other(u16),
}

/// One physical signal, before keybinding resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawSignal {
    /// A keyboard key changed state.
    Key {
        /// Virtual key code.
        vk: u16,
        /// Down (true) or up (false).
        pressed: bool,
    },
    /// A mouse button changed state.
    Mouse {
        /// Which button.
        button: MouseButton,
        /// Down (true) or up (false).
        pressed: bool,
    },
    /// Mouse packet without a button transition (motion, wheel).
    MouseMotion,
}

/// Producer of raw signals for the listener thread.
pub trait InputSource: Send {
    /// Subscribes to input notifications. Called once, on the listener
    /// thread, before the first [`next_signal`](Self::next_signal).
    ///
    /// # Errors
    ///
    /// [`CaptureError::Registration`] if the subscription failed; the
    /// listener then exits without capturing.
    fn register(&mut self) -> CaptureResult<()>;

    /// Waits up to `timeout` for the next signal.
    ///
    /// # Errors
    ///
    /// A recoverable error (see [`CaptureError::is_recoverable`]) loses one
    /// packet. Anything else ends the listener loop.
    fn next_signal(&mut self, timeout: Duration) -> CaptureResult<Option<RawSignal>>;

    /// Throws away everything already received. Returns how many signals
    /// were dropped.
    fn discard_pending(&mut self) -> usize;
}

type Packet = CaptureResult<RawSignal>;

/// Sending half of a [`ChannelSource`].
#[derive(Clone, Debug)]
pub struct SignalSender {
    tx: Sender<Packet>,
}

impl SignalSender {
    /// Sends a signal. Returns false once the source is gone.
    pub fn send(&self, signal: RawSignal) -> bool {
        self.tx.send(Ok(signal)).is_ok()
    }

    /// Sends a packet that failed to decode.
    pub fn send_malformed(&self, len: usize, reason: impl Into<String>) -> bool {
        self.tx
            .send(Err(CaptureError::Malformed {
                len,
                reason: reason.into(),
            }))
            .is_ok()
    }
}

/// Channel-fed source, for backends that receive on their own thread and
/// for tests.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Packet>,
    registration: Option<String>,
}

impl ChannelSource {
    /// A connected sender and source pair.
    #[must_use]
    pub fn pair() -> (SignalSender, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            SignalSender { tx },
            Self {
                rx,
                registration: None,
            },
        )
    }

    /// Makes [`InputSource::register`] fail with `reason`.
    #[must_use]
    pub fn failing_registration(mut self, reason: impl Into<String>) -> Self {
        self.registration = Some(reason.into());
        self
    }
}

impl InputSource for ChannelSource {
    fn register(&mut self) -> CaptureResult<()> {
        match self.registration.take() {
            Some(reason) => Err(CaptureError::Registration(reason)),
            None => Ok(()),
        }
    }

    fn next_signal(&mut self, timeout: Duration) -> CaptureResult<Option<RawSignal>> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => packet.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::SourceClosed),
        }
    }

    fn discard_pending(&mut self) -> usize {
        self.rx.try_iter().count()
    }
}
