//! # Capture Error Types
//!
//! Capture failures never reach the frame loop. The listener and poller
//! threads log them and either skip the packet or stop capturing.

use thiserror::Error;

/// Errors raised by input sources, device readers and capture threads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The source could not subscribe to OS input notifications.
    #[error("input source registration failed: {0}")]
    Registration(String),

    /// A packet that could not be decoded.
    #[error("malformed input packet ({len} bytes): {reason}")]
    Malformed {
        /// Packet size as received.
        len: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A device node could not be opened or read.
    #[error("device io failed for {path}: {reason}")]
    DeviceIo {
        /// Device node path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The producing side of a source has gone away.
    #[error("input source closed")]
    SourceClosed,

    /// A controller pass found no connected pad.
    #[error("no controller connected")]
    NoController,

    /// The controller backend could not be initialized.
    #[error("controller backend unavailable: {0}")]
    Backend(String),

    /// A capture thread could not be started.
    #[error("failed to spawn capture thread: {0}")]
    Spawn(String),
}

impl CaptureError {
    /// True for errors that only lose the current packet.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;
