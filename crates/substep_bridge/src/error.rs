//! # Bridge Error Types
//!
//! A lock that times out is not an error: it is `Ok(None)` or
//! [`PushOutcome::TimedOut`](crate::channel::PushOutcome::TimedOut), meaning
//! "no data this poll". Errors here are real failures.

use substep_capture::CaptureError;
use thiserror::Error;

/// Errors that can occur on either side of the bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The shared segment could not be created, opened or mapped.
    #[error("shared segment io failed for {path}: {reason}")]
    Segment {
        /// Backing file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The segment exists but does not hold a bridge ring.
    #[error("corrupt shared segment: {0}")]
    CorruptHeader(String),

    /// The lock could not be acquired at all (not a timeout).
    #[error("failed to acquire bridge lock: {0}")]
    LockFailed(String),

    /// Device capture on the helper side failed.
    #[error("device capture failed: {0}")]
    Capture(#[from] CaptureError),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
