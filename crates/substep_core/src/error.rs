//! # Core Error Types
//!
//! All errors that can occur in the timing core.
//!
//! Bounded waits that run out of time are not errors here. They are plain
//! return values so callers can treat them as "nothing this poll".

use thiserror::Error;

/// Errors that can occur in the timing core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A step count of zero was requested for a frame.
    #[error("step count must be at least 1, got {0}")]
    ZeroStepCount(u32),

    /// A setting name that the store does not know about.
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    /// Settings or binding file could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Settings or binding file could not be read or written.
    #[error("configuration io failed for {path}: {reason}")]
    ConfigIo {
        /// The file involved.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A binding slot index outside `0..6`.
    #[error("binding slot out of range: {0}")]
    SlotOutOfRange(usize),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
