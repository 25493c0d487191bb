//! # Pipeline Error Types

use substep_bridge::BridgeError;
use substep_capture::CaptureError;
use substep_core::CoreError;
use thiserror::Error;

/// Errors surfaced to the host by [`InputPipeline`](crate::InputPipeline).
///
/// Capture and bridge failures that happen while running are logged and
/// never returned; only setup calls return them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Core configuration or step-building error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A capture thread could not be started.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The bridge could not be set up.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A capture thread of this kind is already running.
    #[error("{0} already running")]
    AlreadyRunning(&'static str),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
