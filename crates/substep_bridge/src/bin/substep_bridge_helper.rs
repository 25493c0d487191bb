//! # SUBSTEP Bridge Helper
//!
//! Forwards physical input devices into the host's shared bridge segment.
//! Started by the host; takes no arguments.
//!
//! ```bash
//! RUST_LOG=debug substep_bridge_helper
//! ```
//!
//! Exits when the host releases its watchdog or dies, or immediately after
//! writing the no-devices marker if no device can be opened.

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use substep_bridge::helper::{watch_host, BridgeHelper, HelperConfig, HelperExit};
use substep_bridge::shared::{default_segment_path, SharedRing};
use substep_bridge::BridgeResult;
use substep_core::IntervalScheduler;

const WATCHDOG_POLL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run() {
        Ok(HelperExit::Stopped) => ExitCode::SUCCESS,
        Ok(HelperExit::NoDevices) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("Bridge helper failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> BridgeResult<HelperExit> {
    let path = default_segment_path();
    let ring = SharedRing::open(&path)?;
    tracing::info!("Bridge helper attached to {}", path.display());

    if !ring.host_alive() {
        tracing::info!("Host is not holding the bridge, nothing to do");
        return Ok(HelperExit::Stopped);
    }

    let stop = Arc::new(AtomicBool::new(false));
    watch_host(ring.clone(), WATCHDOG_POLL, Arc::clone(&stop))?;

    let mut helper = BridgeHelper::new(Arc::new(ring), HelperConfig::system());
    helper.run(&mut IntervalScheduler::new(), &stop)
}
