//! # Raw Input Listener
//!
//! A dedicated thread that pulls signals from an [`InputSource`], resolves
//! them against the keybinding snapshot and pushes stamped events into the
//! input queue.
//!
//! ## Loop
//!
//! ```text
//!   register ──fail──> log, exit (capture becomes a no-op)
//!      │
//!      ▼
//!   ┌─> shutdown? ──yes──> exit
//!   │      │
//!   │   soft-toggled? ──yes──> idle(interval), discard pending ─┐
//!   │      │                                                    │
//!   │   next_signal(poll) ──malformed──> log, skip              │
//!   │      │            └──closed──> exit                       │
//!   │   resolve ──> stamp ──> push                              │
//!   └──────┴────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use substep_core::Scheduler;

use crate::context::CaptureContext;
use crate::error::{CaptureError, CaptureResult};
use crate::resolver::{AltBindSink, Resolution, SignalResolver};
use crate::source::InputSource;

/// Listener configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Longest single wait on the source before re-checking flags.
    pub poll_timeout: Duration,
    /// Idle wait while soft-toggled.
    pub idle_interval: Duration,
    /// Name of the listener thread.
    pub thread_name: &'static str,
}

impl ListenerConfig {
    /// Production defaults.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            poll_timeout: Duration::from_millis(50),
            idle_interval: Duration::from_millis(2_000),
            thread_name: "substep-listener",
        }
    }

    /// Short waits for tests.
    #[must_use]
    pub const fn testing() -> Self {
        Self {
            poll_timeout: Duration::from_millis(5),
            idle_interval: Duration::from_millis(1),
            thread_name: "substep-listener-test",
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Listener counters.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Signals received from the source.
    pub signals: AtomicU64,
    /// Events pushed to the queue.
    pub enqueued: AtomicU64,
    /// Auto-repeat presses dropped.
    pub duplicates: AtomicU64,
    /// Signals with no binding.
    pub unbound: AtomicU64,
    /// Packets that failed to decode.
    pub malformed: AtomicU64,
    /// Idle waits while soft-toggled.
    pub idle_ticks: AtomicU64,
    /// Signals discarded while idle.
    pub discarded: AtomicU64,
}

impl ListenerStats {
    /// Reads a counter.
    #[must_use]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Handle to a running listener thread. Dropping it stops the thread.
pub struct Listener {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Starts the listener thread.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Spawn`] if the thread could not be created.
    /// Registration failures happen on the thread and are only logged.
    pub fn spawn(
        source: Box<dyn InputSource>,
        ctx: CaptureContext,
        scheduler: Box<dyn Scheduler>,
        alt_sink: Option<Arc<dyn AltBindSink>>,
        config: ListenerConfig,
    ) -> CaptureResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ListenerStats::default());

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(config.thread_name.to_string())
            .spawn(move || {
                let mut worker = ListenerLoop {
                    source,
                    ctx,
                    scheduler,
                    resolver: SignalResolver::new(alt_sink),
                    config,
                    shutdown: thread_shutdown,
                    stats: thread_stats,
                };
                worker.run();
            })
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            stats,
        })
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// True once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the thread and waits for it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("finished", &self.is_finished())
            .field("stats", &self.stats)
            .finish()
    }
}

struct ListenerLoop {
    source: Box<dyn InputSource>,
    ctx: CaptureContext,
    scheduler: Box<dyn Scheduler>,
    resolver: SignalResolver,
    config: ListenerConfig,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
}

impl ListenerLoop {
    fn run(&mut self) {
        if let Err(e) = self.source.register() {
            tracing::error!("Input listener registration failed, capture disabled: {}", e);
            return;
        }

        if self.ctx.flags.thread_priority.load(Ordering::Acquire) {
            tracing::warn!("Elevated listener priority is not supported here, running at normal priority");
        }

        tracing::info!("Input listener started");

        while !self.shutdown.load(Ordering::Relaxed) {
            if self.ctx.flags.is_soft_toggled() {
                self.idle();
                continue;
            }

            match self.source.next_signal(self.config.poll_timeout) {
                Ok(Some(signal)) => {
                    ListenerStats::bump(&self.stats.signals, 1);
                    let resolution = self.resolver.resolve(
                        signal,
                        &self.ctx.keybinds,
                        self.ctx.flags.right_click(),
                    );
                    self.record(resolution);
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    ListenerStats::bump(&self.stats.malformed, 1);
                    tracing::debug!("Skipping input packet: {}", e);
                }
                Err(e) => {
                    tracing::info!("Input listener stopping: {}", e);
                    break;
                }
            }
        }

        tracing::info!(
            "Input listener stopped ({} signals, {} events)",
            ListenerStats::get(&self.stats.signals),
            ListenerStats::get(&self.stats.enqueued)
        );
    }

    fn idle(&mut self) {
        self.scheduler.idle(self.config.idle_interval);
        let dropped = self.source.discard_pending();
        ListenerStats::bump(&self.stats.discarded, dropped as u64);
        self.resolver.clear_held();
        ListenerStats::bump(&self.stats.idle_ticks, 1);
    }

    fn record(&self, resolution: Resolution) {
        match resolution {
            Resolution::Duplicate => ListenerStats::bump(&self.stats.duplicates, 1),
            Resolution::Unbound => ListenerStats::bump(&self.stats.unbound, 1),
            Resolution::Ignored => {}
            Resolution::Event { .. } => {
                if self.ctx.enqueue(resolution) {
                    ListenerStats::bump(&self.stats.enqueued, 1);
                }
            }
        }
    }
}
