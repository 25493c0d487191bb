//! # Platform-Dispatched Timestamps
//!
//! Some hosts dispatch touch and key input from their own platform layer
//! with a timestamp already attached (nanoseconds on the platform's
//! monotonic clock). The dispatch hook stores that time here; the host's
//! button-queue hook then takes it and enqueues the event with it.
//!
//! ```text
//!   platform dispatch(ns) ──store_nanos──> PendingTimestamp ──take──> queue_platform_button
//! ```
//!
//! Platform time is mapped into the pipeline clock's domain through a
//! fixed offset captured once by [`PendingTimestamp::anchored`].

use std::sync::atomic::{AtomicU64, Ordering};

use substep_core::{ClockDomain, Timestamp, TimestampSource};

const NONE: u64 = 0;

/// One pending platform timestamp, handed from the dispatch hook to the
/// button-queue hook.
#[derive(Debug)]
pub struct PendingTimestamp {
    pending: AtomicU64,
    domain: ClockDomain,
    /// Added to converted platform ticks to land in the clock's timeline.
    offset: i64,
}

impl PendingTimestamp {
    /// A slot whose platform clock already matches `domain`'s timeline.
    #[must_use]
    pub const fn new(domain: ClockDomain) -> Self {
        Self {
            pending: AtomicU64::new(NONE),
            domain,
            offset: 0,
        }
    }

    /// A slot mapping platform time onto `clock`, given the platform time
    /// read at the same instant.
    #[must_use]
    pub fn anchored(platform_now_ns: u64, clock: &dyn TimestampSource) -> Self {
        let domain = clock.domain();
        let platform_ticks = domain.ticks_from_micros(platform_now_ns / 1_000);
        let offset = i128::from(clock.now().ticks()) - i128::from(platform_ticks);
        Self {
            pending: AtomicU64::new(NONE),
            domain,
            offset: i64::try_from(offset).unwrap_or(0),
        }
    }

    /// Stores a platform time in nanoseconds, replacing any pending one.
    pub fn store_nanos(&self, platform_ns: u64) {
        let ticks = self.domain.ticks_from_micros(platform_ns / 1_000);
        let mapped = ticks.saturating_add_signed(self.offset).max(1);
        self.pending.store(mapped, Ordering::Release);
    }

    /// Takes the pending time, leaving the slot empty.
    pub fn take(&self) -> Option<Timestamp> {
        match self.pending.swap(NONE, Ordering::AcqRel) {
            NONE => None,
            ticks => Some(Timestamp::from_ticks(ticks)),
        }
    }

    /// Whether a time is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != NONE
    }

    /// Drops any pending time.
    pub fn clear(&self) {
        self.pending.store(NONE, Ordering::Release);
    }
}
