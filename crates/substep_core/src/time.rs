//! # Timestamp Source
//!
//! One abstraction for every time read on the capture and frame paths.
//!
//! ## Clock Domains
//!
//! ```text
//!   Native         monotonic µs since the clock anchor   (never 0)
//!   Compatibility  100ns ticks since 1601-01-01 UTC       (FILETIME layout)
//! ```
//!
//! Raw values from the two domains have different epochs and units. They
//! must never be compared with each other; a pipeline picks one domain at
//! startup and every producer stamps through the same source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;

/// Compatibility ticks per second (100ns units).
pub const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// A point in time in one clock domain.
///
/// Zero is reserved as "no timestamp".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The reserved empty timestamp.
    pub const ZERO: Self = Self(0);

    /// Wraps raw ticks.
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw ticks in the owning clock's domain.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// True for the reserved empty timestamp.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Ticks elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Converts a unix `(seconds, microseconds)` pair into a compatibility
/// domain timestamp.
#[must_use]
pub const fn filetime_from_unix(secs: u64, micros: u64) -> Timestamp {
    Timestamp(
        (secs + FILETIME_UNIX_OFFSET_SECS) * FILETIME_TICKS_PER_SECOND + micros * 10,
    )
}

/// Which backing clock a source reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockDomain {
    /// High-resolution monotonic counter, microseconds.
    #[default]
    Native,
    /// Wall-clock-like counter shared with the bridge helper process.
    Compatibility,
}

impl ClockDomain {
    /// Resolution of the domain.
    #[must_use]
    pub const fn ticks_per_second(self) -> u64 {
        match self {
            Self::Native => 1_000_000,
            Self::Compatibility => FILETIME_TICKS_PER_SECOND,
        }
    }

    /// Converts a duration in microseconds into ticks of this domain.
    #[must_use]
    pub const fn ticks_from_micros(self, micros: u64) -> u64 {
        match self {
            Self::Native => micros,
            Self::Compatibility => micros * 10,
        }
    }
}

/// Anything that can stamp events and frame boundaries.
///
/// Must be monotonic and callable from any thread.
pub trait TimestampSource: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;

    /// Domain of every value returned by [`TimestampSource::now`].
    fn domain(&self) -> ClockDomain;
}

/// The production clock.
#[derive(Debug)]
pub struct Clock {
    domain: ClockDomain,
    anchor: Instant,
    /// Highest compatibility value handed out so far.
    last_compat: AtomicU64,
}

impl Clock {
    /// A native monotonic clock anchored now.
    #[must_use]
    pub fn native() -> Self {
        Self {
            domain: ClockDomain::Native,
            anchor: Instant::now(),
            last_compat: AtomicU64::new(0),
        }
    }

    /// Picks the preferred domain, falling back to native when the
    /// compatibility counter cannot be read.
    #[must_use]
    pub fn select(preferred: ClockDomain) -> Self {
        match preferred {
            ClockDomain::Native => Self::native(),
            ClockDomain::Compatibility => match system_filetime() {
                Some(_) => Self {
                    domain: ClockDomain::Compatibility,
                    anchor: Instant::now(),
                    last_compat: AtomicU64::new(0),
                },
                None => {
                    tracing::warn!("Compatibility clock unavailable, falling back to native clock");
                    Self::native()
                }
            },
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::native()
    }
}

impl TimestampSource for Clock {
    fn now(&self) -> Timestamp {
        match self.domain {
            ClockDomain::Native => {
                let micros = u64::try_from(self.anchor.elapsed().as_micros()).unwrap_or(u64::MAX - 1);
                Timestamp(micros + 1)
            }
            ClockDomain::Compatibility => {
                // The wall clock can step backwards; never hand out a smaller value.
                let sampled = system_filetime().unwrap_or(0);
                let previous = self.last_compat.fetch_max(sampled, Ordering::AcqRel);
                Timestamp(previous.max(sampled))
            }
        }
    }

    fn domain(&self) -> ClockDomain {
        self.domain
    }
}

fn system_filetime() -> Option<u64> {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let secs = since_epoch.as_secs().checked_add(FILETIME_UNIX_OFFSET_SECS)?;
    secs.checked_mul(FILETIME_TICKS_PER_SECOND)?
        .checked_add(u64::from(since_epoch.subsec_nanos() / 100))
}

/// A hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
    domain: ClockDomain,
}

impl ManualClock {
    /// A native-domain clock reading `start`.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self::with_domain(start, ClockDomain::Native)
    }

    /// A clock in an explicit domain.
    #[must_use]
    pub const fn with_domain(start: u64, domain: ClockDomain) -> Self {
        Self {
            ticks: AtomicU64::new(start),
            domain,
        }
    }

    /// Jumps to `ticks`.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }

    /// Moves forward by `ticks` and returns the new reading.
    pub fn advance(&self, ticks: u64) -> Timestamp {
        Timestamp(self.ticks.fetch_add(ticks, Ordering::AcqRel) + ticks)
    }
}

impl TimestampSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.ticks.load(Ordering::Acquire))
    }

    fn domain(&self) -> ClockDomain {
        self.domain
    }
}
