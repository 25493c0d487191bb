//! # Cooperative Scheduler
//!
//! Every fixed-cadence wait on the capture side goes through here: the
//! controller polling cadence and the idle backoff while the feature is
//! soft-toggled off.
//!
//! ```text
//!   ┌── pass ──┐┌──── pace(interval, elapsed) ────┐┌── pass ──┐
//!   │  work    ││  sleep(interval - elapsed)      ││  work    │
//!   └──────────┘└─────────────────────────────────┘└──────────┘
//! ```
//!
//! Tests swap in [`ManualScheduler`], which records waits and advances a
//! virtual clock instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of paced waits.
pub trait Scheduler: Send {
    /// Time since the scheduler was created.
    fn elapsed(&self) -> Duration;

    /// Sleeps out what is left of `interval` after `spent` of work.
    fn pace(&mut self, interval: Duration, spent: Duration);

    /// One idle-backoff wait.
    fn idle(&mut self, interval: Duration);
}

/// Wait statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Paced waits performed.
    pub paced: u64,
    /// Paced waits skipped because the pass overran its interval.
    pub overruns: u64,
    /// Idle waits performed.
    pub idles: u64,
}

/// Sleeps on the real clock.
#[derive(Debug)]
pub struct IntervalScheduler {
    origin: Instant,
    stats: SchedulerStats,
}

impl IntervalScheduler {
    /// A scheduler anchored now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            stats: SchedulerStats::default(),
        }
    }

    /// Returns wait statistics.
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for IntervalScheduler {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn pace(&mut self, interval: Duration, spent: Duration) {
        match interval.checked_sub(spent) {
            Some(remaining) if !remaining.is_zero() => {
                self.stats.paced += 1;
                std::thread::sleep(remaining);
            }
            _ => self.stats.overruns += 1,
        }
    }

    fn idle(&mut self, interval: Duration) {
        self.stats.idles += 1;
        std::thread::sleep(interval);
    }
}

/// Observable counters shared between a [`ManualScheduler`] and a test.
#[derive(Debug, Default)]
pub struct ManualSchedulerProbe {
    /// Virtual nanoseconds elapsed.
    pub elapsed_ns: AtomicU64,
    /// Paced waits requested.
    pub paced: AtomicU64,
    /// Idle waits requested.
    pub idles: AtomicU64,
}

type IdleHook = Box<dyn FnMut(u64) + Send>;

/// Virtual-time scheduler that never sleeps.
pub struct ManualScheduler {
    probe: Arc<ManualSchedulerProbe>,
    on_idle: Option<IdleHook>,
}

impl ManualScheduler {
    /// A scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            probe: Arc::new(ManualSchedulerProbe::default()),
            on_idle: None,
        }
    }

    /// Runs `hook` with the running idle count after every idle wait.
    #[must_use]
    pub fn with_idle_hook(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_idle = Some(Box::new(hook));
        self
    }

    /// Shared counters.
    #[must_use]
    pub fn probe(&self) -> Arc<ManualSchedulerProbe> {
        Arc::clone(&self.probe)
    }

    fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.probe.elapsed_ns.fetch_add(nanos, Ordering::AcqRel);
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("probe", &self.probe)
            .field("has_idle_hook", &self.on_idle.is_some())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.probe.elapsed_ns.load(Ordering::Acquire))
    }

    fn pace(&mut self, interval: Duration, spent: Duration) {
        self.probe.paced.fetch_add(1, Ordering::AcqRel);
        self.advance(interval.saturating_sub(spent));
    }

    fn idle(&mut self, interval: Duration) {
        let idles = self.probe.idles.fetch_add(1, Ordering::AcqRel) + 1;
        self.advance(interval);
        if let Some(hook) = self.on_idle.as_mut() {
            hook(idles);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_manual_scheduler_advances_virtual_time() {
        let mut scheduler = ManualScheduler::new();
        let probe = scheduler.probe();

        scheduler.pace(Duration::from_micros(500), Duration::from_micros(120));
        assert_eq!(scheduler.elapsed(), Duration::from_micros(380));

        scheduler.idle(Duration::from_millis(2000));
        assert_eq!(probe.idles.load(Ordering::Acquire), 1);
        assert_eq!(probe.paced.load(Ordering::Acquire), 1);
        assert_eq!(
            scheduler.elapsed(),
            Duration::from_micros(380) + Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_idle_hook_runs() {
        let flag = Arc::new(AtomicBool::new(false));
        let hook_flag = Arc::clone(&flag);
        let mut scheduler = ManualScheduler::new().with_idle_hook(move |n| {
            if n == 2 {
                hook_flag.store(true, Ordering::Release);
            }
        });
        scheduler.idle(Duration::from_millis(1));
        assert!(!flag.load(Ordering::Acquire));
        scheduler.idle(Duration::from_millis(1));
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_interval_scheduler_counts_overruns() {
        let mut scheduler = IntervalScheduler::new();
        scheduler.pace(Duration::from_micros(10), Duration::from_micros(50));
        scheduler.pace(Duration::from_micros(200), Duration::from_micros(100));
        assert_eq!(scheduler.stats().overruns, 1);
        assert_eq!(scheduler.stats().paced, 1);
    }
}
