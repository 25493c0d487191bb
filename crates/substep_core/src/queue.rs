//! # Input Queue
//!
//! Thread-safe FIFO between the capture threads and the frame thread.
//!
//! ## Architecture
//!
//! ```text
//!   Listener ────┐
//!   Controller ──┼──> push() ──> [Mutex<VecDeque>] ──> drain() ──> Step Builder
//!   Bridge ──────┘                 (O(1) append)        (once per frame)
//! ```
//!
//! The lock is held only for the push or the drain itself. No I/O, no
//! waiting and no simulation calls happen under it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::event::InputEvent;
use crate::time::{Timestamp, TimestampSource};

/// Which queued events belong to the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Only events at or before the frame start, read before the drain.
    #[default]
    Early,
    /// Everything queued, with the frame boundary read inside the drain.
    Late,
}

impl DrainPolicy {
    /// Maps the `late_cutoff` setting.
    #[must_use]
    pub const fn from_late_cutoff(late: bool) -> Self {
        if late {
            Self::Late
        } else {
            Self::Early
        }
    }

    /// User-facing explanation of the policy.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Early => {
                "Early cutoff: inputs are counted for a frame only if they happened before \
                 the frame started. Inputs that arrive while the frame is being prepared wait \
                 for the next frame. Timing is consistent from frame to frame."
            }
            Self::Late => {
                "Late cutoff: every input received up to the moment the frame is prepared is \
                 counted for that frame. Fewer inputs slip to the next frame, at the cost of \
                 including inputs that landed a hair after the frame nominally began."
            }
        }
    }
}

/// Counters for the queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Events pushed.
    pub pushed: AtomicU64,
    /// Events handed to the builder.
    pub drained: AtomicU64,
    /// Events thrown away by a flush.
    pub discarded: AtomicU64,
}

/// Plain copy of [`QueueStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    /// Events pushed.
    pub pushed: u64,
    /// Events handed to the builder.
    pub drained: u64,
    /// Events thrown away by a flush.
    pub discarded: u64,
}

/// Result of a frame drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Frame boundary used for this drain.
    pub boundary: Timestamp,
    /// Events in FIFO order.
    pub events: Vec<InputEvent>,
}

/// The shared FIFO of timestamped events.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: Mutex<VecDeque<InputEvent>>,
    stats: QueueStats,
}

impl InputQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty queue with room for `capacity` events before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: QueueStats::default(),
        }
    }

    /// Appends an event. Callable from any thread.
    pub fn push(&self, event: InputEvent) {
        self.events.lock().push_back(event);
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends several events under one lock acquisition.
    pub fn push_batch(&self, events: impl IntoIterator<Item = InputEvent>) {
        let mut queue = self.events.lock();
        let before = queue.len();
        queue.extend(events);
        let added = (queue.len() - before) as u64;
        drop(queue);
        self.stats.pushed.fetch_add(added, Ordering::Relaxed);
    }

    /// Takes events from the front while their timestamp is at or before
    /// `boundary`. Later events stay queued, as does anything behind them.
    pub fn drain_up_to(&self, boundary: Timestamp) -> Vec<InputEvent> {
        let mut queue = self.events.lock();
        let count = queue
            .iter()
            .take_while(|event| event.timestamp <= boundary)
            .count();
        let taken: Vec<InputEvent> = queue.drain(..count).collect();
        drop(queue);
        self.stats.drained.fetch_add(taken.len() as u64, Ordering::Relaxed);
        taken
    }

    /// Takes every queued event.
    pub fn drain_all(&self) -> Vec<InputEvent> {
        let taken: Vec<InputEvent> = self.events.lock().drain(..).collect();
        self.stats.drained.fetch_add(taken.len() as u64, Ordering::Relaxed);
        taken
    }

    /// Reads `clock` and takes every queued event inside one critical
    /// section, so nothing can land between the clock read and the drain.
    pub fn drain_all_stamped(&self, clock: &dyn TimestampSource) -> Drained {
        let mut queue = self.events.lock();
        let boundary = clock.now();
        let events: Vec<InputEvent> = queue.drain(..).collect();
        drop(queue);
        self.stats.drained.fetch_add(events.len() as u64, Ordering::Relaxed);
        Drained { boundary, events }
    }

    /// Drains according to `policy`.
    ///
    /// `frame_start` is the timestamp captured at the start of the frame; it
    /// is the boundary for [`DrainPolicy::Early`] and ignored for
    /// [`DrainPolicy::Late`].
    pub fn drain(
        &self,
        policy: DrainPolicy,
        frame_start: Timestamp,
        clock: &dyn TimestampSource,
    ) -> Drained {
        match policy {
            DrainPolicy::Early => Drained {
                boundary: frame_start,
                events: self.drain_up_to(frame_start),
            },
            DrainPolicy::Late => self.drain_all_stamped(clock),
        }
    }

    /// Throws away everything queued.
    pub fn clear(&self) {
        let mut queue = self.events.lock();
        let discarded = queue.len() as u64;
        queue.clear();
        drop(queue);
        self.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            drained: self.stats.drained.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
        }
    }
}
