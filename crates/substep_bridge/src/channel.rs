//! # Bounded Channel With Timeout
//!
//! The transport seam between the helper and the host. Every operation
//! takes the shared lock with a bounded wait; running out of time is a
//! normal outcome, never an error.
//!
//! ```text
//!   helper ──try_push──> [ slot 0 | slot 1 | ... | slot 19 ] ──drain──> host
//!                          └─ first empty slot ends the data
//! ```
//!
//! [`LocalRing`] keeps the slots in process memory and is what tests and
//! single-process hosts use. [`SharedRing`](crate::shared::SharedRing)
//! keeps them in a mapped file shared with the helper.

use std::time::Duration;

use parking_lot::Mutex;

use crate::error::BridgeResult;
use crate::record::{first_free, valid_prefix, BridgeRecord, BUFFER_SIZE};

/// Result of a push attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Written into a free slot.
    Stored,
    /// Every slot is occupied; the record was dropped.
    Full,
    /// The lock was not acquired in time; the record was dropped.
    TimedOut,
}

/// A fixed-capacity record channel gated by a timed lock.
pub trait BoundedChannel: Send + Sync {
    /// Writes `record` into the first free slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired at all.
    fn try_push(&self, record: BridgeRecord, timeout: Duration) -> BridgeResult<PushOutcome>;

    /// Takes every valid record and empties the slots. `Ok(None)` means
    /// the lock was busy for the whole timeout.
    ///
    /// A no-devices marker in slot 0 is left in place and not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired at all.
    fn drain(&self, timeout: Duration) -> BridgeResult<Option<Vec<BridgeRecord>>>;

    /// Replaces slot 0 with the no-devices marker. Returns `false` on timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired at all.
    fn mark_no_devices(&self, timeout: Duration) -> BridgeResult<bool>;

    /// Whether slot 0 holds the no-devices marker. `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired at all.
    fn peek_no_devices(&self, timeout: Duration) -> BridgeResult<Option<bool>>;
}

/// Push into a slot array under the caller's lock.
pub(crate) fn push_slots(slots: &mut [BridgeRecord], record: BridgeRecord) -> PushOutcome {
    match first_free(slots) {
        Some(index) => {
            slots[index] = record;
            PushOutcome::Stored
        }
        None => PushOutcome::Full,
    }
}

/// Drain a slot array under the caller's lock.
pub(crate) fn drain_slots(slots: &mut [BridgeRecord]) -> Vec<BridgeRecord> {
    let marker = slots.first().is_some_and(BridgeRecord::is_no_devices);
    let start = usize::from(marker);
    let taken = valid_prefix(&slots[start..]).to_vec();
    for slot in &mut slots[start..] {
        *slot = BridgeRecord::EMPTY;
    }
    taken
}

/// In-process ring behind a `parking_lot` mutex.
#[derive(Debug)]
pub struct LocalRing {
    slots: Mutex<[BridgeRecord; BUFFER_SIZE]>,
}

impl LocalRing {
    /// An empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([BridgeRecord::EMPTY; BUFFER_SIZE]),
        }
    }
}

impl Default for LocalRing {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedChannel for LocalRing {
    fn try_push(&self, record: BridgeRecord, timeout: Duration) -> BridgeResult<PushOutcome> {
        Ok(match self.slots.try_lock_for(timeout) {
            Some(mut slots) => push_slots(&mut slots[..], record),
            None => PushOutcome::TimedOut,
        })
    }

    fn drain(&self, timeout: Duration) -> BridgeResult<Option<Vec<BridgeRecord>>> {
        Ok(self
            .slots
            .try_lock_for(timeout)
            .map(|mut slots| drain_slots(&mut slots[..])))
    }

    fn mark_no_devices(&self, timeout: Duration) -> BridgeResult<bool> {
        Ok(match self.slots.try_lock_for(timeout) {
            Some(mut slots) => {
                slots[0] = BridgeRecord::NO_DEVICES;
                true
            }
            None => false,
        })
    }

    fn peek_no_devices(&self, timeout: Duration) -> BridgeResult<Option<bool>> {
        Ok(self
            .slots
            .try_lock_for(timeout)
            .map(|slots| slots[0].is_no_devices()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use substep_capture::DeviceClass;

    const WAIT: Duration = Duration::from_millis(5);

    fn key(time: u64, value: i32) -> BridgeRecord {
        BridgeRecord::new(time, 1, 30, value, DeviceClass::Keyboard)
    }

    #[test]
    fn test_push_then_drain_preserves_order() {
        let ring = LocalRing::new();
        for i in 0..5 {
            assert_eq!(ring.try_push(key(i, 1), WAIT).unwrap(), PushOutcome::Stored);
        }
        let drained = ring.drain(WAIT).unwrap().unwrap();
        let times: Vec<u64> = drained.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0, 1, 2, 3, 4]);
        assert!(ring.drain(WAIT).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_full_ring_drops_records() {
        let ring = LocalRing::new();
        for i in 0..BUFFER_SIZE as u64 {
            assert_eq!(ring.try_push(key(i, 1), WAIT).unwrap(), PushOutcome::Stored);
        }
        assert_eq!(ring.try_push(key(99, 1), WAIT).unwrap(), PushOutcome::Full);
        assert_eq!(ring.drain(WAIT).unwrap().unwrap().len(), BUFFER_SIZE);
        assert_eq!(ring.try_push(key(99, 1), WAIT).unwrap(), PushOutcome::Stored);
    }

    #[test]
    fn test_busy_lock_times_out_without_error() {
        let ring = Arc::new(LocalRing::new());
        let guard = ring.slots.lock();
        let other = Arc::clone(&ring);
        let (push, drain) = thread::spawn(move || {
            (
                other.try_push(key(1, 1), Duration::from_millis(1)).unwrap(),
                other.drain(Duration::from_millis(1)).unwrap(),
            )
        })
        .join()
        .unwrap();
        drop(guard);
        assert_eq!(push, PushOutcome::TimedOut);
        assert!(drain.is_none());
    }

    #[test]
    fn test_marker_survives_drain() {
        let ring = LocalRing::new();
        assert_eq!(ring.peek_no_devices(WAIT).unwrap(), Some(false));
        assert!(ring.mark_no_devices(WAIT).unwrap());
        assert!(ring.drain(WAIT).unwrap().unwrap().is_empty());
        assert_eq!(ring.peek_no_devices(WAIT).unwrap(), Some(true));
    }
}
