//! # Shared Ring
//!
//! The cross-process transport: a small file mapped by both the host and
//! the helper.
//!
//! ```text
//!   ┌──────────────────────── header (32 bytes) ────────────────────────┐
//!   │ magic u32 │ version u32 │ lock u64 │ host_pid u32 │ host_held u32 │ reserved │
//!   ├───────────────────────────────────────────────────────────────────┤
//!   │ 20 × BridgeRecord (17 bytes, packed)                              │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock Word
//!
//! `lock` is 0 when free, otherwise the holder's token: its pid in the high
//! half and a per-handle number in the low half. Acquisition spins on a
//! compare-exchange until the timeout. A lock held by a process that no
//! longer exists is stolen.
//!
//! ## Watchdog
//!
//! The host publishes its pid and sets `host_held` while it is running.
//! The helper waits until the flag drops or the pid disappears and then
//! exits.

// SAFETY: This module dereferences pointers into a shared file mapping.
// The mapping is created with `SEGMENT_SIZE` bytes and validated before use,
// so every offset computed here is in bounds. The header is only accessed
// through atomics. Record slots are only touched while the lock word holds
// this handle's token.
#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use memmap2::MmapRaw;

use crate::channel::{drain_slots, push_slots, BoundedChannel, PushOutcome};
use crate::error::{BridgeError, BridgeResult};
use crate::record::{BridgeRecord, BUFFER_SIZE, RECORD_SIZE};

/// Identifies a bridge segment.
pub const SEGMENT_MAGIC: u32 = 0x5342_5247; // "SBRG"

/// Segment layout version.
pub const SEGMENT_VERSION: u32 = 1;

/// Header bytes before the first slot.
pub const HEADER_SIZE: usize = 32;

/// Total segment size.
pub const SEGMENT_SIZE: usize = HEADER_SIZE + BUFFER_SIZE * RECORD_SIZE;

/// Default segment file name under the runtime directory.
pub const DEFAULT_SEGMENT_NAME: &str = "substep-bridge.shm";

#[repr(C)]
struct SegmentHeader {
    magic: AtomicU32,
    version: AtomicU32,
    lock: AtomicU64,
    host_pid: AtomicU32,
    host_held: AtomicU32,
    _reserved: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() == HEADER_SIZE);

static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Result of a bounded lock wait.
#[derive(Debug)]
pub enum LockOutcome<G> {
    /// The lock is held until the guard drops.
    Acquired(G),
    /// The wait ran out; try again next poll.
    TimedOut,
}

/// Whether `pid` names a running process. Without `/proc` every process
/// counts as alive.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.is_dir() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

/// Overrides [`default_segment_path`] when set.
pub const SEGMENT_PATH_ENV: &str = "SUBSTEP_BRIDGE_SEGMENT";

/// Location of the segment file both processes agree on:
/// `$SUBSTEP_BRIDGE_SEGMENT`, else the runtime directory, else the temp
/// directory.
#[must_use]
pub fn default_segment_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SEGMENT_PATH_ENV) {
        return PathBuf::from(path);
    }
    std::env::var_os("XDG_RUNTIME_DIR")
        .map_or_else(std::env::temp_dir, PathBuf::from)
        .join(DEFAULT_SEGMENT_NAME)
}

struct Segment {
    map: MmapRaw,
    path: PathBuf,
    token: u64,
}

impl Segment {
    fn header(&self) -> &SegmentHeader {
        // SAFETY: The mapping is at least HEADER_SIZE bytes and page aligned,
        // which satisfies the alignment of the header's atomics. Concurrent
        // writers only use atomic operations on it.
        unsafe { &*self.map.as_ptr().cast::<SegmentHeader>() }
    }

    fn slot_ptr(&self, index: usize) -> *mut BridgeRecord {
        debug_assert!(index < BUFFER_SIZE);
        // SAFETY: HEADER_SIZE + index * RECORD_SIZE + RECORD_SIZE <= SEGMENT_SIZE
        // for every index below BUFFER_SIZE.
        unsafe {
            self.map
                .as_mut_ptr()
                .add(HEADER_SIZE + index * RECORD_SIZE)
                .cast::<BridgeRecord>()
        }
    }

    fn check_header(&self) -> BridgeResult<()> {
        let header = self.header();
        let magic = header.magic.load(Ordering::Acquire);
        let version = header.version.load(Ordering::Acquire);
        if magic != SEGMENT_MAGIC || version != SEGMENT_VERSION {
            return Err(BridgeError::CorruptHeader(format!(
                "{}: magic {magic:#x} version {version}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Lock on the record slots. Releases on drop.
pub struct SlotGuard<'a> {
    segment: &'a Segment,
}

impl SlotGuard<'_> {
    /// Copies every slot out.
    #[must_use]
    pub fn load(&self) -> [BridgeRecord; BUFFER_SIZE] {
        let mut slots = [BridgeRecord::EMPTY; BUFFER_SIZE];
        for (index, slot) in slots.iter_mut().enumerate() {
            // SAFETY: In bounds per `slot_ptr`; BridgeRecord has alignment 1
            // and is Pod, so any byte pattern is a valid value. The lock
            // excludes concurrent writers.
            *slot = unsafe { self.segment.slot_ptr(index).read_volatile() };
        }
        slots
    }

    /// Writes every slot back.
    pub fn store(&self, slots: &[BridgeRecord; BUFFER_SIZE]) {
        for (index, slot) in slots.iter().enumerate() {
            // SAFETY: As in `load`; the lock excludes concurrent readers.
            unsafe { self.segment.slot_ptr(index).write_volatile(*slot) };
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let _ = self.segment.header().lock.compare_exchange(
            self.segment.token,
            0,
            Ordering::Release,
            Ordering::Relaxed,
        );
    }
}

/// Releases the host's watchdog flag on drop.
pub struct WatchdogHold {
    segment: Arc<Segment>,
}

impl Drop for WatchdogHold {
    fn drop(&mut self) {
        self.segment.header().host_held.store(0, Ordering::Release);
        tracing::debug!("Released bridge watchdog");
    }
}

impl std::fmt::Debug for WatchdogHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogHold")
            .field("path", &self.segment.path)
            .finish()
    }
}

/// A handle on the shared segment. Cheap to clone; clones share the lock
/// token.
#[derive(Clone)]
pub struct SharedRing {
    segment: Arc<Segment>,
}

impl SharedRing {
    /// Creates or resets the segment at `path`. Called by the host before
    /// it starts the helper.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Segment`] if the file cannot be created or mapped.
    pub fn create(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| segment_error(path, &e))?;
        file.set_len(SEGMENT_SIZE as u64)
            .map_err(|e| segment_error(path, &e))?;

        let ring = Self::map(&file, path)?;
        {
            let header = ring.segment.header();
            header.lock.store(0, Ordering::Relaxed);
            header.host_pid.store(0, Ordering::Relaxed);
            header.host_held.store(0, Ordering::Relaxed);
            header.version.store(SEGMENT_VERSION, Ordering::Relaxed);
            header.magic.store(SEGMENT_MAGIC, Ordering::Release);
        }
        tracing::info!("Created bridge segment at {}", path.display());
        Ok(ring)
    }

    /// Opens an existing segment. Called by the helper.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Segment`] if the file cannot be opened and
    /// [`BridgeError::CorruptHeader`] if it is not a bridge segment.
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| segment_error(path, &e))?;
        let len = file.metadata().map_err(|e| segment_error(path, &e))?.len();
        if len != SEGMENT_SIZE as u64 {
            return Err(BridgeError::CorruptHeader(format!(
                "{}: {len} bytes, expected {SEGMENT_SIZE}",
                path.display()
            )));
        }
        let ring = Self::map(&file, path)?;
        ring.segment.check_header()?;
        Ok(ring)
    }

    fn map(file: &File, path: &Path) -> BridgeResult<Self> {
        let map = MmapRaw::map_raw(file).map_err(|e| segment_error(path, &e))?;
        if map.len() < SEGMENT_SIZE {
            return Err(BridgeError::CorruptHeader(format!(
                "{}: mapped {} bytes",
                path.display(),
                map.len()
            )));
        }
        let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        let token = (u64::from(std::process::id()) << 32) | u64::from(handle);
        Ok(Self {
            segment: Arc::new(Segment {
                map,
                path: path.to_path_buf(),
                token,
            }),
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.segment.path
    }

    /// Acquires the slot lock within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CorruptHeader`] if the segment was
    /// overwritten, or [`BridgeError::LockFailed`] if this handle already
    /// holds the lock.
    pub fn lock(&self, timeout: Duration) -> BridgeResult<LockOutcome<SlotGuard<'_>>> {
        let segment = &*self.segment;
        segment.check_header()?;
        let lock = &segment.header().lock;
        let started = Instant::now();

        loop {
            match lock.compare_exchange(0, segment.token, Ordering::Acquire, Ordering::Acquire) {
                Ok(_) => return Ok(LockOutcome::Acquired(SlotGuard { segment })),
                Err(holder) if holder == segment.token => {
                    return Err(BridgeError::LockFailed(format!(
                        "{} already held by this handle",
                        segment.path.display()
                    )));
                }
                Err(holder) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let holder_pid = (holder >> 32) as u32;
                    if !process_alive(holder_pid)
                        && lock
                            .compare_exchange(holder, 0, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    {
                        tracing::warn!("Recovered bridge lock left by dead process {}", holder_pid);
                        continue;
                    }
                }
            }
            if started.elapsed() >= timeout {
                return Ok(LockOutcome::TimedOut);
            }
            thread::yield_now();
        }
    }

    /// Marks the host as running. The helper exits once the returned hold
    /// drops or this process dies.
    #[must_use]
    pub fn hold_watchdog(&self) -> WatchdogHold {
        let header = self.segment.header();
        header.host_pid.store(std::process::id(), Ordering::Relaxed);
        header.host_held.store(1, Ordering::Release);
        tracing::debug!("Holding bridge watchdog");
        WatchdogHold {
            segment: Arc::clone(&self.segment),
        }
    }

    /// Whether the host still holds the watchdog.
    #[must_use]
    pub fn host_alive(&self) -> bool {
        let header = self.segment.header();
        header.host_held.load(Ordering::Acquire) == 1
            && process_alive(header.host_pid.load(Ordering::Acquire))
    }

    /// Blocks until the host releases the watchdog or dies, checking every
    /// `poll`.
    pub fn wait_for_host_exit(&self, poll: Duration) {
        while self.host_alive() {
            thread::sleep(poll);
        }
    }
}

impl BoundedChannel for SharedRing {
    fn try_push(&self, record: BridgeRecord, timeout: Duration) -> BridgeResult<PushOutcome> {
        Ok(match self.lock(timeout)? {
            LockOutcome::Acquired(guard) => {
                let mut slots = guard.load();
                let outcome = push_slots(&mut slots, record);
                if outcome == PushOutcome::Stored {
                    guard.store(&slots);
                }
                outcome
            }
            LockOutcome::TimedOut => PushOutcome::TimedOut,
        })
    }

    fn drain(&self, timeout: Duration) -> BridgeResult<Option<Vec<BridgeRecord>>> {
        Ok(match self.lock(timeout)? {
            LockOutcome::Acquired(guard) => {
                let mut slots = guard.load();
                let taken = drain_slots(&mut slots);
                if !taken.is_empty() {
                    guard.store(&slots);
                }
                Some(taken)
            }
            LockOutcome::TimedOut => None,
        })
    }

    fn mark_no_devices(&self, timeout: Duration) -> BridgeResult<bool> {
        Ok(match self.lock(timeout)? {
            LockOutcome::Acquired(guard) => {
                let mut slots = guard.load();
                slots[0] = BridgeRecord::NO_DEVICES;
                guard.store(&slots);
                true
            }
            LockOutcome::TimedOut => false,
        })
    }

    fn peek_no_devices(&self, timeout: Duration) -> BridgeResult<Option<bool>> {
        Ok(match self.lock(timeout)? {
            LockOutcome::Acquired(guard) => Some(guard.load()[0].is_no_devices()),
            LockOutcome::TimedOut => None,
        })
    }
}

impl std::fmt::Debug for SharedRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRing")
            .field("path", &self.segment.path)
            .field("token", &format_args!("{:#x}", self.segment.token))
            .finish()
    }
}

fn segment_error(path: &Path, error: &std::io::Error) -> BridgeError {
    BridgeError::Segment {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}
