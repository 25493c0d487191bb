//! # Bridge Helper
//!
//! The helper-process side: reads physical devices and writes their key
//! and controller events into the channel, one record per free slot.
//!
//! ```text
//!   DeviceHub ──DeviceEvent──> record_for ──try_push──> channel
//!       ▲                                                  (1s lock wait)
//!       ├── rescan on /dev/input change notification (hot-plug)
//!       └── rescan every `rescan_interval` (fallback)
//! ```
//!
//! With no usable device at startup the helper writes the no-devices
//! marker and returns, so the host can tell the user instead of silently
//! receiving nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use input_linux_sys::{EV_ABS, EV_KEY};
use substep_capture::evdev::{scan_code_from_evdev, DeviceEvent};
use substep_capture::{DeviceClass, DeviceHub, HubConfig};
use substep_core::Scheduler;

use crate::channel::{BoundedChannel, PushOutcome};
use crate::codes::{record_time, MOUSE_CODE_OFFSET};
use crate::error::{BridgeError, BridgeResult};
use crate::record::BridgeRecord;
use crate::shared::SharedRing;

/// Key value the kernel uses for auto-repeat.
const KEY_REPEAT: i32 = 2;

/// Helper tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelperConfig {
    /// Device discovery.
    pub hub: HubConfig,
    /// Lock wait per written record.
    pub lock_timeout: Duration,
    /// Cadence of the forwarding loop.
    pub pass_interval: Duration,
    /// Cadence of full rescans on top of change notification.
    pub rescan_interval: Duration,
}

impl HelperConfig {
    /// Real devices with production timings.
    #[must_use]
    pub fn system() -> Self {
        Self {
            hub: HubConfig::system(),
            lock_timeout: Duration::from_millis(1000),
            pass_interval: Duration::from_millis(1),
            rescan_interval: Duration::from_secs(1),
        }
    }
}

/// Why the helper loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelperExit {
    /// No usable device was found; the marker was written.
    NoDevices,
    /// The stop flag was raised.
    Stopped,
}

/// Forwarding counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HelperStats {
    /// Records stored in the channel.
    pub written: u64,
    /// Records dropped because every slot was taken.
    pub full: u64,
    /// Records dropped on lock timeout.
    pub timed_out: u64,
    /// Device events that are not forwarded.
    pub filtered: u64,
}

/// The record a device event is forwarded as, if any.
///
/// Key events except auto-repeat are forwarded from every device, absolute
/// axes only from controllers. Keyboard codes become scan codes; mouse and
/// touchpad buttons are offset by [`MOUSE_CODE_OFFSET`].
#[must_use]
pub fn record_for(message: &DeviceEvent) -> Option<BridgeRecord> {
    let event = &message.event;
    let class = message.device.class;
    let code = match (i32::from(event.kind), class) {
        (EV_KEY, _) if event.value == KEY_REPEAT => return None,
        (EV_KEY, DeviceClass::Keyboard) => scan_code_from_evdev(event.code),
        (EV_KEY, DeviceClass::Mouse | DeviceClass::Touchpad) => {
            event.code.wrapping_add(MOUSE_CODE_OFFSET)
        }
        (EV_KEY, DeviceClass::Touchscreen | DeviceClass::Controller)
        | (EV_ABS, DeviceClass::Controller) => event.code,
        _ => return None,
    };
    Some(BridgeRecord::new(
        record_time(event.tv_sec, event.tv_usec),
        event.kind,
        code,
        event.value,
        class,
    ))
}

/// Helper-side writer.
pub struct BridgeHelper {
    channel: Arc<dyn BoundedChannel>,
    hub: DeviceHub,
    events: Receiver<DeviceEvent>,
    config: HelperConfig,
    stats: HelperStats,
}

impl BridgeHelper {
    /// A helper writing into `channel`. Opens nothing yet.
    #[must_use]
    pub fn new(channel: Arc<dyn BoundedChannel>, config: HelperConfig) -> Self {
        let hub = DeviceHub::new(config.hub.clone());
        let events = hub.events();
        Self {
            channel,
            hub,
            events,
            config,
            stats: HelperStats::default(),
        }
    }

    /// Opens the initial device set. Returns `false`, after writing the
    /// no-devices marker, if nothing usable was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel rejects the marker outright.
    pub fn start(&mut self) -> BridgeResult<bool> {
        match self.hub.rescan() {
            Ok(_) if self.hub.device_count() > 0 => {
                tracing::info!("Bridge helper forwarding {} devices", self.hub.device_count());
                return Ok(true);
            }
            Ok(_) => tracing::error!(
                "No accessible input devices under {}",
                self.config.hub.dev_root.display()
            ),
            Err(e) => tracing::error!("Failed to enumerate input devices: {}", e),
        }
        if !self.channel.mark_no_devices(self.config.lock_timeout)? {
            tracing::warn!("Timed out writing the no-devices marker");
        }
        Ok(false)
    }

    /// Forwards every pending device event. Returns how many were stored.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CorruptHeader`] if the channel is no longer
    /// usable. Other lock failures are logged and the record dropped.
    pub fn pump(&mut self) -> BridgeResult<usize> {
        let events = self.events.clone();
        let mut stored = 0;
        for message in events.try_iter() {
            let Some(record) = record_for(&message) else {
                self.stats.filtered += 1;
                continue;
            };
            match self.channel.try_push(record, self.config.lock_timeout) {
                Ok(PushOutcome::Stored) => {
                    self.stats.written += 1;
                    stored += 1;
                }
                Ok(PushOutcome::Full) => {
                    self.stats.full += 1;
                    tracing::debug!("Bridge ring full, dropped {:?}", record);
                }
                Ok(PushOutcome::TimedOut) => {
                    self.stats.timed_out += 1;
                    tracing::debug!("Bridge lock busy, dropped {:?}", record);
                }
                Err(e @ BridgeError::CorruptHeader(_)) => return Err(e),
                Err(e) => tracing::error!("Failed to acquire bridge lock: {}", e),
            }
        }
        Ok(stored)
    }

    /// Picks up added and removed devices.
    pub fn rescan(&mut self) {
        if let Err(e) = self.hub.rescan() {
            tracing::error!("Device rescan failed: {}", e);
        }
    }

    /// Rescans if the device directory reported a change.
    pub fn poll_hotplug(&mut self) {
        match self.hub.poll_hotplug() {
            Ok(Some(report)) if !report.added.is_empty() => tracing::info!(
                "Bridge helper forwarding {} devices after hot-plug",
                self.hub.device_count()
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("Device rescan failed: {}", e),
        }
    }

    /// Runs until `stop` is raised, or returns at once if there are no
    /// devices.
    ///
    /// # Errors
    ///
    /// See [`BridgeHelper::start`] and [`BridgeHelper::pump`].
    pub fn run(&mut self, scheduler: &mut dyn Scheduler, stop: &AtomicBool) -> BridgeResult<HelperExit> {
        if !self.start()? {
            return Ok(HelperExit::NoDevices);
        }

        let mut next_rescan = scheduler.elapsed() + self.config.rescan_interval;
        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            self.pump()?;
            scheduler.pace(self.config.pass_interval, started.elapsed());

            if scheduler.elapsed() >= next_rescan {
                self.rescan();
                next_rescan = scheduler.elapsed() + self.config.rescan_interval;
            } else {
                self.poll_hotplug();
            }
        }

        tracing::info!(
            "Bridge helper stopping: {} written, {} full, {} timed out",
            self.stats.written,
            self.stats.full,
            self.stats.timed_out
        );
        Ok(HelperExit::Stopped)
    }

    /// Open devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.hub.device_count()
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> HelperStats {
        self.stats
    }
}

impl std::fmt::Debug for BridgeHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHelper")
            .field("hub", &self.hub)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Raises `stop` once the host releases its watchdog or dies.
///
/// The watcher thread is detached: it blocks until the host goes away,
/// which may outlive a helper that already returned.
///
/// # Errors
///
/// Returns [`BridgeError::Capture`] if the thread cannot be spawned.
pub fn watch_host(ring: SharedRing, poll: Duration, stop: Arc<AtomicBool>) -> BridgeResult<()> {
    thread::Builder::new()
        .name("substep-bridge-watchdog".into())
        .spawn(move || {
            ring.wait_for_host_exit(poll);
            tracing::info!("Host released the bridge, shutting down");
            stop.store(true, Ordering::Release);
        })
        .map(|_| ())
        .map_err(|e| substep_capture::CaptureError::Spawn(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalRing;
    use std::path::PathBuf;
    use input_linux_sys::{BTN_LEFT, EV_REL};
    use substep_capture::evdev::{DeviceInfo, EvdevEvent};
    use substep_core::ManualScheduler;

    fn message(class: DeviceClass, kind: i32, code: i32, value: i32) -> DeviceEvent {
        DeviceEvent {
            device: Arc::new(DeviceInfo {
                node: "event0".into(),
                path: PathBuf::from("/dev/input/event0"),
                name: "Fake".into(),
                bus: 3,
                class,
                has_relative: class == DeviceClass::Mouse,
            }),
            event: EvdevEvent {
                tv_sec: 1,
                tv_usec: 2,
                kind: u16::try_from(kind).unwrap(),
                code: u16::try_from(code).unwrap(),
                value,
            },
        }
    }

    #[test]
    fn test_record_for_filters_and_remaps() {
        let key = record_for(&message(DeviceClass::Keyboard, EV_KEY, 103, 1)).unwrap();
        assert_eq!({ key.code }, 0xE048);
        assert_eq!({ key.time }, record_time(1, 2));
        assert_eq!(key.device_class(), DeviceClass::Keyboard);

        let click = record_for(&message(DeviceClass::Mouse, EV_KEY, BTN_LEFT, 1)).unwrap();
        assert_eq!(i32::from(click.code), i32::from(MOUSE_CODE_OFFSET) + BTN_LEFT);

        let stick = record_for(&message(DeviceClass::Controller, EV_ABS, 0, -30_000)).unwrap();
        assert_eq!({ stick.value }, -30_000);

        assert!(record_for(&message(DeviceClass::Keyboard, EV_KEY, 30, KEY_REPEAT)).is_none());
        assert!(record_for(&message(DeviceClass::Touchpad, EV_ABS, 0, 100)).is_none());
        assert!(record_for(&message(DeviceClass::Mouse, EV_REL, 0, 5)).is_none());
    }

    #[test]
    fn test_no_devices_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dev")).unwrap();
        let ring = Arc::new(LocalRing::new());
        let config = HelperConfig {
            hub: HubConfig {
                dev_root: dir.path().join("dev"),
                sys_root: dir.path().join("sys"),
                physical_only: true,
                read_batch: 4,
            },
            ..HelperConfig::system()
        };
        let mut helper = BridgeHelper::new(Arc::clone(&ring) as Arc<dyn BoundedChannel>, config);
        let stop = AtomicBool::new(false);
        let exit = helper.run(&mut ManualScheduler::new(), &stop).unwrap();

        assert_eq!(exit, HelperExit::NoDevices);
        assert_eq!(ring.peek_no_devices(Duration::from_millis(5)).unwrap(), Some(true));
    }

    #[test]
    fn test_missing_device_directory_counts_as_no_devices() {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(LocalRing::new());
        let config = HelperConfig {
            hub: HubConfig {
                dev_root: dir.path().join("absent"),
                sys_root: dir.path().join("sys"),
                physical_only: true,
                read_batch: 4,
            },
            ..HelperConfig::system()
        };
        let mut helper = BridgeHelper::new(Arc::clone(&ring) as Arc<dyn BoundedChannel>, config);
        assert!(!helper.start().unwrap());
        assert_eq!(ring.peek_no_devices(Duration::from_millis(5)).unwrap(), Some(true));
    }
}
