//! # Device Hub
//!
//! Owns one reader thread per open device node and fans their events into
//! a single channel.
//!
//! ```text
//!   event0 ──reader──┐
//!   event3 ──reader──┼──> Sender<DeviceEvent> ──> consumer
//!   event7 ──reader──┘
//! ```
//!
//! Hot-plug: the first rescan starts a [`DeviceWatcher`] on the device
//! directory, and [`DeviceHub::poll_hotplug`] rescans as soon as it reports
//! a change. A plain [`DeviceHub::rescan`] on the caller's cadence remains
//! the fallback for directories that cannot be watched. New nodes are
//! probed and opened, vanished nodes and dead readers are dropped. Nodes
//! that disappear mid-probe or are not yet readable are skipped without
//! logging; the next rescan picks them up.
//!
//! Nodes are opened non-blocking and readers wait in `poll` with a short
//! timeout, so a stopped reader exits without its device producing
//! anything. Dropping a device, or the hub, stops and joins its reader,
//! which closes the node.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::abi::wait_readable;
use super::watch::DeviceWatcher;
use super::{
    decode_events, is_physical_bus, probe_device, DeviceClass, DeviceInfo, EvdevEvent,
    INPUT_EVENT_SIZE,
};
use crate::error::{CaptureError, CaptureResult};

/// Where to find devices and which to accept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Directory holding `event*` nodes.
    pub dev_root: PathBuf,
    /// Directory holding one sysfs entry per node.
    pub sys_root: PathBuf,
    /// Accept only USB, Bluetooth and PS/2 devices.
    pub physical_only: bool,
    /// Events read per syscall.
    pub read_batch: usize,
}

impl HubConfig {
    /// The live system paths.
    #[must_use]
    pub fn system() -> Self {
        Self {
            dev_root: PathBuf::from("/dev/input"),
            sys_root: PathBuf::from("/sys/class/input"),
            physical_only: true,
            read_batch: 64,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::system()
    }
}

/// One event from one device.
#[derive(Clone, Debug)]
pub struct DeviceEvent {
    /// The device it came from.
    pub device: Arc<DeviceInfo>,
    /// The kernel event.
    pub event: EvdevEvent,
}

/// What a rescan changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Nodes opened.
    pub added: Vec<String>,
    /// Nodes dropped.
    pub removed: Vec<String>,
}

/// How long a reader waits for input before checking its stop flag.
const READ_POLL: Duration = Duration::from_millis(50);

struct OpenDevice {
    info: Arc<DeviceInfo>,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Drop for OpenDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::error!("Reader for {} panicked", self.info.node);
            }
        }
    }
}

/// Open input devices and their reader threads.
pub struct DeviceHub {
    config: HubConfig,
    open: HashMap<String, OpenDevice>,
    rejected: HashSet<String>,
    watcher: Option<DeviceWatcher>,
    tx: Sender<DeviceEvent>,
    rx: Receiver<DeviceEvent>,
}

impl DeviceHub {
    /// A hub with nothing open yet.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            config,
            open: HashMap::new(),
            rejected: HashSet::new(),
            watcher: None,
            tx,
            rx,
        }
    }

    /// Receiving end of the fan-in channel.
    #[must_use]
    pub fn events(&self) -> Receiver<DeviceEvent> {
        self.rx.clone()
    }

    /// Number of open devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.open.len()
    }

    /// Open devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<DeviceInfo>> {
        self.open.values().map(|d| Arc::clone(&d.info)).collect()
    }

    /// Whether change notification is active on the device directory.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Rescans if the device directory changed since the last call.
    /// Returns `None` when nothing changed or nothing is being watched.
    ///
    /// # Errors
    ///
    /// See [`DeviceHub::rescan`].
    pub fn poll_hotplug(&mut self) -> CaptureResult<Option<RescanReport>> {
        if !self.watcher.as_mut().is_some_and(DeviceWatcher::changed) {
            return Ok(None);
        }
        self.rescan().map(Some)
    }

    /// Syncs the open set with the device directory. Starts watching the
    /// directory if that is not already happening.
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceIo`] if the device directory cannot be listed.
    pub fn rescan(&mut self) -> CaptureResult<RescanReport> {
        if self.watcher.is_none() {
            match DeviceWatcher::new(&self.config.dev_root) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => tracing::debug!(
                    "Not watching {} for hot-plug: {}",
                    self.config.dev_root.display(),
                    e
                ),
            }
        }

        let entries = std::fs::read_dir(&self.config.dev_root).map_err(|e| CaptureError::DeviceIo {
            path: self.config.dev_root.display().to_string(),
            reason: e.to_string(),
        })?;

        let present: HashSet<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("event"))
            .collect();

        let mut report = RescanReport::default();

        let gone: Vec<String> = self
            .open
            .iter()
            .filter(|(node, device)| !present.contains(*node) || !device.alive.load(Ordering::Acquire))
            .map(|(node, _)| node.clone())
            .collect();
        for node in gone {
            if let Some(device) = self.open.remove(&node) {
                tracing::info!("Input device removed: {} \"{}\"", node, device.info.name);
            }
            report.removed.push(node);
        }
        self.rejected.retain(|node| present.contains(node));

        let mut fresh: Vec<&String> = present
            .iter()
            .filter(|node| !self.open.contains_key(*node) && !self.rejected.contains(*node))
            .collect();
        fresh.sort();

        let mut opened = Vec::new();
        let mut rejected = Vec::new();
        for node in fresh {
            match self.open_device(node) {
                Ok(Some(device)) => {
                    tracing::info!(
                        "Input device added: {} \"{}\" ({:?})",
                        node,
                        device.info.name,
                        device.info.class
                    );
                    opened.push((node.clone(), device));
                }
                Ok(None) => rejected.push(node.clone()),
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {}
                Err(e) => tracing::warn!("Failed to open input device {}: {}", node, e),
            }
        }

        for (node, device) in opened {
            report.added.push(node.clone());
            self.open.insert(node, device);
        }
        self.rejected.extend(rejected);

        Ok(report)
    }

    fn open_device(&self, node: &str) -> std::io::Result<Option<OpenDevice>> {
        let info = probe_device(&self.config.sys_root, &self.config.dev_root, node)?;

        if self.config.physical_only && !is_physical_bus(info.bus) {
            tracing::debug!("Skipping {} on bus {:#04x}", node, info.bus);
            return Ok(None);
        }
        if info.class == DeviceClass::Unknown {
            tracing::debug!("Skipping {} \"{}\": not an input device we use", node, info.name);
            return Ok(None);
        }

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&info.path)?;
        let info = Arc::new(info);
        let alive = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let reader_info = Arc::clone(&info);
        let reader_alive = Arc::clone(&alive);
        let reader_stop = Arc::clone(&stop);
        let tx = self.tx.clone();
        let batch = self.config.read_batch.max(1);

        let reader = thread::Builder::new()
            .name(format!("substep-evdev-{node}"))
            .spawn(move || {
                read_device(file, &reader_info, &tx, batch, &reader_stop);
                reader_alive.store(false, Ordering::Release);
            })?;

        Ok(Some(OpenDevice {
            info,
            alive,
            stop,
            reader: Some(reader),
        }))
    }
}

impl Drop for DeviceHub {
    fn drop(&mut self) {
        for device in self.open.values() {
            device.stop.store(true, Ordering::Release);
        }
        self.open.clear();
    }
}

fn read_device(
    mut file: File,
    info: &Arc<DeviceInfo>,
    tx: &Sender<DeviceEvent>,
    batch: usize,
    stop: &AtomicBool,
) {
    let mut buf = vec![0u8; INPUT_EVENT_SIZE * batch];
    let mut pending: Vec<u8> = Vec::with_capacity(INPUT_EVENT_SIZE);

    while !stop.load(Ordering::Acquire) {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if let Err(e) = wait_readable(&file, READ_POLL) {
                    tracing::debug!("Poll on {} failed: {}", info.node, e);
                    break;
                }
                continue;
            }
            Err(e) => {
                tracing::debug!("Read from {} ended: {}", info.node, e);
                break;
            }
        };

        pending.extend_from_slice(&buf[..read]);
        let whole = pending.len() - pending.len() % INPUT_EVENT_SIZE;
        let events = match decode_events(&pending[..whole]) {
            Ok(events) => events,
            Err(e) => {
                tracing::debug!("Dropping packet from {}: {}", info.node, e);
                Vec::new()
            }
        };
        pending.drain(..whole);

        for event in events {
            let message = DeviceEvent {
                device: Arc::clone(info),
                event,
            };
            if tx.send(message).is_err() {
                return;
            }
        }
    }

    if !pending.is_empty() {
        tracing::debug!("Discarding {} trailing bytes from {}", pending.len(), info.node);
    }
}

impl std::fmt::Debug for DeviceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHub")
            .field("config", &self.config)
            .field("open", &self.open.keys().collect::<Vec<_>>())
            .field("rejected", &self.rejected.len())
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}
