//! # Hot-Plug Watch
//!
//! Filesystem change notification on the device directory. Node creation,
//! removal, renames and attribute changes all count; udev creates a node
//! first and makes it readable with a later `chmod`, so `ATTRIB` is what
//! usually signals a device became usable.

use std::io::ErrorKind;
use std::path::Path;

use inotify::{Inotify, WatchMask};

/// Pending change notifications for one device directory.
pub struct DeviceWatcher {
    inotify: Inotify,
    buffer: Vec<u8>,
}

impl DeviceWatcher {
    /// Starts watching `dir`.
    ///
    /// # Errors
    ///
    /// The io error from creating the watch, e.g. when `dir` does not exist.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        let inotify = Inotify::init()?;
        inotify.watches().add(
            dir,
            WatchMask::CREATE
                | WatchMask::DELETE
                | WatchMask::ATTRIB
                | WatchMask::MOVED_TO
                | WatchMask::MOVED_FROM,
        )?;
        Ok(Self {
            inotify,
            buffer: vec![0; 4096],
        })
    }

    /// Drains pending notifications without blocking. Returns whether any
    /// of them touched an `event*` node.
    pub fn changed(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.inotify.read_events(&mut self.buffer) {
                Ok(events) => {
                    let mut seen = 0;
                    for event in events {
                        seen += 1;
                        changed |= event
                            .name
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| name.starts_with("event"));
                    }
                    if seen == 0 {
                        return changed;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return changed,
                Err(e) => {
                    tracing::debug!("Device watch read failed: {}", e);
                    return changed;
                }
            }
        }
    }
}

impl std::fmt::Debug for DeviceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWatcher").finish_non_exhaustive()
    }
}
