//! Native listener source backed by the device hub.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use input_linux_sys::{BTN_LEFT, BTN_RIGHT, BTN_TOUCH, EV_KEY, EV_REL};
use substep_core::keymap::virtual_key_from_scan;

use super::hub::{DeviceEvent, DeviceHub, HubConfig};
use super::{scan_code_from_evdev, DeviceClass};
use crate::error::{CaptureError, CaptureResult};
use crate::source::{InputSource, MouseButton, RawSignal};

/// Keyboard, mouse and touch input from evdev nodes. Controllers are left
/// to the controller poller.
#[derive(Debug)]
pub struct EvdevSource {
    hub: DeviceHub,
    rx: Receiver<DeviceEvent>,
    rescan_every: Duration,
    last_rescan: Instant,
}

impl EvdevSource {
    /// A source over `config`. Hot-plug is picked up as the device
    /// directory changes, with a full rescan every `rescan_every` as well.
    #[must_use]
    pub fn new(config: HubConfig, rescan_every: Duration) -> Self {
        let hub = DeviceHub::new(config);
        let rx = hub.events();
        Self {
            hub,
            rx,
            rescan_every,
            last_rescan: Instant::now(),
        }
    }

    /// The underlying hub.
    #[must_use]
    pub const fn hub(&self) -> &DeviceHub {
        &self.hub
    }

    fn maybe_rescan(&mut self) {
        let result = if self.last_rescan.elapsed() >= self.rescan_every {
            self.last_rescan = Instant::now();
            self.hub.rescan().map(Some)
        } else {
            self.hub.poll_hotplug()
        };
        if let Err(e) = result {
            tracing::debug!("Device rescan failed: {}", e);
        }
    }
}

/// Translates one device event into a listener signal.
#[must_use]
pub fn signal_from_event(message: &DeviceEvent) -> Option<RawSignal> {
    let event = message.event;
    match (message.device.class, i32::from(event.kind)) {
        (DeviceClass::Keyboard, EV_KEY) => {
            let vk = virtual_key_from_scan(scan_code_from_evdev(event.code))?;
            Some(RawSignal::Key {
                vk,
                pressed: event.value != 0,
            })
        }
        (DeviceClass::Mouse | DeviceClass::Touchpad, EV_KEY) => {
            let button = match i32::from(event.code) {
                BTN_LEFT => MouseButton::Primary,
                BTN_RIGHT => MouseButton::Secondary,
                _ => MouseButton::Other(event.code),
            };
            Some(RawSignal::Mouse {
                button,
                pressed: event.value != 0,
            })
        }
        (DeviceClass::Mouse, EV_REL) => Some(RawSignal::MouseMotion),
        (DeviceClass::Touchscreen, EV_KEY) if i32::from(event.code) == BTN_TOUCH => Some(RawSignal::Mouse {
            button: MouseButton::Primary,
            pressed: event.value != 0,
        }),
        _ => None,
    }
}

impl InputSource for EvdevSource {
    fn register(&mut self) -> CaptureResult<()> {
        let report = self
            .hub
            .rescan()
            .map_err(|e| CaptureError::Registration(e.to_string()))?;
        self.last_rescan = Instant::now();
        if self.hub.device_count() == 0 {
            return Err(CaptureError::Registration(
                "no accessible input devices".to_string(),
            ));
        }
        tracing::info!("Capturing from {} input devices", report.added.len());
        Ok(())
    }

    fn next_signal(&mut self, timeout: Duration) -> CaptureResult<Option<RawSignal>> {
        self.maybe_rescan();
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Ok(signal_from_event(&message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::SourceClosed),
        }
    }

    fn discard_pending(&mut self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evdev::fixtures::{key_events, write_sysfs, KEYBOARD_KEYS};
    use crate::evdev::{DeviceInfo, EvdevEvent};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn message(class: DeviceClass, kind: i32, code: i32, value: i32) -> DeviceEvent {
        DeviceEvent {
            device: Arc::new(DeviceInfo {
                node: "event0".into(),
                path: PathBuf::from("/dev/input/event0"),
                name: "test".into(),
                bus: 3,
                class,
                has_relative: false,
            }),
            event: EvdevEvent {
                kind: u16::try_from(kind).unwrap(),
                code: u16::try_from(code).unwrap(),
                value,
                ..EvdevEvent::default()
            },
        }
    }

    #[test]
    fn test_keyboard_translation() {
        // KEY_SPACE
        assert_eq!(
            signal_from_event(&message(DeviceClass::Keyboard, EV_KEY, 57, 1)),
            Some(RawSignal::Key { vk: 0x20, pressed: true })
        );
        // KEY_UP goes through the extended table.
        assert_eq!(
            signal_from_event(&message(DeviceClass::Keyboard, EV_KEY, 103, 0)),
            Some(RawSignal::Key { vk: 0x26, pressed: false })
        );
    }

    #[test]
    fn test_pointer_translation() {
        assert_eq!(
            signal_from_event(&message(DeviceClass::Mouse, EV_KEY, BTN_RIGHT, 1)),
            Some(RawSignal::Mouse { button: MouseButton::Secondary, pressed: true })
        );
        assert_eq!(
            signal_from_event(&message(DeviceClass::Mouse, EV_REL, 0, 4)),
            Some(RawSignal::MouseMotion)
        );
        assert_eq!(
            signal_from_event(&message(DeviceClass::Touchscreen, EV_KEY, BTN_TOUCH, 1)),
            Some(RawSignal::Mouse { button: MouseButton::Primary, pressed: true })
        );
        assert_eq!(signal_from_event(&message(DeviceClass::Controller, EV_KEY, 0x130, 1)), None);
    }

    #[test]
    fn test_register_requires_a_device() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("dev")).unwrap();
        let config = HubConfig {
            dev_root: root.join("dev"),
            sys_root: root.join("sys"),
            physical_only: true,
            read_batch: 8,
        };

        let mut empty = EvdevSource::new(config.clone(), Duration::from_secs(1));
        assert!(matches!(empty.register(), Err(CaptureError::Registration(_))));

        write_sysfs(&root.join("sys"), "event0", "0003", "120013", KEYBOARD_KEYS, "0");
        std::fs::write(root.join("dev/event0"), key_events(&[(57, 1)])).unwrap();
        let mut source = EvdevSource::new(config, Duration::from_secs(60));
        source.register().unwrap();
        assert_eq!(source.hub().device_count(), 1);
        assert_eq!(
            source.next_signal(Duration::from_secs(5)).unwrap(),
            Some(RawSignal::Key { vk: 0x20, pressed: true })
        );
    }
}
