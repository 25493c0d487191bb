//! # Linux evdev Devices
//!
//! Raw device access through `/dev/input/event*` and the sysfs attributes
//! under `/sys/class/input`. No ioctls: bus type and capabilities come from
//! sysfs text files, events are read as plain `input_event` records.
//!
//! ```text
//!   /sys/class/input/eventN/device/
//!   ├── name
//!   ├── id/bustype              (hex)
//!   ├── capabilities/{ev,key,rel,abs}   (hex words, most significant first)
//!   └── properties
//! ```

mod abi;
pub mod hub;
pub mod source;
pub mod watch;

use std::path::{Path, PathBuf};

use input_linux_sys::{
    input_event, ABS_X, BTN_GAMEPAD, BTN_JOYSTICK, BTN_LEFT, BTN_TOOL_FINGER, BTN_TOUCH,
    BUS_BLUETOOTH, BUS_I8042, BUS_USB, EV_KEY, EV_REL, INPUT_PROP_DIRECT, KEY_A, REL_X,
};

use libc::timeval;

use crate::error::{CaptureError, CaptureResult};

pub use abi::INPUT_EVENT_SIZE;
pub use hub::{DeviceEvent, DeviceHub, HubConfig, RescanReport};
pub use source::EvdevSource;
pub use watch::DeviceWatcher;

/// Whether a device on `bus` is a physical device rather than a virtual
/// or synthetic one.
#[must_use]
#[allow(clippy::useless_conversion)]
pub fn is_physical_bus(bus: u16) -> bool {
    [BUS_USB, BUS_BLUETOOTH, BUS_I8042]
        .into_iter()
        .any(|physical| i32::from(physical) == i32::from(bus))
}

/// One decoded kernel event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvdevEvent {
    /// Seconds part of the kernel timestamp.
    pub tv_sec: i64,
    /// Microseconds part of the kernel timestamp.
    pub tv_usec: i64,
    /// Event type (`EV_*`).
    pub kind: u16,
    /// Event code.
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl EvdevEvent {
    /// Widens a kernel record; `timeval` fields are 32 bits on some targets.
    #[must_use]
    #[allow(clippy::useless_conversion)]
    pub fn from_kernel(raw: &input_event) -> Self {
        Self {
            tv_sec: i64::from(raw.time.tv_sec),
            tv_usec: i64::from(raw.time.tv_usec),
            kind: raw.type_,
            code: raw.code,
            value: raw.value,
        }
    }

    /// The kernel record. Timestamps that do not fit this target's
    /// `timeval` saturate.
    #[must_use]
    #[allow(clippy::useless_conversion)]
    pub fn to_kernel(&self) -> input_event {
        input_event {
            time: timeval {
                tv_sec: self.tv_sec.try_into().unwrap_or(libc::time_t::MAX),
                tv_usec: self.tv_usec.try_into().unwrap_or(libc::suseconds_t::MAX),
            },
            type_: self.kind,
            code: self.code,
            value: self.value,
        }
    }

    /// Wire bytes, as read from a device node.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        abi::event_bytes(&self.to_kernel())
    }

    /// Whether this is a key or button transition.
    #[must_use]
    pub fn is_key(&self) -> bool {
        i32::from(self.kind) == EV_KEY
    }
}

/// Decodes a buffer of whole `input_event` records.
///
/// # Errors
///
/// [`CaptureError::Malformed`] if the buffer is not a whole number of
/// records.
pub fn decode_events(bytes: &[u8]) -> CaptureResult<Vec<EvdevEvent>> {
    if bytes.len() % INPUT_EVENT_SIZE != 0 {
        return Err(CaptureError::Malformed {
            len: bytes.len(),
            reason: format!("not a multiple of {INPUT_EVENT_SIZE} bytes"),
        });
    }
    Ok(bytes
        .chunks_exact(INPUT_EVENT_SIZE)
        .filter_map(abi::read_event)
        .map(|raw| EvdevEvent::from_kernel(&raw))
        .collect())
}

/// Extended key codes and their set-1 scan codes (`0xE0` prefix).
pub const EXTENDED_SCAN_CODES: [(u16, u16); 17] = [
    (96, 0xE01C),  // KPENTER
    (97, 0xE01D),  // RIGHTCTRL
    (98, 0xE035),  // KPSLASH
    (100, 0xE038), // RIGHTALT
    (102, 0xE047), // HOME
    (103, 0xE048), // UP
    (104, 0xE049), // PAGEUP
    (105, 0xE04B), // LEFT
    (106, 0xE04D), // RIGHT
    (107, 0xE04F), // END
    (108, 0xE050), // DOWN
    (109, 0xE051), // PAGEDOWN
    (110, 0xE052), // INSERT
    (111, 0xE053), // DELETE
    (113, 0xE020), // MUTE
    (114, 0xE02E), // VOLUMEDOWN
    (115, 0xE030), // VOLUMEUP
];

/// Scan code of an evdev key code. Codes below 89 already equal their
/// set-1 scan code; only `97..=115` are remapped.
#[must_use]
pub fn scan_code_from_evdev(code: u16) -> u16 {
    if code > 96 && code < 116 {
        EXTENDED_SCAN_CODES
            .iter()
            .find(|(evdev, _)| *evdev == code)
            .map_or(code, |(_, scan)| *scan)
    } else {
        code
    }
}

/// What kind of device a node is, by capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceClass {
    /// Relative pointer with buttons.
    Mouse = 0,
    /// Indirect absolute pointer.
    Touchpad = 1,
    /// Keyboard.
    Keyboard = 2,
    /// Direct absolute pointer.
    Touchscreen = 3,
    /// Gamepad or joystick.
    Controller = 4,
    /// Anything else.
    Unknown = 5,
}

impl DeviceClass {
    /// Class from its wire byte. Out-of-range bytes are [`DeviceClass::Unknown`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Mouse,
            1 => Self::Touchpad,
            2 => Self::Keyboard,
            3 => Self::Touchscreen,
            4 => Self::Controller,
            _ => Self::Unknown,
        }
    }

    /// Wire byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A sysfs capability bitmap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    /// Parses space-separated hex words, most significant word first.
    /// Unparsable words count as zero.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let words = text
            .split_whitespace()
            .rev()
            .map(|word| u64::from_str_radix(word, 16).unwrap_or(0))
            .collect();
        Self { words }
    }

    /// Whether `bit` is set. Negative bits never are.
    #[must_use]
    pub fn has(&self, bit: i32) -> bool {
        let Ok(bit) = usize::try_from(bit) else {
            return false;
        };
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1u64 << (bit % 64)) != 0)
    }
}

/// Capability bitmaps of one device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Event types.
    pub ev: Bitmap,
    /// Key and button codes.
    pub key: Bitmap,
    /// Relative axes.
    pub rel: Bitmap,
    /// Absolute axes.
    pub abs: Bitmap,
    /// Input properties.
    pub props: Bitmap,
}

impl Capabilities {
    /// Classifies the device.
    #[must_use]
    pub fn classify(&self) -> DeviceClass {
        if self.key.has(BTN_GAMEPAD) || self.key.has(BTN_JOYSTICK) {
            return DeviceClass::Controller;
        }
        if self.abs.has(ABS_X) && self.key.has(BTN_TOUCH) {
            if self.props.has(INPUT_PROP_DIRECT) {
                return DeviceClass::Touchscreen;
            }
            if self.key.has(BTN_TOOL_FINGER) {
                return DeviceClass::Touchpad;
            }
        }
        if self.rel.has(REL_X) && self.key.has(BTN_LEFT) {
            return DeviceClass::Mouse;
        }
        if self.ev.has(EV_KEY) && self.key.has(KEY_A) {
            return DeviceClass::Keyboard;
        }
        DeviceClass::Unknown
    }

    /// Whether the device reports relative motion.
    #[must_use]
    pub fn has_relative(&self) -> bool {
        self.ev.has(EV_REL)
    }
}

/// A probed device node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Node name, e.g. `event3`.
    pub node: String,
    /// Device node path.
    pub path: PathBuf,
    /// Human-readable name.
    pub name: String,
    /// Bus type.
    pub bus: u16,
    /// Device class.
    pub class: DeviceClass,
    /// Reports relative motion (`EV_REL`).
    pub has_relative: bool,
}

fn read_attr(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path).map(|s| s.trim().to_string())
}

fn read_bitmap(path: &Path) -> Bitmap {
    read_attr(path).map(|text| Bitmap::parse(&text)).unwrap_or_default()
}

/// Reads a device's sysfs attributes.
///
/// # Errors
///
/// The io error from reading the device's bus type. Missing capability
/// files are treated as empty.
pub fn probe_device(sys_root: &Path, dev_root: &Path, node: &str) -> std::io::Result<DeviceInfo> {
    let device = sys_root.join(node).join("device");
    let bus_text = read_attr(&device.join("id").join("bustype"))?;
    let bus = u16::from_str_radix(&bus_text, 16).unwrap_or(0);
    let name = read_attr(&device.join("name")).unwrap_or_else(|_| node.to_string());

    let caps_dir = device.join("capabilities");
    let caps = Capabilities {
        ev: read_bitmap(&caps_dir.join("ev")),
        key: read_bitmap(&caps_dir.join("key")),
        rel: read_bitmap(&caps_dir.join("rel")),
        abs: read_bitmap(&caps_dir.join("abs")),
        props: read_bitmap(&device.join("properties")),
    };

    Ok(DeviceInfo {
        node: node.to_string(),
        path: dev_root.join(node),
        name,
        bus,
        class: caps.classify(),
        has_relative: caps.has_relative(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    use input_linux_sys::EV_KEY;

    use super::EvdevEvent;

    /// Writes the sysfs attributes of a fake device.
    pub fn write_sysfs(sys: &Path, node: &str, bus: &str, ev: &str, key: &str, rel: &str) {
        let device = sys.join(node).join("device");
        fs::create_dir_all(device.join("id")).unwrap();
        fs::create_dir_all(device.join("capabilities")).unwrap();
        fs::write(device.join("name"), format!("Fake {node}\n")).unwrap();
        fs::write(device.join("id").join("bustype"), format!("{bus}\n")).unwrap();
        fs::write(device.join("capabilities").join("ev"), ev).unwrap();
        fs::write(device.join("capabilities").join("key"), key).unwrap();
        fs::write(device.join("capabilities").join("rel"), rel).unwrap();
        fs::write(device.join("capabilities").join("abs"), "0").unwrap();
        fs::write(device.join("properties"), "0").unwrap();
    }

    /// A keyboard bitmap with `KEY_A` set.
    pub const KEYBOARD_KEYS: &str = "40000000";
    /// A mouse key bitmap with `BTN_LEFT`/`BTN_RIGHT` in word 4.
    pub const MOUSE_KEYS: &str = "30000 0 0 0 0";

    /// Encodes key events.
    pub fn key_events(events: &[(u16, i32)]) -> Vec<u8> {
        events
            .iter()
            .enumerate()
            .flat_map(|(i, (code, value))| {
                EvdevEvent {
                    tv_sec: 1_700_000_000,
                    tv_usec: i64::try_from(i).unwrap() * 1_000,
                    kind: u16::try_from(EV_KEY).unwrap(),
                    code: *code,
                    value: *value,
                }
                .to_bytes()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use input_linux_sys::{BTN_RIGHT, EV_ABS};

    #[test]
    fn test_decode_kernel_records() {
        let press = EvdevEvent {
            tv_sec: 1,
            tv_usec: 2,
            kind: u16::try_from(EV_KEY).unwrap(),
            code: 30,
            value: 1,
        };
        let bytes = press.to_bytes();
        assert_eq!(bytes.len(), INPUT_EVENT_SIZE);
        let mut doubled = bytes.clone();
        doubled.extend_from_slice(&bytes);
        assert_eq!(decode_events(&doubled).unwrap(), vec![press, press]);
        assert!(press.is_key());
        assert!(decode_events(&bytes[..INPUT_EVENT_SIZE - 4]).is_err());
    }

    #[test]
    fn test_kernel_fields_map_through() {
        let raw = input_event {
            time: timeval {
                tv_sec: 7,
                tv_usec: 999_999,
            },
            type_: u16::try_from(EV_ABS).unwrap(),
            code: 0x11,
            value: -1,
        };
        let event = EvdevEvent::from_kernel(&raw);
        assert_eq!((event.tv_sec, event.tv_usec), (7, 999_999));
        assert_eq!(i32::from(event.kind), EV_ABS);
        assert!(!event.is_key());
        assert_eq!(event.value, -1);
    }

    #[test]
    fn test_extended_scan_codes() {
        assert_eq!(scan_code_from_evdev(30), 30);
        assert_eq!(scan_code_from_evdev(103), 0xE048);
        assert_eq!(scan_code_from_evdev(115), 0xE030);
        // Not remapped: outside the translated window.
        assert_eq!(scan_code_from_evdev(96), 96);
        assert_eq!(scan_code_from_evdev(116), 116);
        // Inside the window without an entry.
        assert_eq!(scan_code_from_evdev(99), 99);
    }

    #[test]
    fn test_bitmap_words_are_most_significant_first() {
        let bitmap = Bitmap::parse("30000 0 0 0 0");
        assert!(bitmap.has(BTN_LEFT));
        assert!(bitmap.has(BTN_RIGHT));
        assert!(!bitmap.has(BTN_GAMEPAD));
        assert!(!Bitmap::parse("").has(0));
    }

    #[test]
    fn test_classification() {
        let keyboard = Capabilities {
            ev: Bitmap::parse("120013"),
            key: Bitmap::parse(fixtures::KEYBOARD_KEYS),
            ..Capabilities::default()
        };
        assert_eq!(keyboard.classify(), DeviceClass::Keyboard);

        let mouse = Capabilities {
            ev: Bitmap::parse("17"),
            key: Bitmap::parse(fixtures::MOUSE_KEYS),
            rel: Bitmap::parse("103"),
            ..Capabilities::default()
        };
        assert_eq!(mouse.classify(), DeviceClass::Mouse);
        assert!(mouse.has_relative());

        let pad = Capabilities {
            key: Bitmap::parse("7fff000000000000 0 0 0 0"),
            ..Capabilities::default()
        };
        assert_eq!(pad.classify(), DeviceClass::Controller);

        let touch = Capabilities {
            key: Bitmap::parse("400 0 0 0 0 0"),
            abs: Bitmap::parse("3"),
            props: Bitmap::parse("2"),
            ..Capabilities::default()
        };
        assert_eq!(touch.classify(), DeviceClass::Touchscreen);
        assert_eq!(DeviceClass::from_u8(9), DeviceClass::Unknown);
    }

    #[test]
    fn test_bus_filter() {
        assert!(is_physical_bus(0x03)); // usb
        assert!(is_physical_bus(0x05)); // bluetooth
        assert!(is_physical_bus(0x11)); // ps/2
        assert!(!is_physical_bus(0x06)); // virtual
    }

    #[test]
    fn test_probe_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let sys = dir.path().join("sys");
        fixtures::write_sysfs(&sys, "event4", "0003", "120013", fixtures::KEYBOARD_KEYS, "0");
        let info = probe_device(&sys, Path::new("/dev/input"), "event4").unwrap();
        assert!(is_physical_bus(info.bus));
        assert_eq!(info.bus, 0x03);
        assert_eq!(info.class, DeviceClass::Keyboard);
        assert_eq!(info.name, "Fake event4");
        assert_eq!(info.path, Path::new("/dev/input/event4"));
        assert!(probe_device(&sys, Path::new("/dev/input"), "event9").is_err());
    }
}
