//! # Bridge Record
//!
//! The fixed 17-byte layout shared by both processes:
//!
//! ```text
//!   offset  0        8      10     12       16     17
//!           ┌────────┬──────┬──────┬────────┬──────┐
//!           │ time   │ type │ code │ value  │ dev  │
//!           │ u64    │ u16  │ u16  │ i32    │ u8   │
//!           └────────┴──────┴──────┴────────┴──────┘
//! ```
//!
//! `type == 0` marks an empty slot and ends the valid data when scanning.

use bytemuck::{Pod, Zeroable};
use substep_capture::DeviceClass;

/// Slots in the ring.
pub const BUFFER_SIZE: usize = 20;

/// Record type of an empty slot.
pub const EMPTY_TYPE: u16 = 0;

/// Record type written to slot 0 when the helper found no devices.
///
/// Only recognised together with a [`DeviceClass::Unknown`] device byte. A
/// slot-0 record of this type written by a foreign helper with any other
/// device byte is read as an ordinary record, not as the marker.
pub const NO_DEVICES_TYPE: u16 = 3;

/// Bytes per record.
pub const RECORD_SIZE: usize = std::mem::size_of::<BridgeRecord>();

/// One device event as written by the helper.
#[derive(Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct BridgeRecord {
    /// Compatibility-domain timestamp.
    pub time: u64,
    /// Kernel event type.
    pub kind: u16,
    /// Kernel event code, possibly offset.
    pub code: u16,
    /// Event value.
    pub value: i32,
    /// [`DeviceClass`] discriminant.
    pub device: u8,
}

impl BridgeRecord {
    /// An empty slot.
    pub const EMPTY: Self = Self {
        time: 0,
        kind: EMPTY_TYPE,
        code: 0,
        value: 0,
        device: 0,
    };

    /// The "no input devices accessible" marker.
    ///
    /// The device byte is [`DeviceClass::Unknown`], which the helper never
    /// forwards, so the marker cannot be mistaken for an `EV_ABS` record.
    pub const NO_DEVICES: Self = Self {
        time: 0,
        kind: NO_DEVICES_TYPE,
        code: 0,
        value: 0,
        device: DeviceClass::Unknown as u8,
    };

    /// A record for a device event.
    #[must_use]
    pub const fn new(time: u64, kind: u16, code: u16, value: i32, device: DeviceClass) -> Self {
        Self {
            time,
            kind,
            code,
            value,
            device: device.as_u8(),
        }
    }

    /// Whether this slot holds nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.kind == EMPTY_TYPE
    }

    /// Whether this is the no-devices marker.
    #[must_use]
    pub const fn is_no_devices(&self) -> bool {
        self.kind == NO_DEVICES_TYPE && self.device == DeviceClass::Unknown as u8
    }

    /// Device class of the source.
    #[must_use]
    pub const fn device_class(&self) -> DeviceClass {
        DeviceClass::from_u8(self.device)
    }
}

impl std::fmt::Debug for BridgeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Copy out of the packed struct before borrowing.
        let (time, kind, code, value, device) =
            (self.time, self.kind, self.code, self.value, self.device);
        f.debug_struct("BridgeRecord")
            .field("time", &time)
            .field("kind", &kind)
            .field("code", &format_args!("{code:#x}"))
            .field("value", &value)
            .field("device", &DeviceClass::from_u8(device))
            .finish()
    }
}

/// Valid records of a slot array: everything before the first empty slot.
#[must_use]
pub fn valid_prefix(slots: &[BridgeRecord]) -> &[BridgeRecord] {
    let end = slots.iter().position(BridgeRecord::is_empty).unwrap_or(slots.len());
    &slots[..end]
}

/// Index of the first free slot, if any.
#[must_use]
pub fn first_free(slots: &[BridgeRecord]) -> Option<usize> {
    slots.iter().position(BridgeRecord::is_empty)
}
