//! # Host-Side Translation
//!
//! Turns drained bridge records into timestamped input events, per device
//! class, with held tracking so each physical press yields one press and
//! one release.

use std::collections::HashMap;

use input_linux_sys::{BTN_LEFT, BTN_RIGHT, BTN_TOUCH, EV_ABS, EV_KEY};
use substep_capture::{DeviceClass, MouseButton, RawSignal, Resolution, SignalResolver};
use substep_core::keymap::virtual_key_from_scan;
use substep_core::{ControllerCode, InputEvent, KeybindSnapshot, Timestamp};

use crate::codes::{axis_spec, controller_button, trigger, MOUSE_CODE_OFFSET, TRIGGER_THRESHOLD};
use crate::record::BridgeRecord;

/// Translation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranslateStats {
    /// Records seen.
    pub records: u64,
    /// Events produced.
    pub events: u64,
    /// Records that produced nothing.
    pub ignored: u64,
}

/// Record-to-event translator, owned by the host's frame thread.
#[derive(Debug)]
pub struct HostTranslator {
    resolver: SignalResolver,
    /// Last direction of every directional axis, and trigger state.
    axes: HashMap<u16, Option<ControllerCode>>,
    stats: TranslateStats,
}

impl HostTranslator {
    /// A translator with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: SignalResolver::new(None),
            axes: HashMap::new(),
            stats: TranslateStats::default(),
        }
    }

    /// Translates a batch of records in order.
    pub fn translate(
        &mut self,
        records: &[BridgeRecord],
        keybinds: &KeybindSnapshot,
        right_click: bool,
    ) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for record in records {
            let before = events.len();
            self.translate_one(record, keybinds, right_click, &mut events);
            self.stats.records += 1;
            if events.len() == before {
                self.stats.ignored += 1;
            }
        }
        self.stats.events += events.len() as u64;
        events
    }

    fn translate_one(
        &mut self,
        record: &BridgeRecord,
        keybinds: &KeybindSnapshot,
        right_click: bool,
        out: &mut Vec<InputEvent>,
    ) {
        let (kind, code, value) = (record.kind, record.code, record.value);
        let timestamp = Timestamp::from_ticks(record.time);
        let pressed = value != 0;

        match (record.device_class(), i32::from(kind)) {
            (DeviceClass::Mouse | DeviceClass::Touchpad, EV_KEY) => {
                let button = match i32::from(code.wrapping_sub(MOUSE_CODE_OFFSET)) {
                    BTN_LEFT => MouseButton::Primary,
                    BTN_RIGHT => MouseButton::Secondary,
                    _ => return,
                };
                let resolution =
                    self.resolver
                        .resolve(RawSignal::Mouse { button, pressed }, keybinds, right_click);
                push(out, timestamp, resolution);
            }
            (DeviceClass::Keyboard, EV_KEY) => {
                let Some(vk) = virtual_key_from_scan(code) else {
                    return;
                };
                let resolution =
                    self.resolver
                        .resolve(RawSignal::Key { vk, pressed }, keybinds, right_click);
                push(out, timestamp, resolution);
            }
            (DeviceClass::Touchscreen, EV_KEY) if i32::from(code) == BTN_TOUCH => {
                let signal = RawSignal::Mouse {
                    button: MouseButton::Primary,
                    pressed,
                };
                push(out, timestamp, self.resolver.resolve(signal, keybinds, right_click));
            }
            (DeviceClass::Controller, EV_KEY) => {
                if let Some(button) = controller_button(code) {
                    let resolution = self.resolver.resolve_code(button.code(), pressed, keybinds);
                    push(out, timestamp, resolution);
                }
            }
            (DeviceClass::Controller, EV_ABS) => {
                let now = if let Some(spec) = axis_spec(code) {
                    spec.direction(value)
                } else if let Some(button) = trigger(code) {
                    (value > TRIGGER_THRESHOLD).then_some(button)
                } else {
                    return;
                };
                let before = self.axes.insert(code, now).flatten();
                if before == now {
                    return;
                }
                if let Some(released) = before {
                    let resolution = self.resolver.resolve_code(released.code(), false, keybinds);
                    push(out, timestamp, resolution);
                }
                if let Some(held) = now {
                    let resolution = self.resolver.resolve_code(held.code(), true, keybinds);
                    push(out, timestamp, resolution);
                }
            }
            _ => {}
        }
    }

    /// Forgets held keys and axis directions, e.g. at session start.
    pub fn reset(&mut self) {
        self.resolver.clear_held();
        self.axes.clear();
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> TranslateStats {
        self.stats
    }
}

impl Default for HostTranslator {
    fn default() -> Self {
        Self::new()
    }
}

fn push(out: &mut Vec<InputEvent>, timestamp: Timestamp, resolution: Resolution) {
    if let Resolution::Event {
        action,
        player,
        transition,
    } = resolution
    {
        out.push(InputEvent::new(timestamp, action, transition, player));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use input_linux_sys::{ABS_HAT0X, ABS_X, ABS_Z};
    use substep_core::{Action, BindSlot, KeybindTable, PlayerSlot, Transition};

    fn keybinds() -> KeybindSnapshot {
        let mut table = KeybindTable::new();
        table.bind(BindSlot::P1Jump, 0x20); // space
        table.bind(BindSlot::P2Jump, ControllerCode::A.code());
        table.bind(BindSlot::P1Left, ControllerCode::LeftStickLeft.code());
        table.bind(BindSlot::P1Right, ControllerCode::Right.code());
        table.bind(BindSlot::P2Left, ControllerCode::Lt.code());
        let snapshot = KeybindSnapshot::new();
        snapshot.replace(table);
        snapshot
    }

    fn record(time: u64, kind: i32, code: i32, value: i32, device: DeviceClass) -> BridgeRecord {
        BridgeRecord::new(
            time,
            u16::try_from(kind).unwrap(),
            u16::try_from(code).unwrap(),
            value,
            device,
        )
    }

    fn summary(events: &[InputEvent]) -> Vec<(u64, Action, Transition, PlayerSlot)> {
        events
            .iter()
            .map(|e| (e.timestamp.ticks(), e.action, e.transition, e.player))
            .collect()
    }

    #[test]
    fn test_keyboard_scan_codes_resolve_through_binds() {
        let binds = keybinds();
        let mut translator = HostTranslator::new();
        let events = translator.translate(
            &[
                record(10, EV_KEY, 0x39, 1, DeviceClass::Keyboard),
                record(11, EV_KEY, 0x39, 1, DeviceClass::Keyboard),
                record(12, EV_KEY, 0x39, 0, DeviceClass::Keyboard),
                record(13, EV_KEY, 0x1E, 1, DeviceClass::Keyboard),
            ],
            &binds,
            false,
        );
        assert_eq!(
            summary(&events),
            vec![
                (10, Action::Jump, Transition::Press, PlayerSlot::P1),
                (12, Action::Jump, Transition::Release, PlayerSlot::P1),
            ]
        );
        assert_eq!(translator.stats().records, 4);
        assert_eq!(translator.stats().ignored, 2);
    }

    #[test]
    fn test_mouse_and_touch() {
        let binds = keybinds();
        let mut translator = HostTranslator::new();
        let left = i32::from(MOUSE_CODE_OFFSET) + BTN_LEFT;
        let right = i32::from(MOUSE_CODE_OFFSET) + BTN_RIGHT;
        let records = [
            record(1, EV_KEY, left, 1, DeviceClass::Mouse),
            record(2, EV_KEY, right, 1, DeviceClass::Touchpad),
            record(3, EV_KEY, BTN_TOUCH, 1, DeviceClass::Touchscreen),
        ];

        let without = translator.translate(&records, &binds, false);
        assert_eq!(
            summary(&without),
            vec![
                (1, Action::Jump, Transition::Press, PlayerSlot::P1),
                (3, Action::Jump, Transition::Press, PlayerSlot::P1),
            ]
        );

        let with = translator.translate(&records[1..2], &binds, true);
        assert_eq!(
            summary(&with),
            vec![(2, Action::Jump, Transition::Press, PlayerSlot::P2)]
        );
    }

    #[test]
    fn test_controller_buttons_and_axes() {
        let binds = keybinds();
        let mut translator = HostTranslator::new();
        let events = translator.translate(
            &[
                record(1, EV_KEY, 0x130, 1, DeviceClass::Controller),
                record(2, EV_ABS, ABS_X, -9000, DeviceClass::Controller),
                record(3, EV_ABS, ABS_X, -20_000, DeviceClass::Controller),
                record(4, EV_ABS, ABS_X, 0, DeviceClass::Controller),
                record(5, EV_ABS, ABS_HAT0X, 1, DeviceClass::Controller),
                record(6, EV_ABS, ABS_HAT0X, 20, DeviceClass::Controller),
                record(7, EV_ABS, ABS_Z, 31, DeviceClass::Controller),
                record(8, EV_ABS, ABS_Z, 12, DeviceClass::Controller),
                record(9, EV_KEY, 0x130, 0, DeviceClass::Controller),
            ],
            &binds,
            false,
        );
        assert_eq!(
            summary(&events),
            vec![
                (1, Action::Jump, Transition::Press, PlayerSlot::P2),
                (2, Action::Left, Transition::Press, PlayerSlot::P1),
                (4, Action::Left, Transition::Release, PlayerSlot::P1),
                (6, Action::Right, Transition::Press, PlayerSlot::P1),
                (7, Action::Left, Transition::Press, PlayerSlot::P2),
                (8, Action::Left, Transition::Release, PlayerSlot::P2),
                (9, Action::Jump, Transition::Release, PlayerSlot::P2),
            ]
        );
    }

    #[test]
    fn test_reset_forgets_axis_state() {
        let binds = keybinds();
        let mut translator = HostTranslator::new();
        let push_left = [record(1, EV_ABS, ABS_X, -9000, DeviceClass::Controller)];
        assert_eq!(translator.translate(&push_left, &binds, false).len(), 1);
        assert!(translator.translate(&push_left, &binds, false).is_empty());
        translator.reset();
        assert_eq!(translator.translate(&push_left, &binds, false).len(), 1);
    }
}
