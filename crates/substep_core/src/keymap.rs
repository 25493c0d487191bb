//! # Physical Code Translation
//!
//! Versioned lookup tables that turn hardware codes into the binding codes
//! stored in a [`KeybindTable`](crate::keybinds::KeybindTable).
//!
//! ## Code Space
//!
//! ```text
//!   0x0000..=0x00FF   keyboard virtual keys
//!   0x1000..=0x10FF   controller buttons and synthetic stick directions
//! ```
//!
//! Keyboard scan codes (set 1, with an `0xE0` high byte for extended keys)
//! are translated through [`virtual_key_from_scan`]. The table is US layout
//! and layout-independent for the keys that matter for play.

/// Version of the translation tables. Bump when a mapping changes.
pub const KEYMAP_VERSION: u32 = 1;

/// A binding code as stored in the keybinding table.
pub type BindCode = u64;

/// First numpad digit virtual key.
pub const VK_NUMPAD0: u16 = 0x60;
/// Last numpad digit virtual key.
pub const VK_NUMPAD9: u16 = 0x69;

/// Folds numpad digits onto the main-row digits so either binds the same slot.
#[must_use]
pub const fn normalize_virtual_key(vk: u16) -> u16 {
    if vk >= VK_NUMPAD0 && vk <= VK_NUMPAD9 {
        vk - 0x30
    } else {
        vk
    }
}

/// Binding code of a keyboard virtual key.
#[must_use]
pub const fn keyboard_code(vk: u16) -> BindCode {
    normalize_virtual_key(vk) as BindCode
}

/// Scan code (set 1) to virtual key, as the system keyboard layer would
/// translate it without left/right distinction.
#[must_use]
pub const fn virtual_key_from_scan(scan: u16) -> Option<u16> {
    let vk: u16 = match scan {
        0x01 => 0x1B,                          // escape
        0x02..=0x0A => 0x31 + (scan - 0x02),   // 1..9
        0x0B => 0x30,                          // 0
        0x0C => 0xBD,                          // minus
        0x0D => 0xBB,                          // equals
        0x0E => 0x08,                          // backspace
        0x0F => 0x09,                          // tab
        0x10 => b'Q' as u16,
        0x11 => b'W' as u16,
        0x12 => b'E' as u16,
        0x13 => b'R' as u16,
        0x14 => b'T' as u16,
        0x15 => b'Y' as u16,
        0x16 => b'U' as u16,
        0x17 => b'I' as u16,
        0x18 => b'O' as u16,
        0x19 => b'P' as u16,
        0x1A => 0xDB,                          // [
        0x1B => 0xDD,                          // ]
        0x1C | 0xE01C => 0x0D,                 // enter, keypad enter
        0x1D | 0xE01D => 0x11,                 // ctrl
        0x1E => b'A' as u16,
        0x1F => b'S' as u16,
        0x20 => b'D' as u16,
        0x21 => b'F' as u16,
        0x22 => b'G' as u16,
        0x23 => b'H' as u16,
        0x24 => b'J' as u16,
        0x25 => b'K' as u16,
        0x26 => b'L' as u16,
        0x27 => 0xBA,                          // ;
        0x28 => 0xDE,                          // '
        0x29 => 0xC0,                          // `
        0x2A | 0x36 => 0x10,                   // shift
        0x2B => 0xDC,                          // backslash
        0x2C => b'Z' as u16,
        0x2D => b'X' as u16,
        0x2E => b'C' as u16,
        0x2F => b'V' as u16,
        0x30 => b'B' as u16,
        0x31 => b'N' as u16,
        0x32 => b'M' as u16,
        0x33 => 0xBC,                          // ,
        0x34 => 0xBE,                          // .
        0x35 => 0xBF,                          // /
        0x37 => 0x6A,                          // keypad *
        0x38 | 0xE038 => 0x12,                 // alt
        0x39 => 0x20,                          // space
        0x3A => 0x14,                          // caps lock
        0x3B..=0x44 => 0x70 + (scan - 0x3B),   // F1..F10
        0x45 => 0x90,                          // num lock
        0x46 => 0x91,                          // scroll lock
        0x47 | 0xE047 => 0x24,                 // home
        0x48 | 0xE048 => 0x26,                 // up
        0x49 | 0xE049 => 0x21,                 // page up
        0x4A => 0x6D,                          // keypad -
        0x4B | 0xE04B => 0x25,                 // left
        0x4C => 0x0C,                          // clear
        0x4D | 0xE04D => 0x27,                 // right
        0x4E => 0x6B,                          // keypad +
        0x4F | 0xE04F => 0x23,                 // end
        0x50 | 0xE050 => 0x28,                 // down
        0x51 | 0xE051 => 0x22,                 // page down
        0x52 | 0xE052 => 0x2D,                 // insert
        0x53 | 0xE053 => 0x2E,                 // delete
        0x57 => 0x7A,                          // F11
        0x58 => 0x7B,                          // F12
        0xE035 => 0x6F,                        // keypad /
        0xE020 => 0xAD,                        // mute
        0xE02E => 0xAE,                        // volume down
        0xE030 => 0xAF,                        // volume up
        _ => return None,
    };
    Some(vk)
}

/// Controller buttons and synthetic stick directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ControllerCode {
    /// South face button.
    A = 0x1000,
    /// East face button.
    B = 0x1001,
    /// West face button.
    X = 0x1002,
    /// North face button.
    Y = 0x1003,
    /// Back / select.
    Back = 0x1004,
    /// Start.
    Start = 0x1005,
    /// Dpad up.
    Up = 0x1006,
    /// Dpad down.
    Down = 0x1007,
    /// Dpad left.
    Left = 0x1008,
    /// Dpad right.
    Right = 0x1009,
    /// Left shoulder.
    Lb = 0x100A,
    /// Right shoulder.
    Rb = 0x100B,
    /// Left trigger (also left stick click).
    Lt = 0x100C,
    /// Right trigger (also right stick click).
    Rt = 0x100D,
    /// Left stick pushed up.
    LeftStickUp = 0x1010,
    /// Left stick pushed down.
    LeftStickDown = 0x1011,
    /// Left stick pushed left.
    LeftStickLeft = 0x1012,
    /// Left stick pushed right.
    LeftStickRight = 0x1013,
    /// Right stick pushed up.
    RightStickUp = 0x1014,
    /// Right stick pushed down.
    RightStickDown = 0x1015,
    /// Right stick pushed left.
    RightStickLeft = 0x1016,
    /// Right stick pushed right.
    RightStickRight = 0x1017,
}

impl ControllerCode {
    /// Every code, in table order.
    pub const ALL: [Self; 22] = [
        Self::A,
        Self::B,
        Self::X,
        Self::Y,
        Self::Back,
        Self::Start,
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::Lb,
        Self::Rb,
        Self::Lt,
        Self::Rt,
        Self::LeftStickUp,
        Self::LeftStickDown,
        Self::LeftStickLeft,
        Self::LeftStickRight,
        Self::RightStickUp,
        Self::RightStickDown,
        Self::RightStickLeft,
        Self::RightStickRight,
    ];

    /// Binding code of this controller input.
    #[must_use]
    pub const fn code(self) -> BindCode {
        self as u16 as BindCode
    }

    /// Name used in binding files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "ControllerA",
            Self::B => "ControllerB",
            Self::X => "ControllerX",
            Self::Y => "ControllerY",
            Self::Back => "ControllerBack",
            Self::Start => "ControllerStart",
            Self::Up => "ControllerUp",
            Self::Down => "ControllerDown",
            Self::Left => "ControllerLeft",
            Self::Right => "ControllerRight",
            Self::Lb => "ControllerLB",
            Self::Rb => "ControllerRB",
            Self::Lt => "ControllerLT",
            Self::Rt => "ControllerRT",
            Self::LeftStickUp => "ControllerLeftStickUp",
            Self::LeftStickDown => "ControllerLeftStickDown",
            Self::LeftStickLeft => "ControllerLeftStickLeft",
            Self::LeftStickRight => "ControllerLeftStickRight",
            Self::RightStickUp => "ControllerRightStickUp",
            Self::RightStickDown => "ControllerRightStickDown",
            Self::RightStickLeft => "ControllerRightStickLeft",
            Self::RightStickRight => "ControllerRightStickRight",
        }
    }
}

/// Named keyboard keys accepted in binding files besides single
/// letters and digits.
const NAMED_KEYS: &[(&str, u16)] = &[
    ("Space", 0x20),
    ("Enter", 0x0D),
    ("Escape", 0x1B),
    ("Tab", 0x09),
    ("Backspace", 0x08),
    ("Shift", 0x10),
    ("Ctrl", 0x11),
    ("Alt", 0x12),
    ("CapsLock", 0x14),
    ("Up", 0x26),
    ("Down", 0x28),
    ("Left", 0x25),
    ("Right", 0x27),
    ("Home", 0x24),
    ("End", 0x23),
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    ("Comma", 0xBC),
    ("Period", 0xBE),
    ("Slash", 0xBF),
    ("Semicolon", 0xBA),
];

/// Parses a binding name (`"Space"`, `"W"`, `"F5"`, `"Numpad4"`,
/// `"ControllerA"`, or a hex literal such as `"0x20"`).
#[must_use]
pub fn parse_bind_code(name: &str) -> Option<BindCode> {
    let name = name.trim();

    if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }

    if let Some(code) = ControllerCode::ALL.iter().find(|c| c.name().eq_ignore_ascii_case(name)) {
        return Some(code.code());
    }

    if let Some((_, vk)) = NAMED_KEYS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        return Some(keyboard_code(*vk));
    }

    let bytes = name.as_bytes();
    if bytes.len() == 1 && bytes[0].is_ascii_alphanumeric() {
        return Some(keyboard_code(u16::from(bytes[0].to_ascii_uppercase())));
    }

    if let Some(digit) = name.strip_prefix("Numpad").and_then(|d| d.parse::<u16>().ok()) {
        if digit <= 9 {
            return Some(keyboard_code(VK_NUMPAD0 + digit));
        }
    }

    if let Some(n) = name.strip_prefix('F').and_then(|d| d.parse::<u16>().ok()) {
        if (1..=12).contains(&n) {
            return Some(keyboard_code(0x70 + n - 1));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numpad_folds_onto_digits() {
        assert_eq!(normalize_virtual_key(0x60), 0x30);
        assert_eq!(normalize_virtual_key(0x69), 0x39);
        assert_eq!(normalize_virtual_key(0x6A), 0x6A);
        assert_eq!(keyboard_code(0x64), keyboard_code(0x34));
    }

    #[test]
    fn test_scan_table() {
        assert_eq!(virtual_key_from_scan(0x39), Some(0x20));
        assert_eq!(virtual_key_from_scan(0x11), Some(u16::from(b'W')));
        assert_eq!(virtual_key_from_scan(0x0B), Some(0x30));
        assert_eq!(virtual_key_from_scan(0xE048), Some(0x26));
        assert_eq!(virtual_key_from_scan(0x48), Some(0x26));
        assert_eq!(virtual_key_from_scan(0x44), Some(0x79));
        assert_eq!(virtual_key_from_scan(0xFFFF), None);
    }

    #[test]
    fn test_parse_bind_code() {
        assert_eq!(parse_bind_code("Space"), Some(0x20));
        assert_eq!(parse_bind_code("w"), Some(u64::from(b'W')));
        assert_eq!(parse_bind_code("Numpad4"), Some(0x34));
        assert_eq!(parse_bind_code("F1"), Some(0x70));
        assert_eq!(parse_bind_code("0x41"), Some(0x41));
        assert_eq!(parse_bind_code("ControllerA"), Some(ControllerCode::A.code()));
        assert_eq!(parse_bind_code("NotAKey"), None);
    }

    #[test]
    fn test_controller_codes_do_not_overlap_keyboard() {
        for code in ControllerCode::ALL {
            assert!(code.code() > 0xFF);
        }
    }
}
