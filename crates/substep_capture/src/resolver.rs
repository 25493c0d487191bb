//! # Signal Resolution
//!
//! Turns a physical signal into zero or one logical event.
//!
//! ```text
//!   RawSignal ──held dedupe──> BindCode ──KeybindSnapshot──> (Action, PlayerSlot)
//! ```
//!
//! Held tracking covers every key, bound or not. A press of an already-held
//! code is an auto-repeat and is dropped. A release always clears the held
//! flag and is always forwarded, even if the press was never seen, so a
//! key can never get stuck down.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use substep_core::keymap::keyboard_code;
use substep_core::{Action, BindCode, KeybindSnapshot, PlayerSlot, Transition};

use crate::source::{MouseButton, RawSignal};

/// Live switches read by capture threads without taking a lock.
#[derive(Debug, Default)]
pub struct CaptureFlags {
    /// Feature disabled; capture threads idle.
    pub soft_toggle: AtomicBool,
    /// Secondary mouse button drives player 2 jump.
    pub right_click: AtomicBool,
    /// Elevated thread priority requested.
    pub thread_priority: AtomicBool,
}

impl CaptureFlags {
    /// Flags with every switch off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether capture is soft-toggled off.
    #[must_use]
    pub fn is_soft_toggled(&self) -> bool {
        self.soft_toggle.load(Ordering::Acquire)
    }

    /// Whether the secondary mouse button is bound.
    #[must_use]
    pub fn right_click(&self) -> bool {
        self.right_click.load(Ordering::Acquire)
    }
}

/// Receives secondary mouse button transitions for an alternate binding
/// system.
pub trait AltBindSink: Send + Sync {
    /// Posts one transition.
    fn post(&self, button: MouseButton, transition: Transition);
}

/// Outcome of resolving one signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Enqueue this event.
    Event {
        /// Logical action.
        action: Action,
        /// Owning player.
        player: PlayerSlot,
        /// Press or release.
        transition: Transition,
    },
    /// Press of an already-held code.
    Duplicate,
    /// No binding matches.
    Unbound,
    /// Not an input transition at all.
    Ignored,
}

/// Physical codes currently held down.
#[derive(Clone, Debug, Default)]
pub struct HeldInputs {
    codes: HashSet<BindCode>,
}

impl HeldInputs {
    /// Nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `code` held. Returns false if it already was.
    pub fn press(&mut self, code: BindCode) -> bool {
        self.codes.insert(code)
    }

    /// Clears `code`. Returns whether it was held.
    pub fn release(&mut self, code: BindCode) -> bool {
        self.codes.remove(&code)
    }

    /// Whether `code` is held.
    #[must_use]
    pub fn contains(&self, code: BindCode) -> bool {
        self.codes.contains(&code)
    }

    /// Number of held codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True when nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Iterates over held codes.
    pub fn iter(&self) -> impl Iterator<Item = BindCode> + '_ {
        self.codes.iter().copied()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.codes.clear();
    }
}

/// Per-thread resolver. Owns its held set; never shared.
pub struct SignalResolver {
    held: HeldInputs,
    alt_sink: Option<Arc<dyn AltBindSink>>,
}

impl SignalResolver {
    /// A resolver with nothing held.
    #[must_use]
    pub fn new(alt_sink: Option<Arc<dyn AltBindSink>>) -> Self {
        Self {
            held: HeldInputs::new(),
            alt_sink,
        }
    }

    /// Resolves one raw signal.
    pub fn resolve(
        &mut self,
        signal: RawSignal,
        keybinds: &KeybindSnapshot,
        right_click: bool,
    ) -> Resolution {
        match signal {
            RawSignal::Key { vk, pressed } => {
                self.resolve_code(keyboard_code(vk), pressed, keybinds)
            }
            RawSignal::Mouse { button, pressed } => self.resolve_mouse(button, pressed, right_click),
            RawSignal::MouseMotion => Resolution::Ignored,
        }
    }

    /// Resolves a binding code transition with held tracking.
    pub fn resolve_code(
        &mut self,
        code: BindCode,
        pressed: bool,
        keybinds: &KeybindSnapshot,
    ) -> Resolution {
        if pressed && !self.held.press(code) {
            return Resolution::Duplicate;
        }
        if !pressed {
            self.held.release(code);
        }

        match keybinds.resolve(code) {
            Some((action, player)) => Resolution::Event {
                action,
                player,
                transition: Transition::from_pressed(pressed),
            },
            None => Resolution::Unbound,
        }
    }

    fn resolve_mouse(&mut self, button: MouseButton, pressed: bool, right_click: bool) -> Resolution {
        let transition = Transition::from_pressed(pressed);
        match button {
            MouseButton::Primary => Resolution::Event {
                action: Action::Jump,
                player: PlayerSlot::P1,
                transition,
            },
            MouseButton::Secondary => {
                if let Some(sink) = &self.alt_sink {
                    sink.post(button, transition);
                }
                if right_click {
                    Resolution::Event {
                        action: Action::Jump,
                        player: PlayerSlot::P2,
                        transition,
                    }
                } else {
                    Resolution::Unbound
                }
            }
            MouseButton::Other(_) => Resolution::Unbound,
        }
    }

    /// Held codes.
    #[must_use]
    pub const fn held(&self) -> &HeldInputs {
        &self.held
    }

    /// Forgets held state, e.g. after an idle period.
    pub fn clear_held(&mut self) {
        self.held.clear();
    }
}

impl std::fmt::Debug for SignalResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalResolver")
            .field("held", &self.held.len())
            .field("alt_sink", &self.alt_sink.is_some())
            .finish()
    }
}
