//! # Keybinding Snapshot
//!
//! Maps the six logical slots (two players × jump/left/right) to sets of
//! binding codes.
//!
//! ```text
//!   BindingProvider ──rebuild()──> [local table] ──swap under lock──> KeybindSnapshot
//!                                                                        │
//!                                       Listener ──resolve(code)─────────┘
//! ```
//!
//! The table is rebuilt in full off-lock and swapped in a single write, so a
//! reader always sees either the old or the new table, never a mix.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::{Action, PlayerSlot};
use crate::keymap::{parse_bind_code, BindCode};

/// One of the six logical binding slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindSlot {
    /// Player 1 jump.
    P1Jump = 0,
    /// Player 1 left.
    P1Left = 1,
    /// Player 1 right.
    P1Right = 2,
    /// Player 2 jump.
    P2Jump = 3,
    /// Player 2 left.
    P2Left = 4,
    /// Player 2 right.
    P2Right = 5,
}

impl BindSlot {
    /// Resolution order: player 1 before player 2, jump before left before right.
    pub const ALL: [Self; 6] = [
        Self::P1Jump,
        Self::P1Left,
        Self::P1Right,
        Self::P2Jump,
        Self::P2Left,
        Self::P2Right,
    ];

    /// Action of the slot.
    #[must_use]
    pub const fn action(self) -> Action {
        match self {
            Self::P1Jump | Self::P2Jump => Action::Jump,
            Self::P1Left | Self::P2Left => Action::Left,
            Self::P1Right | Self::P2Right => Action::Right,
        }
    }

    /// Player of the slot.
    #[must_use]
    pub const fn player(self) -> PlayerSlot {
        match self {
            Self::P1Jump | Self::P1Left | Self::P1Right => PlayerSlot::P1,
            Self::P2Jump | Self::P2Left | Self::P2Right => PlayerSlot::P2,
        }
    }

    /// Slot for an index in `0..6`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SlotOutOfRange`] for any other index.
    pub fn from_index(index: usize) -> CoreResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(CoreError::SlotOutOfRange(index))
    }
}

/// The six slots' code sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeybindTable {
    slots: [HashSet<BindCode>; 6],
}

impl KeybindTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `code` to `slot`.
    pub fn bind(&mut self, slot: BindSlot, code: BindCode) {
        self.slots[slot as usize].insert(code);
    }

    /// Codes bound to `slot`.
    #[must_use]
    pub fn codes(&self, slot: BindSlot) -> &HashSet<BindCode> {
        &self.slots[slot as usize]
    }

    /// First slot (in resolution order) that binds `code`.
    #[must_use]
    pub fn resolve(&self, code: BindCode) -> Option<(Action, PlayerSlot)> {
        BindSlot::ALL
            .iter()
            .find(|slot| self.slots[**slot as usize].contains(&code))
            .map(|slot| (slot.action(), slot.player()))
    }

    /// True when no slot binds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(HashSet::is_empty)
    }
}

/// The external keybinding configuration.
pub trait BindingProvider {
    /// Every binding code currently assigned to `slot`.
    fn bindings_for(&self, slot: BindSlot) -> Vec<BindCode>;
}

/// Lock-protected current table.
#[derive(Debug, Default)]
pub struct KeybindSnapshot {
    table: RwLock<KeybindTable>,
    generation: AtomicU64,
}

impl KeybindSnapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries every slot from `provider` and swaps the result in.
    pub fn rebuild(&self, provider: &dyn BindingProvider) {
        let mut table = KeybindTable::new();
        for slot in BindSlot::ALL {
            for code in provider.bindings_for(slot) {
                table.bind(slot, code);
            }
        }
        self.replace(table);
    }

    /// Swaps in a prepared table.
    pub fn replace(&self, table: KeybindTable) {
        *self.table.write() = table;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Keybinds rebuilt (generation {})", generation);
    }

    /// A consistent copy of the whole table.
    #[must_use]
    pub fn read(&self) -> KeybindTable {
        self.table.read().clone()
    }

    /// Resolves a code while holding the read lock only for the lookup.
    #[must_use]
    pub fn resolve(&self, code: BindCode) -> Option<(Action, PlayerSlot)> {
        self.table.read().resolve(code)
    }

    /// Number of completed rebuilds.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Binding file contents, one list of names per slot.
///
/// ```toml
/// p1_jump = ["Space", "W", "Up", "ControllerA"]
/// p1_left = ["A"]
/// p1_right = ["D"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Player 1 jump.
    pub p1_jump: Vec<String>,
    /// Player 1 left.
    pub p1_left: Vec<String>,
    /// Player 1 right.
    pub p1_right: Vec<String>,
    /// Player 2 jump.
    pub p2_jump: Vec<String>,
    /// Player 2 left.
    pub p2_left: Vec<String>,
    /// Player 2 right.
    pub p2_right: Vec<String>,
}

impl BindingConfig {
    /// Parses a binding file body.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the TOML is malformed.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    /// Reads a binding file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigIo`] if the file cannot be read, or
    /// [`CoreError::InvalidConfig`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    fn names(&self, slot: BindSlot) -> &[String] {
        match slot {
            BindSlot::P1Jump => &self.p1_jump,
            BindSlot::P1Left => &self.p1_left,
            BindSlot::P1Right => &self.p1_right,
            BindSlot::P2Jump => &self.p2_jump,
            BindSlot::P2Left => &self.p2_left,
            BindSlot::P2Right => &self.p2_right,
        }
    }
}

impl BindingProvider for BindingConfig {
    fn bindings_for(&self, slot: BindSlot) -> Vec<BindCode> {
        self.names(slot)
            .iter()
            .filter_map(|name| {
                let code = parse_bind_code(name);
                if code.is_none() {
                    tracing::warn!("Ignoring unknown binding name: {}", name);
                }
                code
            })
            .collect()
    }
}
