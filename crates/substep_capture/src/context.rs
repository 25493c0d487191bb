//! Shared handles every capture thread needs.

use std::sync::Arc;

use substep_core::{InputEvent, InputQueue, KeybindSnapshot, TimestampSource};

use crate::resolver::{CaptureFlags, Resolution};

/// Handles to the pipeline state a capture thread writes into.
#[derive(Clone)]
pub struct CaptureContext {
    /// Destination queue.
    pub queue: Arc<InputQueue>,
    /// Current bindings.
    pub keybinds: Arc<KeybindSnapshot>,
    /// Stamps every event.
    pub clock: Arc<dyn TimestampSource>,
    /// Live switches.
    pub flags: Arc<CaptureFlags>,
}

impl CaptureContext {
    /// Enqueues `resolution` stamped now, if it is an event. Returns
    /// whether anything was enqueued.
    pub fn enqueue(&self, resolution: Resolution) -> bool {
        match resolution {
            Resolution::Event {
                action,
                player,
                transition,
            } => {
                self.queue
                    .push(InputEvent::new(self.clock.now(), action, transition, player));
                true
            }
            Resolution::Duplicate | Resolution::Unbound | Resolution::Ignored => false,
        }
    }
}

impl std::fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureContext")
            .field("queued", &self.queue.len())
            .field("keybind_generation", &self.keybinds.generation())
            .field("clock", &self.clock.domain())
            .field("flags", &self.flags)
            .finish()
    }
}
