//! One-shot user notification for an unusable bridge.

use std::sync::atomic::{AtomicBool, Ordering};

/// Text shown when the helper could not open any input device.
pub const NO_DEVICES_MESSAGE: &str = "No input devices could be opened by the input helper. \
Add your user to the `input` group (or grant read access to /dev/input/event*) and restart.";

/// Where diagnostics are surfaced. The host shows them without blocking.
pub trait DiagnosticSink: Send + Sync {
    /// Shows `message` to the user.
    fn show(&self, message: &str);
}

/// Fires at most once until re-armed.
#[derive(Debug, Default)]
pub struct DiagnosticLatch {
    fired: AtomicBool,
}

impl DiagnosticLatch {
    /// An armed latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Shows [`NO_DEVICES_MESSAGE`] on `sink` the first time this is called
    /// while not soft-toggled. Returns whether it fired now.
    pub fn raise(&self, sink: &dyn DiagnosticSink, soft_toggled: bool) -> bool {
        if soft_toggled || self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::error!("Input helper reported no accessible devices");
        sink.show(NO_DEVICES_MESSAGE);
        true
    }

    /// Arms the latch again, for a new session.
    pub fn rearm(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Whether the latch has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Popups(Mutex<Vec<String>>);

    impl DiagnosticSink for Popups {
        fn show(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    #[test]
    fn test_fires_once_and_not_while_toggled() {
        let latch = DiagnosticLatch::new();
        let popups = Popups::default();

        assert!(!latch.raise(&popups, true));
        assert!(!latch.has_fired());
        assert!(latch.raise(&popups, false));
        assert!(!latch.raise(&popups, false));
        assert_eq!(popups.0.lock().len(), 1);
        assert!(latch.has_fired());

        latch.rearm();
        assert!(latch.raise(&popups, false));
        assert_eq!(popups.0.lock().len(), 2);
    }
}
