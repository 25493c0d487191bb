//! # Settings
//!
//! User-facing switches, loaded from TOML and observable at runtime.
//!
//! ```toml
//! soft_toggle = false
//! late_cutoff = true
//! right_click = true
//! clock = "native"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::queue::DrainPolicy;
use crate::time::ClockDomain;

/// Names accepted by the boolean accessors.
pub const BOOL_SETTINGS: [&str; 6] = [
    "soft_toggle",
    "late_cutoff",
    "actual_delta",
    "thread_priority",
    "right_click",
    "compatibility_bridge",
];

/// All runtime switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feature disabled without stopping any thread.
    pub soft_toggle: bool,
    /// Late instead of early cutoff when draining inputs.
    pub late_cutoff: bool,
    /// Step count from the real frame delta.
    pub actual_delta: bool,
    /// Ask for elevated priority on capture threads.
    pub thread_priority: bool,
    /// Secondary mouse button drives player 2 jump.
    pub right_click: bool,
    /// Capture through the helper process instead of natively.
    pub compatibility_bridge: bool,
    /// Preferred clock domain.
    pub clock: ClockDomain,
    /// Idle wait while soft-toggled, milliseconds.
    pub idle_interval_ms: u64,
    /// Controller polling cadence, microseconds.
    pub controller_poll_interval_us: u64,
    /// Per-frame bridge lock timeout, milliseconds.
    pub bridge_lock_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            soft_toggle: false,
            late_cutoff: false,
            actual_delta: false,
            thread_priority: false,
            right_click: false,
            compatibility_bridge: false,
            clock: ClockDomain::Native,
            idle_interval_ms: 2_000,
            controller_poll_interval_us: 500,
            bridge_lock_timeout_ms: 1,
        }
    }
}

impl Settings {
    /// Parses a settings file body.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the TOML is malformed.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    /// Reads a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigIo`] or [`CoreError::InvalidConfig`].
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string(self).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    /// Drain policy selected by `late_cutoff`.
    #[must_use]
    pub const fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy::from_late_cutoff(self.late_cutoff)
    }

    /// Clock domain to run in. The bridge helper stamps in the
    /// compatibility domain, so the bridge forces it.
    #[must_use]
    pub const fn clock_domain(&self) -> ClockDomain {
        if self.compatibility_bridge {
            ClockDomain::Compatibility
        } else {
            self.clock
        }
    }

    /// Idle wait while soft-toggled.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Controller polling cadence.
    #[must_use]
    pub const fn controller_poll_interval(&self) -> Duration {
        Duration::from_micros(self.controller_poll_interval_us)
    }

    /// Bridge lock timeout.
    #[must_use]
    pub const fn bridge_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_lock_timeout_ms)
    }

    /// Reads a boolean switch by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSetting`] for names outside [`BOOL_SETTINGS`].
    pub fn get_bool(&self, name: &str) -> CoreResult<bool> {
        Ok(match name {
            "soft_toggle" => self.soft_toggle,
            "late_cutoff" => self.late_cutoff,
            "actual_delta" => self.actual_delta,
            "thread_priority" => self.thread_priority,
            "right_click" => self.right_click,
            "compatibility_bridge" => self.compatibility_bridge,
            _ => return Err(CoreError::UnknownSetting(name.to_string())),
        })
    }

    /// Writes a boolean switch by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSetting`] for names outside [`BOOL_SETTINGS`].
    pub fn set_bool(&mut self, name: &str, value: bool) -> CoreResult<()> {
        let field = match name {
            "soft_toggle" => &mut self.soft_toggle,
            "late_cutoff" => &mut self.late_cutoff,
            "actual_delta" => &mut self.actual_delta,
            "thread_priority" => &mut self.thread_priority,
            "right_click" => &mut self.right_click,
            "compatibility_bridge" => &mut self.compatibility_bridge,
            _ => return Err(CoreError::UnknownSetting(name.to_string())),
        };
        *field = value;
        Ok(())
    }
}

type SettingCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Live settings with change notification.
pub struct SettingsStore {
    current: RwLock<Settings>,
    listeners: Mutex<Vec<(&'static str, SettingCallback)>>,
}

impl SettingsStore {
    /// A store holding `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(settings),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    /// Reads a boolean switch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSetting`] for unknown names.
    pub fn get_bool(&self, name: &str) -> CoreResult<bool> {
        self.current.read().get_bool(name)
    }

    /// Writes a boolean switch and notifies listeners if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSetting`] for unknown names.
    pub fn set_bool(&self, name: &str, value: bool) -> CoreResult<()> {
        let changed = {
            let mut current = self.current.write();
            let before = current.get_bool(name)?;
            current.set_bool(name, value)?;
            before != value
        };
        if changed {
            self.notify(name, value);
        }
        Ok(())
    }

    /// Replaces everything, notifying listeners of each changed switch.
    pub fn replace(&self, settings: Settings) {
        let before = std::mem::replace(&mut *self.current.write(), settings.clone());
        for name in BOOL_SETTINGS {
            let (old, new) = (before.get_bool(name), settings.get_bool(name));
            if let (Ok(old), Ok(new)) = (old, new) {
                if old != new {
                    self.notify(name, new);
                }
            }
        }
    }

    /// Registers `callback` for changes of the switch `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSetting`] for unknown names.
    pub fn on_setting_changed(
        &self,
        name: &str,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> CoreResult<()> {
        let known = BOOL_SETTINGS
            .iter()
            .find(|known| **known == name)
            .ok_or_else(|| CoreError::UnknownSetting(name.to_string()))?;
        self.listeners.lock().push((*known, Arc::new(callback)));
        Ok(())
    }

    fn notify(&self, name: &str, value: bool) {
        let callbacks: Vec<SettingCallback> = self
            .listeners
            .lock()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        tracing::debug!("Setting {} changed to {}", name, value);
        for callback in callbacks {
            callback(value);
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &*self.current.read())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defaults_fill_missing_keys() {
        let settings = Settings::from_toml_str("late_cutoff = true\n").unwrap();
        assert!(settings.late_cutoff);
        assert_eq!(settings.idle_interval_ms, 2_000);
        assert_eq!(settings.controller_poll_interval(), Duration::from_micros(500));
        assert_eq!(settings.drain_policy(), DrainPolicy::Late);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let original = Settings {
            right_click: true,
            clock: ClockDomain::Compatibility,
            ..Settings::default()
        };
        file.write_all(original.to_toml_string().unwrap().as_bytes()).unwrap();
        let loaded = Settings::load(file.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_bad_toml_is_invalid_config() {
        assert!(matches!(
            Settings::from_toml_str("late_cutoff = maybe"),
            Err(CoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::load("/nonexistent/substep.toml"),
            Err(CoreError::ConfigIo { .. })
        ));
    }

    #[test]
    fn test_bridge_forces_compatibility_clock() {
        let settings = Settings {
            compatibility_bridge: true,
            ..Settings::default()
        };
        assert_eq!(settings.clock_domain(), ClockDomain::Compatibility);
    }

    #[test]
    fn test_change_callbacks() {
        let store = SettingsStore::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        store
            .on_setting_changed("soft_toggle", move |value| {
                assert!(value);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        store.set_bool("soft_toggle", true).unwrap();
        // Unchanged value does not notify.
        store.set_bool("soft_toggle", true).unwrap();
        store.set_bool("right_click", true).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(store.on_setting_changed("nope", |_| {}).is_err());
        assert!(store.set_bool("nope", true).is_err());
    }

    #[test]
    fn test_replace_notifies_changed_switches() {
        let store = SettingsStore::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        store
            .on_setting_changed("late_cutoff", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        store.replace(Settings {
            late_cutoff: true,
            ..Settings::default()
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(store.snapshot().late_cutoff);
    }
}
