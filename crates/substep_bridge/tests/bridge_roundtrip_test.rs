//! # Bridge Round-Trip Verification Tests
//!
//! Drives a helper against fake device nodes and drains the shared segment
//! from the host side:
//! 1. Key presses reach the host as scan-code records and translate to events
//! 2. Releasing the watchdog stops the helper
//! 3. A helper without devices leaves the marker and the host warns once
//! 4. A keyboard plugged in while the helper runs is forwarded before any
//!    periodic rescan
//!
//! Run with: cargo test -p substep_bridge --test bridge_roundtrip_test

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use substep_bridge::helper::watch_host;
use substep_bridge::{
    BoundedChannel, BridgeHelper, BridgeRecord, DiagnosticLatch, DiagnosticSink, HelperConfig,
    HelperExit, HostTranslator, SharedRing,
};
use input_linux_sys::EV_KEY;
use substep_capture::evdev::EvdevEvent;
use substep_capture::HubConfig;
use substep_core::{
    Action, BindSlot, KeybindSnapshot, KeybindTable, ManualScheduler, PlayerSlot, Transition,
};

const KEY_SPACE: u16 = 57;
const KEY_A: u16 = 30;

fn keyboard_bytes(events: &[(u16, i32)]) -> Vec<u8> {
    events
        .iter()
        .enumerate()
        .flat_map(|(i, (code, value))| {
            EvdevEvent {
                tv_sec: 1_700_000_000,
                tv_usec: i64::try_from(i).unwrap() * 2_000,
                kind: u16::try_from(EV_KEY).unwrap(),
                code: *code,
                value: *value,
            }
            .to_bytes()
        })
        .collect()
}

fn fake_keyboard_sysfs(root: &Path, node: &str) {
    let device = root.join("sys").join(node).join("device");
    std::fs::create_dir_all(device.join("id")).unwrap();
    std::fs::create_dir_all(device.join("capabilities")).unwrap();
    std::fs::write(device.join("name"), "Fake Keyboard\n").unwrap();
    std::fs::write(device.join("id/bustype"), "0011\n").unwrap();
    std::fs::write(device.join("capabilities/ev"), "120013").unwrap();
    std::fs::write(device.join("capabilities/key"), "40000000").unwrap();
}

fn fake_keyboard(root: &Path, node: &str, events: &[(u16, i32)]) {
    fake_keyboard_sysfs(root, node);
    std::fs::create_dir_all(root.join("dev")).unwrap();
    std::fs::write(root.join("dev").join(node), keyboard_bytes(events)).unwrap();
}

fn helper_config(root: &Path) -> HelperConfig {
    HelperConfig {
        hub: HubConfig {
            dev_root: root.join("dev"),
            sys_root: root.join("sys"),
            physical_only: true,
            read_batch: 8,
        },
        lock_timeout: Duration::from_millis(100),
        pass_interval: Duration::from_millis(1),
        rescan_interval: Duration::from_secs(86_400),
    }
}

fn drain_until(host: &SharedRing, wanted: usize) -> Vec<BridgeRecord> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut records = Vec::new();
    while records.len() < wanted && Instant::now() < deadline {
        if let Some(batch) = host.drain(Duration::from_millis(1)).unwrap() {
            records.extend(batch);
        }
        thread::sleep(Duration::from_millis(1));
    }
    records
}

// =============================================================================
// FORWARDING
// =============================================================================

#[test]
fn verify_key_presses_reach_host() {
    let dir = tempfile::tempdir().unwrap();
    fake_keyboard(dir.path(), "event0", &[(KEY_SPACE, 1), (KEY_SPACE, 2), (KEY_SPACE, 0)]);
    let path = dir.path().join("bridge.shm");

    let host = SharedRing::create(&path).unwrap();
    let hold = host.hold_watchdog();
    let helper_ring = SharedRing::open(&path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let helper_stop = Arc::clone(&stop);
    let config = helper_config(dir.path());
    let helper = thread::spawn(move || {
        let mut helper = BridgeHelper::new(Arc::new(helper_ring), config);
        let exit = helper.run(&mut ManualScheduler::new(), &helper_stop).unwrap();
        (exit, helper.stats())
    });

    let records = drain_until(&host, 2);
    stop.store(true, Ordering::Release);
    let (exit, stats) = helper.join().unwrap();
    drop(hold);

    assert_eq!(exit, HelperExit::Stopped);
    assert_eq!(stats.written, 2);
    assert_eq!(stats.filtered, 1, "auto-repeat is not forwarded");
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| { r.code } == 0x39));

    let mut table = KeybindTable::new();
    table.bind(BindSlot::P1Jump, 0x20);
    let keybinds = KeybindSnapshot::new();
    keybinds.replace(table);

    let events = HostTranslator::new().translate(&records, &keybinds, false);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, Action::Jump);
    assert_eq!(events[0].player, PlayerSlot::P1);
    assert_eq!(events[0].transition, Transition::Press);
    assert_eq!(events[1].transition, Transition::Release);
    // Two events apart in the file: 4 ms in 100 ns ticks.
    assert_eq!(
        events[1].timestamp.ticks() - events[0].timestamp.ticks(),
        40_000
    );
}

// =============================================================================
// HOT-PLUG
// =============================================================================

#[test]
fn verify_hotplugged_keyboard_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    fake_keyboard(dir.path(), "event0", &[(KEY_SPACE, 1)]);
    let path = dir.path().join("bridge.shm");

    let host = SharedRing::create(&path).unwrap();
    let hold = host.hold_watchdog();
    let helper_ring = SharedRing::open(&path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let helper_stop = Arc::clone(&stop);
    // The periodic rescan never comes due during the test.
    let config = helper_config(dir.path());
    let helper = thread::spawn(move || {
        let mut helper = BridgeHelper::new(Arc::new(helper_ring), config);
        helper.run(&mut ManualScheduler::new(), &helper_stop).unwrap();
        helper.device_count()
    });

    // The helper is running once the first keyboard's press arrives.
    assert_eq!(drain_until(&host, 1).len(), 1);

    // Stage the node outside the watched directory, then move it in whole.
    fake_keyboard_sysfs(dir.path(), "event1");
    let staged = dir.path().join("event1.staged");
    std::fs::write(&staged, keyboard_bytes(&[(KEY_A, 1)])).unwrap();
    std::fs::rename(&staged, dir.path().join("dev/event1")).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut plugged = None;
    while plugged.is_none() && Instant::now() < deadline {
        if let Some(batch) = host.drain(Duration::from_millis(1)).unwrap() {
            plugged = batch.into_iter().find(|r| { r.code } == 0x1E);
        }
        thread::sleep(Duration::from_millis(1));
    }
    stop.store(true, Ordering::Release);
    let devices = helper.join().unwrap();
    drop(hold);

    let record = plugged.expect("hot-plugged keyboard was not forwarded");
    assert_eq!({ record.value }, 1);
    assert!(devices >= 1);
}

// =============================================================================
// WATCHDOG
// =============================================================================

#[test]
fn verify_released_watchdog_stops_helper() {
    let dir = tempfile::tempdir().unwrap();
    fake_keyboard(dir.path(), "event0", &[]);
    let path = dir.path().join("bridge.shm");

    let host = SharedRing::create(&path).unwrap();
    let hold = host.hold_watchdog();
    let helper_ring = SharedRing::open(&path).unwrap();
    assert!(helper_ring.host_alive());

    let stop = Arc::new(AtomicBool::new(false));
    watch_host(helper_ring.clone(), Duration::from_millis(1), Arc::clone(&stop)).unwrap();

    let helper_stop = Arc::clone(&stop);
    let config = helper_config(dir.path());
    let helper = thread::spawn(move || {
        let mut helper = BridgeHelper::new(Arc::new(helper_ring), config);
        helper.run(&mut ManualScheduler::new(), &helper_stop).unwrap()
    });

    thread::sleep(Duration::from_millis(20));
    assert!(!stop.load(Ordering::Acquire));
    drop(hold);

    assert_eq!(helper.join().unwrap(), HelperExit::Stopped);
    assert!(stop.load(Ordering::Acquire));
}

// =============================================================================
// NO DEVICES
// =============================================================================

#[derive(Default)]
struct Popups(Mutex<Vec<String>>);

impl DiagnosticSink for Popups {
    fn show(&self, message: &str) {
        self.0.lock().push(message.to_string());
    }
}

#[test]
fn verify_missing_devices_surface_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("dev")).unwrap();
    let path = dir.path().join("bridge.shm");

    let host = SharedRing::create(&path).unwrap();
    let helper_ring = SharedRing::open(&path).unwrap();
    let mut helper = BridgeHelper::new(Arc::new(helper_ring), helper_config(dir.path()));
    let exit = helper
        .run(&mut ManualScheduler::new(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(exit, HelperExit::NoDevices);

    let latch = DiagnosticLatch::new();
    let popups = Popups::default();
    for _ in 0..3 {
        let marked = host.peek_no_devices(Duration::from_millis(5)).unwrap();
        assert_eq!(marked, Some(true));
        // Frame drains keep working and never return the marker.
        assert!(host.drain(Duration::from_millis(5)).unwrap().unwrap().is_empty());
        latch.raise(&popups, false);
    }
    assert_eq!(popups.0.lock().len(), 1);
}
