//! # Capture Thread Verification Tests
//!
//! Runs the listener and the controller poller against one queue and
//! checks what the frame side drains:
//!
//! 1. **Fan-in**: both producers land in the same FIFO
//! 2. **Rebinding**: a keybind swap takes effect for the next signal
//!
//! Run with: cargo test --package substep_capture --test capture_threads_test

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use substep_capture::controller::buttons;
use substep_capture::{
    CaptureContext, CaptureFlags, ChannelSource, ControllerPoller, GamepadReader, GamepadState,
    Listener, ListenerConfig, PollerConfig, RawSignal, ScriptedReader,
};
use substep_core::keymap::keyboard_code;
use substep_core::{
    Action, BindSlot, ControllerCode, InputQueue, KeybindSnapshot, KeybindTable, ManualClock,
    ManualScheduler, PlayerSlot, Transition,
};

fn context() -> CaptureContext {
    let mut table = KeybindTable::new();
    table.bind(BindSlot::P1Jump, keyboard_code(0x20));
    table.bind(BindSlot::P2Jump, ControllerCode::A.code());
    let keybinds = KeybindSnapshot::new();
    keybinds.replace(table);
    CaptureContext {
        queue: Arc::new(InputQueue::new()),
        keybinds: Arc::new(keybinds),
        clock: Arc::new(ManualClock::new(500)),
        flags: Arc::new(CaptureFlags::new()),
    }
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
}

// ============================================================================
// FAN-IN
// ============================================================================

#[test]
fn verify_listener_and_poller_share_queue() {
    let ctx = context();

    let (tx, source) = ChannelSource::pair();
    let listener = Listener::spawn(
        Box::new(source),
        ctx.clone(),
        Box::new(ManualScheduler::new()),
        None,
        ListenerConfig::testing(),
    )
    .unwrap();

    let pressed = GamepadState {
        buttons: buttons::A,
        ..GamepadState::default()
    };
    let reader = ScriptedReader::new(vec![vec![pressed], vec![GamepadState::default()]]);
    let poller = ControllerPoller::spawn(
        Box::new(move || Ok(Box::new(reader) as Box<dyn GamepadReader>)),
        ctx.clone(),
        Box::new(ManualScheduler::new()),
        PollerConfig::default(),
    )
    .unwrap();

    tx.send(RawSignal::Key { vk: 0x20, pressed: true });
    tx.send(RawSignal::Key { vk: 0x20, pressed: false });

    wait_until(|| ctx.queue.len() >= 4);
    drop(tx);
    wait_until(|| listener.is_finished() && poller.is_finished());

    let events = ctx.queue.drain_all();
    assert_eq!(events.len(), 4);

    let keyboard: Vec<_> = events.iter().filter(|e| e.player == PlayerSlot::P1).collect();
    let pad: Vec<_> = events.iter().filter(|e| e.player == PlayerSlot::P2).collect();
    assert_eq!(keyboard.len(), 2);
    assert_eq!(pad.len(), 2);
    // Per-producer order survives the shared lock.
    assert_eq!(keyboard[0].transition, Transition::Press);
    assert_eq!(keyboard[1].transition, Transition::Release);
    assert_eq!(pad[0].transition, Transition::Press);
    assert_eq!(pad[1].transition, Transition::Release);
    assert!(events.iter().all(|e| e.action == Action::Jump));
}

// ============================================================================
// REBINDING
// ============================================================================

#[test]
fn verify_rebind_applies_to_next_signal() {
    let ctx = context();
    let (tx, source) = ChannelSource::pair();
    let listener = Listener::spawn(
        Box::new(source),
        ctx.clone(),
        Box::new(ManualScheduler::new()),
        None,
        ListenerConfig::testing(),
    )
    .unwrap();

    let w = keyboard_code(u16::from(b'W'));
    tx.send(RawSignal::Key { vk: u16::from(b'W'), pressed: true });
    wait_until(|| listener.stats().signals.load(std::sync::atomic::Ordering::Relaxed) >= 1);
    assert!(ctx.queue.is_empty());

    let mut table = KeybindTable::new();
    table.bind(BindSlot::P1Right, w);
    ctx.keybinds.replace(table);

    tx.send(RawSignal::Key { vk: u16::from(b'W'), pressed: false });
    wait_until(|| !ctx.queue.is_empty());
    listener.stop();

    let events = ctx.queue.drain_all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, Action::Right);
    assert_eq!(events[0].transition, Transition::Release);
}
