//! # Input Pipeline
//!
//! One owned context per host: the queue, keybindings, clock, builder and
//! replay loop, plus whatever capture threads or bridge feed it.
//!
//! ## Frame Lifecycle
//!
//! ```text
//!   on_frame_start ───────────> intercept_physics_delta ───────> replay_step × N
//!   │ session edge?             │ inactive? ─> flush, skip        │ pop until boundary
//!   │ bridge drain + translate  │ policy ─> step count            │ advance(delta × weight)
//!   │ stamp frame start         │ build(N) ─> load replay         │ complete rotation
//! ```
//!
//! Pausing, dying, entering the editor, leaving the session and the soft
//! toggle all flush every buffered input so nothing leaks into a later,
//! unrelated session.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use substep_bridge::{BoundedChannel, DiagnosticLatch, DiagnosticSink, HostTranslator};
use substep_capture::{
    AltBindSink, CaptureContext, CaptureFlags, ControllerPoller, InputSource, Listener,
    ListenerConfig, PendingTimestamp, PollerConfig, ReaderFactory,
};
use substep_core::{
    Action, BindingProvider, Clock, ClockDomain, DrainPolicy, FramePlan, FrameTiming, InputEvent,
    InputQueue, InputSink, KeybindSnapshot, PlayerSlot, QuarterTickPolicy, ReplayLoop,
    ReplayState, Scheduler, Settings, SettingsStore, SkipReason, Step, StepBuilder,
    StepCountPolicy, TimestampSource, Transition,
};

use crate::error::{PipelineError, PipelineResult};
use crate::host::{HostSession, Simulation};

/// Frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames intercepted.
    pub frames: u64,
    /// Frames replayed as one whole step.
    pub skipped: u64,
    /// Sessions started.
    pub sessions: u64,
    /// Events received through the bridge.
    pub bridge_events: u64,
    /// Frames whose bridge drain found the lock busy.
    pub bridge_timeouts: u64,
    /// Platform-timestamped events enqueued.
    pub platform_events: u64,
}

struct BridgeLink {
    channel: Arc<dyn BoundedChannel>,
    translator: HostTranslator,
    latch: DiagnosticLatch,
    /// The no-devices marker still has to be checked this session.
    check_marker: bool,
    diagnostics: Arc<dyn DiagnosticSink>,
}

/// Owned input context driven by the host's frame loop.
pub struct InputPipeline {
    queue: Arc<InputQueue>,
    keybinds: Arc<KeybindSnapshot>,
    clock: Arc<dyn TimestampSource>,
    flags: Arc<CaptureFlags>,
    settings: Arc<SettingsStore>,
    policy: Option<Box<dyn StepCountPolicy>>,
    bindings: Option<Box<dyn BindingProvider + Send>>,
    builder: StepBuilder,
    replay: ReplayLoop,
    skip: Option<SkipReason>,
    in_session: bool,
    platform: Arc<PendingTimestamp>,
    bridge: Option<BridgeLink>,
    listener: Option<Listener>,
    poller: Option<ControllerPoller>,
    stats: PipelineStats,
}

impl InputPipeline {
    /// A pipeline on the clock `settings` selects.
    ///
    /// # Errors
    ///
    /// See [`InputPipeline::with_clock`].
    pub fn new(settings: Settings) -> PipelineResult<Self> {
        let clock = Arc::new(Clock::select(settings.clock_domain()));
        Self::with_clock(settings, clock)
    }

    /// A pipeline configured from a TOML settings file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Core`] if the file cannot be read or parsed.
    pub fn from_settings_file(path: impl AsRef<std::path::Path>) -> PipelineResult<Self> {
        let settings = Settings::load(path)?;
        tracing::info!(
            "Loaded settings (clock: {:?}, {})",
            settings.clock_domain(),
            settings.drain_policy().description()
        );
        Self::new(settings)
    }

    /// A pipeline stamping with `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Core`] if a setting listener cannot be
    /// registered.
    pub fn with_clock(settings: Settings, clock: Arc<dyn TimestampSource>) -> PipelineResult<Self> {
        let flags = Arc::new(CaptureFlags::new());
        flags.soft_toggle.store(settings.soft_toggle, Ordering::Release);
        flags.right_click.store(settings.right_click, Ordering::Release);
        flags.thread_priority.store(settings.thread_priority, Ordering::Release);

        let store = Arc::new(SettingsStore::new(settings));
        wire_flags(&store, &flags)?;
        store.on_setting_changed("late_cutoff", |late| {
            tracing::info!("{}", DrainPolicy::from_late_cutoff(late).description());
        })?;

        let platform = Arc::new(PendingTimestamp::new(clock.domain()));

        Ok(Self {
            queue: Arc::new(InputQueue::new()),
            keybinds: Arc::new(KeybindSnapshot::new()),
            clock,
            flags,
            settings: store,
            policy: None,
            bindings: None,
            builder: StepBuilder::new(),
            replay: ReplayLoop::new(),
            skip: None,
            in_session: false,
            platform,
            bridge: None,
            listener: None,
            poller: None,
            stats: PipelineStats::default(),
        })
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Replaces the default quarter-tick policy.
    pub fn set_step_policy(&mut self, policy: Box<dyn StepCountPolicy>) {
        self.policy = Some(policy);
    }

    /// Source of bindings, re-read at every session start.
    pub fn set_binding_provider(&mut self, provider: Box<dyn BindingProvider + Send>) {
        self.keybinds.rebuild(provider.as_ref());
        self.bindings = Some(provider);
    }

    /// Re-reads the keybinding configuration after it changed.
    pub fn rebuild_keybinds(&self, provider: &dyn BindingProvider) {
        self.keybinds.rebuild(provider);
    }

    /// Maps platform timestamps onto this pipeline's clock, given the
    /// platform time read now.
    pub fn anchor_platform_clock(&mut self, platform_now_ns: u64) {
        self.platform = Arc::new(PendingTimestamp::anchored(platform_now_ns, &*self.clock));
    }

    /// Handles capture threads write through.
    #[must_use]
    pub fn capture_context(&self) -> CaptureContext {
        CaptureContext {
            queue: Arc::clone(&self.queue),
            keybinds: Arc::clone(&self.keybinds),
            clock: Arc::clone(&self.clock),
            flags: Arc::clone(&self.flags),
        }
    }

    /// Starts the raw input listener on `source`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyRunning`] if a listener is running, or
    /// [`PipelineError::Capture`] if its thread cannot be spawned.
    pub fn start_listener(
        &mut self,
        source: Box<dyn InputSource>,
        scheduler: Box<dyn Scheduler>,
        alt_sink: Option<Arc<dyn AltBindSink>>,
    ) -> PipelineResult<()> {
        if self.listener.as_ref().is_some_and(|l| !l.is_finished()) {
            return Err(PipelineError::AlreadyRunning("listener"));
        }
        let config = ListenerConfig {
            idle_interval: self.settings.snapshot().idle_interval(),
            ..ListenerConfig::production()
        };
        let listener = Listener::spawn(source, self.capture_context(), scheduler, alt_sink, config)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Starts controller polling with the reader `factory` builds.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyRunning`] if a poller is running, or
    /// [`PipelineError::Capture`] if its thread cannot be spawned.
    pub fn start_controller_poller(
        &mut self,
        factory: ReaderFactory,
        scheduler: Box<dyn Scheduler>,
    ) -> PipelineResult<()> {
        if self.poller.as_ref().is_some_and(|p| !p.is_finished()) {
            return Err(PipelineError::AlreadyRunning("controller poller"));
        }
        let settings = self.settings.snapshot();
        let config = PollerConfig {
            interval: settings.controller_poll_interval(),
            idle_interval: settings.idle_interval(),
            ..PollerConfig::default()
        };
        self.poller = Some(ControllerPoller::spawn(
            factory,
            self.capture_context(),
            scheduler,
            config,
        )?);
        Ok(())
    }

    /// Receives input from a helper through `channel`. Records carry
    /// compatibility-domain timestamps, so the clock should be in that domain.
    pub fn attach_bridge(
        &mut self,
        channel: Arc<dyn BoundedChannel>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) {
        if self.clock.domain() != ClockDomain::Compatibility {
            tracing::warn!(
                "Bridge attached to a {:?} clock; event times will not line up",
                self.clock.domain()
            );
        }
        self.bridge = Some(BridgeLink {
            channel,
            translator: HostTranslator::new(),
            latch: DiagnosticLatch::new(),
            check_marker: true,
            diagnostics,
        });
    }

    // =========================================================================
    // Frame hooks
    // =========================================================================

    /// Frame-boundary hook, once per render tick.
    pub fn on_frame_start(&mut self, host: &dyn HostSession) {
        let in_session = host.is_in_simulation_session();
        if in_session && !self.in_session {
            self.begin_session();
        } else if !in_session && self.in_session {
            tracing::debug!("Session ended, flushing inputs");
            self.flush();
        }
        self.in_session = in_session;

        self.builder.mark_frame_start(self.clock.now());
        self.pump_bridge();
    }

    /// Physics-delta interception. Builds this frame's steps and returns
    /// the delta the host should continue with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Core`] if the step policy yields zero steps.
    pub fn intercept_physics_delta(
        &mut self,
        host: &dyn HostSession,
        modified_delta: f64,
        actual_delta: f64,
    ) -> PipelineResult<f64> {
        self.stats.frames += 1;
        self.replay.begin_frame();

        let timing = FrameTiming {
            modified_delta,
            actual_delta,
            time_warp: host.current_time_scale(),
        };

        if !host.is_active() || self.flags.is_soft_toggled() {
            self.queue.clear();
            self.platform.clear();
            let plan = self.builder.short_circuit();
            self.apply_plan(plan);
            return Ok(modified_delta);
        }

        let settings = self.settings.snapshot();
        let fallback = QuarterTickPolicy {
            use_actual_delta: settings.actual_delta,
        };
        let policy: &dyn StepCountPolicy = self.policy.as_deref().unwrap_or(&fallback);
        let delta = policy.effective_delta(&timing);

        let plan = match policy.step_count(&timing) {
            Some(count) => {
                self.builder
                    .build(count, &self.queue, settings.drain_policy(), &*self.clock)?
            }
            None => self.builder.skip_empty_frame(),
        };
        self.apply_plan(plan);
        Ok(delta)
    }

    fn apply_plan(&mut self, plan: FramePlan) {
        match plan {
            FramePlan::Subdivided(steps) => {
                self.skip = None;
                self.replay.load(steps);
            }
            FramePlan::Skip(reason) => {
                self.stats.skipped += 1;
                self.skip = Some(reason);
                self.replay.flush();
            }
        }
    }

    /// Next step for a host that drives the replay itself.
    pub fn pop(&mut self, sink: &mut dyn InputSink) -> Step {
        self.replay.pop(sink)
    }

    /// Runs one physics step: pops until a boundary, advancing `sim` by
    /// `time_factor * weight` per step. Returns the steps consumed.
    ///
    /// A skipped frame is one ordinary whole-step update.
    pub fn replay_step<S: Simulation>(&mut self, sim: &mut S, time_factor: f64) -> usize {
        if self.skip.is_some() || self.replay.state() != ReplayState::Replaying {
            sim.advance_sub_step(time_factor);
            return 1;
        }

        let mut consumed = 0;
        loop {
            let step = self.replay.pop(sim);
            consumed += 1;
            let delta = time_factor * step.weight;
            sim.advance_sub_step(delta);
            if step.is_boundary {
                break;
            }
            sim.check_collisions(delta);
            sim.update_rotation(delta);
        }
        sim.complete_fractional_rotation();
        consumed
    }

    /// Runs every physics step of the frame. Returns how many ran.
    pub fn replay_frame<S: Simulation>(&mut self, sim: &mut S, time_factor: f64) -> usize {
        if self.skip.is_some() || self.replay.state() != ReplayState::Replaying {
            self.replay_step(sim, time_factor);
            return 1;
        }
        let mut physics_steps = 0;
        while self.replay.state() == ReplayState::Replaying {
            self.replay_step(sim, time_factor);
            physics_steps += 1;
        }
        physics_steps
    }

    // =========================================================================
    // Platform-dispatched input
    // =========================================================================

    /// Stores the platform timestamp of the input about to be dispatched.
    pub fn store_platform_timestamp(&self, platform_ns: u64) {
        self.platform.store_nanos(platform_ns);
    }

    /// Button-queue hook: enqueues the input with its pending platform
    /// timestamp. Returns `false`, leaving the host to handle it, when no
    /// timestamp is pending or capture is soft-toggled.
    pub fn queue_platform_button(
        &mut self,
        action: Action,
        transition: Transition,
        player: PlayerSlot,
    ) -> bool {
        if self.flags.is_soft_toggled() {
            self.platform.clear();
            return false;
        }
        let Some(timestamp) = self.platform.take() else {
            return false;
        };
        self.queue
            .push(InputEvent::new(timestamp, action, transition, player));
        self.stats.platform_events += 1;
        true
    }

    // =========================================================================
    // Session state
    // =========================================================================

    fn begin_session(&mut self) {
        tracing::debug!("Session started");
        self.stats.sessions += 1;
        if let Some(provider) = &self.bindings {
            self.keybinds.rebuild(provider.as_ref());
        }
        if let Some(bridge) = &mut self.bridge {
            bridge.check_marker = true;
            bridge.latch.rearm();
        }
        self.flush();
    }

    /// Drops every buffered input and restarts first-frame handling.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.builder.reset();
        self.replay.flush();
        self.platform.clear();
        self.skip = None;
        if let Some(bridge) = &mut self.bridge {
            bridge.translator.reset();
        }
    }

    fn pump_bridge(&mut self) {
        let Some(bridge) = &mut self.bridge else {
            return;
        };
        let timeout = self.settings.snapshot().bridge_lock_timeout();
        let soft_toggled = self.flags.is_soft_toggled();

        if self.in_session && bridge.check_marker && !bridge.latch.has_fired() {
            match bridge.channel.peek_no_devices(timeout) {
                Ok(Some(marked)) => {
                    bridge.check_marker = false;
                    if marked {
                        bridge.latch.raise(bridge.diagnostics.as_ref(), soft_toggled);
                    }
                }
                // Busy: retry next frame.
                Ok(None) => {}
                Err(e) => tracing::error!("Failed to acquire bridge lock: {}", e),
            }
        }

        match bridge.channel.drain(timeout) {
            Ok(Some(records)) if soft_toggled => {
                tracing::trace!("Discarding {} bridge records while disabled", records.len());
            }
            Ok(Some(records)) => {
                let events =
                    bridge
                        .translator
                        .translate(&records, &self.keybinds, self.flags.right_click());
                self.stats.bridge_events += events.len() as u64;
                self.queue.push_batch(events);
            }
            Ok(None) => self.stats.bridge_timeouts += 1,
            Err(e) => tracing::error!("Failed to acquire bridge lock: {}", e),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Live settings. Changing a switch here reaches the capture threads.
    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Current bindings.
    #[must_use]
    pub fn keybinds(&self) -> &Arc<KeybindSnapshot> {
        &self.keybinds
    }

    /// The input queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<InputQueue> {
        &self.queue
    }

    /// Why the current frame is not subdivided, if it is not.
    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        self.skip
    }

    /// Replay state.
    #[must_use]
    pub const fn replay_state(&self) -> ReplayState {
        self.replay.state()
    }

    /// Whether the no-devices diagnostic has been shown this session.
    #[must_use]
    pub fn bridge_diagnostic_shown(&self) -> bool {
        self.bridge.as_ref().is_some_and(|b| b.latch.has_fired())
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Stops capture threads and waits for them.
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        self.poller = None;
        self.flush();
    }
}

impl std::fmt::Debug for InputPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPipeline")
            .field("queued", &self.queue.len())
            .field("clock", &self.clock.domain())
            .field("in_session", &self.in_session)
            .field("skip", &self.skip)
            .field("replay", &self.replay.state())
            .field("bridge", &self.bridge.is_some())
            .field("listener", &self.listener.is_some())
            .field("poller", &self.poller.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

fn wire_flags(store: &SettingsStore, flags: &Arc<CaptureFlags>) -> PipelineResult<()> {
    let soft = Arc::clone(flags);
    store.on_setting_changed("soft_toggle", move |on| {
        soft.soft_toggle.store(on, Ordering::Release);
    })?;
    let right = Arc::clone(flags);
    store.on_setting_changed("right_click", move |on| {
        right.right_click.store(on, Ordering::Release);
    })?;
    let priority = Arc::clone(flags);
    store.on_setting_changed("thread_priority", move |on| {
        priority.thread_priority.store(on, Ordering::Release);
    })?;
    Ok(())
}
