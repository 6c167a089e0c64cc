//! Effect engine - resolves targets and drives arbitrated transmissions
//!
//! Three producers feed this engine: manual UI intents, timeline position
//! updates, and live band energies from the analyzer. Every outbound path
//! goes permission check -> arbitration -> device send -> monitor record.
//! Device sends always happen outside the engine's own lock.

use crate::task::EffectTask;
use lumen_analysis::FrequencyBand;
use lumen_control::{
    ControlMode, EffectKind, PolicyConfig, SessionGuard, TransmissionCoordinator,
    TransmissionEvent, TransmissionMonitor, TransmissionSource,
};
use lumen_link::{DeviceHandle, DeviceLink, EffectIntent, PayloadBuilder, Rgb};
use lumen_timeline::Timeline;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fade-in used for audio-reactive color updates, in milliseconds
pub const FFT_TRANSIT_MS: u16 = 100;

/// Floor for total band energy before normalization
const ENERGY_EPSILON: f32 = 1e-6;

/// Timeline playback lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    NoTimeline,
    Loaded,
    Playing,
    Paused,
}

struct EngineState {
    /// Explicit target device id; None falls back to first connected
    target: Option<String>,
    /// Resolved handle, cached until a connection-state change
    resolved: Option<DeviceHandle>,
    timeline: Option<Timeline>,
    /// Index of the last emitted timeline entry; None means before first
    last_emitted: Option<usize>,
    playback: PlaybackState,
    position_ms: u32,
    /// Whether the current timeline was uploaded to the device's native player
    native_loaded: bool,
}

/// Public API consumed by application-level use cases
pub struct EffectEngine {
    link: Arc<dyn DeviceLink>,
    builder: Arc<dyn PayloadBuilder>,
    coordinator: Arc<TransmissionCoordinator>,
    monitor: Arc<TransmissionMonitor>,
    /// Externally supplied "connect permission granted" predicate
    permission: Box<dyn Fn() -> bool + Send + Sync>,
    manual_override_window: Duration,
    state: Mutex<EngineState>,
}

impl EffectEngine {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        builder: Arc<dyn PayloadBuilder>,
        coordinator: Arc<TransmissionCoordinator>,
        monitor: Arc<TransmissionMonitor>,
        config: &PolicyConfig,
    ) -> Self {
        Self {
            link,
            builder,
            coordinator,
            monitor,
            permission: Box::new(|| true),
            manual_override_window: config.manual_override_window,
            state: Mutex::new(EngineState {
                target: None,
                resolved: None,
                timeline: None,
                last_emitted: None,
                playback: PlaybackState::NoTimeline,
                position_ms: 0,
                native_loaded: false,
            }),
        }
    }

    /// Install the external permission predicate
    ///
    /// Checked before every transmit attempt; false short-circuits the
    /// send without touching the transport.
    pub fn with_permission_check(
        mut self,
        check: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.permission = Box::new(check);
        self
    }

    /// Set or clear the explicit target device
    pub fn set_target(&self, device_id: Option<String>) {
        let mut state = self.state.lock();
        state.target = device_id;
        state.resolved = None;
    }

    /// Drop the cached target handle after a connection-state change
    pub fn invalidate_target(&self) {
        self.state.lock().resolved = None;
    }

    /// Resolve the device to command
    ///
    /// The explicit target if still connected, else the first connected
    /// device. The result is cached until invalidated.
    pub fn resolve_target(&self) -> Option<DeviceHandle> {
        {
            let state = self.state.lock();
            if let Some(handle) = &state.resolved {
                return Some(handle.clone());
            }
        }

        // Transport query happens outside the lock
        let devices = self.link.connected_devices();
        let mut state = self.state.lock();
        let handle = match &state.target {
            Some(id) => devices
                .iter()
                .find(|d| &d.id == id)
                .cloned()
                .or_else(|| devices.first().cloned()),
            None => devices.first().cloned(),
        };
        state.resolved = handle.clone();
        handle
    }

    /// Build and transmit one effect intent
    ///
    /// Broadcast sources without an explicit target fan out to every
    /// connected device; one failing device does not abort the others.
    /// Returns true when at least one device accepted the send.
    pub fn send_effect(
        &self,
        intent: &EffectIntent,
        source: TransmissionSource,
        metadata: Option<String>,
    ) -> bool {
        if !(self.permission)() {
            tracing::debug!(source = source.name(), "connect permission not granted");
            return false;
        }
        if !self.coordinator.can_transmit(source) {
            tracing::debug!(source = source.name(), "transmission denied by coordinator");
            return false;
        }

        let broadcast = source == TransmissionSource::Broadcast && {
            self.state.lock().target.is_none()
        };
        let targets: Vec<DeviceHandle> = if broadcast {
            self.link.connected_devices()
        } else {
            self.resolve_target().into_iter().collect()
        };
        if targets.is_empty() {
            tracing::debug!(source = source.name(), "no target device; dropping effect");
            return false;
        }

        let payload = self.builder.build(intent);
        let mut accepted = false;
        for device in &targets {
            match self.link.send(&device.id, &payload) {
                Ok(()) => {
                    accepted = true;
                    let event = Self::event_for(
                        intent,
                        source,
                        &device.id,
                        payload.clone(),
                        metadata.clone(),
                    );
                    if !self.coordinator.send_effect(event) {
                        // Lost arbitration between the pre-check and the send
                        tracing::debug!(device = %device.id, "send accepted but not recorded");
                    }
                }
                Err(e) => {
                    tracing::warn!(device = %device.id, error = %e, "transport send failed");
                }
            }
        }
        accepted
    }

    /// Replace the cached timeline and reset emission tracking
    ///
    /// Uploads the timeline to the device's native player when the link
    /// supports it; otherwise entries are emitted by position updates.
    pub fn load_timeline(&self, timeline: Timeline) {
        let native = match self.resolve_target() {
            Some(device) => {
                let entries: Vec<(u32, Vec<u8>)> = timeline
                    .entries()
                    .iter()
                    .map(|e| (e.timestamp_ms, e.payload.to_vec()))
                    .collect();
                self.link.load_native_timeline(&device.id, &entries)
            }
            None => false,
        };

        let mut state = self.state.lock();
        state.timeline = Some(timeline);
        state.last_emitted = None;
        state.position_ms = 0;
        state.playback = PlaybackState::Loaded;
        state.native_loaded = native;
        tracing::debug!(native, "timeline loaded");
    }

    /// Advance playback-position tracking and emit the entry now due
    ///
    /// Emits the greatest-index entry with timestamp <= position, exactly
    /// once per load; skipped-over entries are never replayed. A manual
    /// effect recorded for the target device within the override window
    /// wins over the timeline entry.
    pub fn update_position(&self, position_ms: u32) {
        let (entry, native) = {
            let mut state = self.state.lock();
            state.position_ms = position_ms;
            if state.timeline.is_none() || state.playback == PlaybackState::Paused {
                return;
            }
            if state.playback == PlaybackState::Loaded {
                state.playback = PlaybackState::Playing;
            }

            let last_emitted = state.last_emitted;
            let due = state.timeline.as_ref().and_then(|timeline| {
                match timeline.index_at(position_ms) {
                    Some(i) if last_emitted != Some(i) => Some((i, timeline.entries()[i])),
                    _ => None,
                }
            });
            let entry = due.map(|(i, entry)| {
                state.last_emitted = Some(i);
                entry
            });
            (entry, state.native_loaded)
        };

        let device = match self.resolve_target() {
            Some(d) => d,
            None => return,
        };
        if native {
            self.link.update_playback_position(&device.id, position_ms);
        }

        if let Some(entry) = entry {
            if self.manual_effect_recently(&device.id) {
                tracing::debug!(
                    device = %device.id,
                    timestamp = entry.timestamp_ms,
                    "manual effect wins; skipping timeline entry"
                );
                return;
            }
            self.send_effect(
                &EffectIntent::TimelineFrame {
                    payload: entry.payload.to_vec(),
                },
                TransmissionSource::TimelineEffect,
                None,
            );
        }
    }

    /// Jump to a new position
    ///
    /// Resets emission tracking so the next position update re-evaluates
    /// from scratch, then forwards the position to the device.
    pub fn handle_seek(&self, new_position_ms: u32) {
        {
            let mut state = self.state.lock();
            state.last_emitted = None;
            state.position_ms = new_position_ms;
        }
        if let Some(device) = self.resolve_target() {
            self.link.update_playback_position(&device.id, new_position_ms);
        }
    }

    /// Turn one analysis window's band energies into a color send
    ///
    /// Inactive while a timeline is loaded: the timeline owns the look of
    /// the track. Band energies are normalized to their proportional
    /// share, with the total floored to avoid division by zero.
    pub fn process_spectrum(&self, band: FrequencyBand) -> bool {
        if self.state.lock().timeline.is_some() {
            return false;
        }

        let total = (band.bass + band.mid + band.treble).max(ENERGY_EPSILON);
        let channel = |v: f32| ((v / total) * 255.0).clamp(0.0, 255.0) as u8;
        let color = Rgb::new(channel(band.bass), channel(band.mid), channel(band.treble));

        self.send_effect(
            &EffectIntent::SolidColor {
                color,
                transit_ms: FFT_TRANSIT_MS,
            },
            TransmissionSource::FftEffect,
            None,
        )
    }

    /// Stop outbound timeline transmission, keeping position tracking
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.playback == PlaybackState::Playing {
            state.playback = PlaybackState::Paused;
        }
    }

    /// Resume after a pause and re-synchronize the device position
    pub fn resume(&self) {
        let (position, native) = {
            let mut state = self.state.lock();
            if state.playback != PlaybackState::Paused {
                return;
            }
            state.playback = PlaybackState::Playing;
            (state.position_ms, state.native_loaded)
        };
        if native {
            if let Some(device) = self.resolve_target() {
                self.link.update_playback_position(&device.id, position);
            }
        }
    }

    /// Discard the timeline and stop any native playback
    pub fn reset(&self) {
        let device = self.resolve_target();
        {
            let mut state = self.state.lock();
            state.timeline = None;
            state.last_emitted = None;
            state.position_ms = 0;
            state.playback = PlaybackState::NoTimeline;
            state.native_loaded = false;
        }
        if let Some(device) = device {
            self.link.stop_native_timeline(&device.id);
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    /// Play a multi-frame effect list as a cancellable background task
    ///
    /// The whole list runs under one session, so no other source can
    /// interleave frames. The session ends when the task finishes, is
    /// cancelled, or panics. Returns None when the session is denied.
    pub fn play_effect_list(
        self: Arc<Self>,
        frames: Vec<EffectIntent>,
        frame_interval: Duration,
        source: TransmissionSource,
        mode: ControlMode,
    ) -> Option<EffectTask> {
        let guard = SessionGuard::begin(
            &self.coordinator,
            source,
            source.default_priority(),
            mode,
        )?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let engine = self;
        let handle = std::thread::spawn(move || {
            // Dropping the guard ends the session on every exit path
            let _guard = guard;
            for frame in &frames {
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                engine.send_effect(frame, source, None);
                std::thread::sleep(frame_interval);
            }
        });
        Some(EffectTask::new(cancelled, handle))
    }

    /// Short confirmation animation played when a device connects
    pub fn play_connection_effect(self: Arc<Self>, color: Rgb) -> Option<EffectTask> {
        let mut frames = Vec::with_capacity(6);
        for _ in 0..3 {
            frames.push(EffectIntent::SolidColor {
                color,
                transit_ms: 0,
            });
            frames.push(EffectIntent::Off);
        }
        self.play_effect_list(
            frames,
            Duration::from_millis(200),
            TransmissionSource::ConnectionEffect,
            ControlMode::Exclusive,
        )
    }

    fn manual_effect_recently(&self, device_id: &str) -> bool {
        let cutoff = match Instant::now().checked_sub(self.manual_override_window) {
            Some(t) => t,
            None => return false,
        };
        self.monitor.history_since(cutoff).iter().any(|e| {
            e.device_id == device_id && e.source == TransmissionSource::ManualEffect
        })
    }

    fn event_for(
        intent: &EffectIntent,
        source: TransmissionSource,
        device_id: &str,
        payload: Vec<u8>,
        metadata: Option<String>,
    ) -> TransmissionEvent {
        let kind = match intent {
            EffectIntent::SolidColor { .. } => EffectKind::Color,
            EffectIntent::Blink { .. } => EffectKind::Blink,
            EffectIntent::Breathe { .. } => EffectKind::Breathe,
            EffectIntent::Strobe { .. } => EffectKind::Strobe,
            EffectIntent::TimelineFrame { .. } => EffectKind::TimelineFrame,
            EffectIntent::Off => EffectKind::Off,
        };
        let mut event = TransmissionEvent::new(source, device_id, kind, payload);
        event.metadata = metadata;
        match intent {
            EffectIntent::SolidColor { color, transit_ms } => {
                event.color = Some(*color);
                event.transit = Some(*transit_ms);
            }
            EffectIntent::Blink {
                color,
                background,
                period_ms,
            } => {
                event.color = Some(*color);
                event.background_color = Some(*background);
                event.period = Some(*period_ms);
            }
            EffectIntent::Breathe { color, period_ms }
            | EffectIntent::Strobe { color, period_ms } => {
                event.color = Some(*color);
                event.period = Some(*period_ms);
            }
            EffectIntent::TimelineFrame { .. } | EffectIntent::Off => {}
        }
        event
    }
}
