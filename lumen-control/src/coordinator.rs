//! Transmission coordinator - arbitrates which source may command devices
//!
//! Two tiers of exclusivity:
//! - per-call arbitration: every `request_control` is judged against the
//!   current controller by priority and control mode
//! - sessions: a source holding the active session blocks transmissions
//!   from non-compatible sources even when they would win per-call
//!   arbitration, so a continuous animation never gets interleaved
//!
//! All arbitration runs under one mutex and is CPU-only; device sends
//! happen in callers after permission is granted.

use crate::config::PolicyConfig;
use crate::monitor::{TransmissionEvent, TransmissionMonitor};
use crate::source::{CompatibilityTable, ControlMode, TransmissionSource};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Retained controller-change records
pub const CONTROLLER_HISTORY_CAP: usize = 64;

/// Snapshot of the source currently granted per-call control
///
/// Replaced, never mutated, on every arbitration outcome.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub source: TransmissionSource,
    pub priority: u8,
    pub mode: ControlMode,
    pub acquired_at: Instant,
    pub metadata: Option<String>,
}

/// Arbitration outcomes observable by subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A source acquired idle control
    Acquired { source: TransmissionSource },
    /// The current controller refreshed its own grant
    Updated { source: TransmissionSource },
    /// A higher-priority source forcibly took over
    Superseded {
        previous: TransmissionSource,
        source: TransmissionSource,
    },
    /// A background controller stepped aside
    Yielded {
        previous: TransmissionSource,
        source: TransmissionSource,
    },
    /// The controller released (or everything was force-released)
    Released { source: TransmissionSource },
}

struct CoordinatorState {
    controller: Option<ControllerState>,
    session: Option<TransmissionSource>,
    /// Past controller states, oldest evicted beyond the cap
    controller_history: VecDeque<ControllerState>,
}

/// Process-wide transmission arbiter
///
/// Constructed once at startup and shared by reference with every
/// producer. Denied requests are ordinary control flow, not errors.
pub struct TransmissionCoordinator {
    state: Mutex<CoordinatorState>,
    monitor: Arc<TransmissionMonitor>,
    compatibility: CompatibilityTable,
    subscribers: Mutex<Vec<Sender<ControlEvent>>>,
}

impl TransmissionCoordinator {
    pub fn new(monitor: Arc<TransmissionMonitor>, config: &PolicyConfig) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                controller: None,
                session: None,
                controller_history: VecDeque::with_capacity(CONTROLLER_HISTORY_CAP),
            }),
            monitor,
            compatibility: config.compatibility.clone(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to arbitration outcomes
    ///
    /// Events are delivered best-effort on a bounded channel; a full or
    /// disconnected subscriber is dropped.
    pub fn subscribe(&self) -> Receiver<ControlEvent> {
        let (tx, rx) = bounded(64);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Request per-call control for a source
    ///
    /// Returns true when the source may transmit under per-call
    /// arbitration. A false return leaves all state untouched.
    pub fn request_control(
        &self,
        source: TransmissionSource,
        priority: u8,
        mode: ControlMode,
        metadata: Option<String>,
    ) -> bool {
        let (granted, event) = {
            let mut state = self.state.lock();
            Self::arbitrate(
                &mut state,
                &self.compatibility,
                source,
                priority,
                mode,
                metadata,
            )
        };
        if let Some(event) = event {
            self.notify(event);
        }
        granted
    }

    /// Release per-call control
    ///
    /// Only the owning source may clear the controller; anything else is
    /// a logged no-op.
    pub fn release_control(&self, source: TransmissionSource) {
        let event = {
            let mut state = self.state.lock();
            match &state.controller {
                Some(current) if current.source == source => {
                    let previous = state.controller.take();
                    if let Some(previous) = previous {
                        state.push_history(previous);
                    }
                    Some(ControlEvent::Released { source })
                }
                Some(current) => {
                    tracing::debug!(
                        requester = source.name(),
                        holder = current.source.name(),
                        "ignoring release from non-owner"
                    );
                    None
                }
                None => None,
            }
        };
        if let Some(event) = event {
            self.notify(event);
        }
    }

    /// Start a continuous exclusive session for a source
    ///
    /// Acquires per-call control first; on denial nothing changes and
    /// false is returned. While the session is active, non-compatible
    /// sources cannot transmit even if they would win arbitration.
    pub fn start_session(
        &self,
        source: TransmissionSource,
        priority: u8,
        mode: ControlMode,
    ) -> bool {
        let (granted, event) = {
            let mut state = self.state.lock();
            let (granted, event) = Self::arbitrate(
                &mut state,
                &self.compatibility,
                source,
                priority,
                mode,
                None,
            );
            if granted {
                state.session = Some(source);
            }
            (granted, event)
        };
        if let Some(event) = event {
            self.notify(event);
        }
        granted
    }

    /// End the active session if `source` owns it
    ///
    /// Idempotent; must run on every exit path of a session body,
    /// including cancellation (see [`SessionGuard`]).
    pub fn end_session(&self, source: TransmissionSource) {
        let event = {
            let mut state = self.state.lock();
            if state.session != Some(source) {
                return;
            }
            state.session = None;
            match &state.controller {
                Some(current) if current.source == source => {
                    let previous = state.controller.take();
                    if let Some(previous) = previous {
                        state.push_history(previous);
                    }
                    Some(ControlEvent::Released { source })
                }
                _ => None,
            }
        };
        if let Some(event) = event {
            self.notify(event);
        }
    }

    /// Whether `source` may transmit right now
    ///
    /// Session check first, then controller check. Both must pass.
    pub fn can_transmit(&self, source: TransmissionSource) -> bool {
        let state = self.state.lock();

        let session_ok = match state.session {
            None => true,
            Some(holder) => holder == source || self.compatibility.is_compatible(holder, source),
        };
        if !session_ok {
            return false;
        }

        match &state.controller {
            None => true,
            Some(current) => {
                current.source == source
                    || (current.mode == ControlMode::Cooperative
                        && self.compatibility.is_compatible(current.source, source))
            }
        }
    }

    /// Forward an event to the monitor if its source may transmit
    ///
    /// Returns false (recording nothing) when transmission is denied.
    pub fn send_effect(&self, event: TransmissionEvent) -> bool {
        if !self.can_transmit(event.source) {
            tracing::debug!(source = event.source.name(), "transmission denied");
            return false;
        }
        self.monitor.record(event);
        true
    }

    /// Clear controller and session unconditionally
    pub fn force_release_all(&self) {
        let event = {
            let mut state = self.state.lock();
            state.session = None;
            let previous = state.controller.take();
            previous.map(|previous| {
                let source = previous.source;
                state.push_history(previous);
                ControlEvent::Released { source }
            })
        };
        if let Some(event) = event {
            self.notify(event);
        }
    }

    /// Current controller snapshot
    pub fn controller(&self) -> Option<ControllerState> {
        self.state.lock().controller.clone()
    }

    /// Source holding the active session, if any
    pub fn active_session(&self) -> Option<TransmissionSource> {
        self.state.lock().session
    }

    /// Past controller states, oldest first
    pub fn controller_history(&self) -> Vec<ControllerState> {
        self.state.lock().controller_history.iter().cloned().collect()
    }

    /// The arbitration rules, evaluated in order under the state lock
    fn arbitrate(
        state: &mut CoordinatorState,
        compatibility: &CompatibilityTable,
        source: TransmissionSource,
        priority: u8,
        mode: ControlMode,
        metadata: Option<String>,
    ) -> (bool, Option<ControlEvent>) {
        let new_state = |acquired_at| ControllerState {
            source,
            priority,
            mode,
            acquired_at,
            metadata,
        };

        match state.controller.take() {
            // 1. Idle: acquire immediately
            None => {
                state.controller = Some(new_state(Instant::now()));
                (true, Some(ControlEvent::Acquired { source }))
            }
            // 2. Same source refreshes its own grant
            Some(current) if current.source == source => {
                let acquired_at = current.acquired_at;
                state.push_history(current);
                state.controller = Some(new_state(acquired_at));
                (true, Some(ControlEvent::Updated { source }))
            }
            // 3. Strictly higher priority supersedes
            Some(current) if priority > current.priority => {
                let previous = current.source;
                tracing::debug!(
                    from = previous.name(),
                    to = source.name(),
                    "control superseded"
                );
                state.push_history(current);
                state.controller = Some(new_state(Instant::now()));
                (true, Some(ControlEvent::Superseded { previous, source }))
            }
            // 4. Background controllers yield to anyone
            Some(current) if current.mode == ControlMode::Background => {
                let previous = current.source;
                state.push_history(current);
                state.controller = Some(new_state(Instant::now()));
                (true, Some(ControlEvent::Yielded { previous, source }))
            }
            // 5. Cooperative coexistence: grant without changing the controller
            Some(current)
                if current.mode == ControlMode::Cooperative
                    && compatibility.is_compatible(current.source, source) =>
            {
                state.controller = Some(current);
                (true, None)
            }
            // 6. Denied: no state change
            Some(current) => {
                state.controller = Some(current);
                (false, None)
            }
        }
    }

    fn notify(&self, event: ControlEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

impl CoordinatorState {
    fn push_history(&mut self, state: ControllerState) {
        if self.controller_history.len() == CONTROLLER_HISTORY_CAP {
            self.controller_history.pop_front();
        }
        self.controller_history.push_back(state);
    }
}

/// RAII session handle
///
/// Ends the session on drop, so cleanup runs on early returns, panics,
/// and task cancellation alike.
pub struct SessionGuard {
    coordinator: Arc<TransmissionCoordinator>,
    source: TransmissionSource,
}

impl SessionGuard {
    /// Start a session wrapped in a guard that always ends it on drop
    ///
    /// Returns None (and changes nothing) when control is denied.
    pub fn begin(
        coordinator: &Arc<TransmissionCoordinator>,
        source: TransmissionSource,
        priority: u8,
        mode: ControlMode,
    ) -> Option<SessionGuard> {
        if coordinator.start_session(source, priority, mode) {
            Some(SessionGuard {
                coordinator: Arc::clone(coordinator),
                source,
            })
        } else {
            None
        }
    }

    pub fn source(&self) -> TransmissionSource {
        self.source
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.coordinator.end_session(self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::EffectKind;
    use crate::source::priority;

    fn coordinator() -> TransmissionCoordinator {
        let config = PolicyConfig::default();
        TransmissionCoordinator::new(Arc::new(TransmissionMonitor::new(&config)), &config)
    }

    fn request(
        coordinator: &TransmissionCoordinator,
        source: TransmissionSource,
        mode: ControlMode,
    ) -> bool {
        coordinator.request_control(source, source.default_priority(), mode, None)
    }

    #[test]
    fn test_idle_acquire() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::FftEffect
        );
    }

    #[test]
    fn test_same_source_refreshes() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        assert!(c.request_control(
            TransmissionSource::ManualEffect,
            priority::MANUAL_EFFECT,
            ControlMode::Cooperative,
            Some("refresh".into()),
        ));
        let controller = c.controller().unwrap();
        assert_eq!(controller.mode, ControlMode::Cooperative);
        assert_eq!(controller.metadata.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_higher_priority_supersedes() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::ManualEffect
        );
    }

    #[test]
    fn test_lower_priority_denied_against_exclusive() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        assert!(!request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::ManualEffect
        );
    }

    #[test]
    fn test_background_yields_to_anyone() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Background));
        // Broadcast (20) < manual (80), but background yields regardless
        assert!(request(&c, TransmissionSource::Broadcast, ControlMode::Exclusive));
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::Broadcast
        );
    }

    #[test]
    fn test_cooperative_pair_coexists() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::TimelineEffect, ControlMode::Cooperative));
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        // Controller reference unchanged
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::TimelineEffect
        );
        assert!(c.can_transmit(TransmissionSource::FftEffect));
    }

    #[test]
    fn test_cooperative_rejects_non_whitelisted_pair() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::TimelineEffect, ControlMode::Cooperative));
        assert!(!request(&c, TransmissionSource::Broadcast, ControlMode::Exclusive));
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Background));
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        // FFT no longer holds control; its release must change nothing
        c.release_control(TransmissionSource::FftEffect);
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::ManualEffect
        );
        c.release_control(TransmissionSource::ManualEffect);
        assert!(c.controller().is_none());
    }

    #[test]
    fn test_session_blocks_higher_priority_transmission() {
        let c = coordinator();
        assert!(c.start_session(
            TransmissionSource::ConnectionEffect,
            priority::CONNECTION_EFFECT,
            ControlMode::Exclusive,
        ));
        // SYSTEM priority would win per-call arbitration, but the session
        // still blocks the transmission itself.
        assert!(c.request_control(
            TransmissionSource::ManualEffect,
            priority::SYSTEM,
            ControlMode::Exclusive,
            None,
        ));
        assert!(!c.can_transmit(TransmissionSource::ManualEffect));
        assert!(c.can_transmit(TransmissionSource::ConnectionEffect));
    }

    #[test]
    fn test_session_allows_compatible_pair() {
        let c = coordinator();
        assert!(c.start_session(
            TransmissionSource::TimelineEffect,
            priority::TIMELINE_EFFECT,
            ControlMode::Cooperative,
        ));
        assert!(c.can_transmit(TransmissionSource::FftEffect));
        assert!(!c.can_transmit(TransmissionSource::Broadcast));
    }

    #[test]
    fn test_end_session_is_idempotent_and_owner_only() {
        let c = coordinator();
        assert!(c.start_session(
            TransmissionSource::ManualEffect,
            priority::MANUAL_EFFECT,
            ControlMode::Exclusive,
        ));
        // Non-owner end is a no-op
        c.end_session(TransmissionSource::FftEffect);
        assert_eq!(
            c.active_session(),
            Some(TransmissionSource::ManualEffect)
        );

        c.end_session(TransmissionSource::ManualEffect);
        assert!(c.active_session().is_none());
        assert!(c.controller().is_none());

        // Second end is harmless
        c.end_session(TransmissionSource::ManualEffect);
    }

    #[test]
    fn test_session_denied_without_side_effects() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        assert!(!c.start_session(
            TransmissionSource::FftEffect,
            priority::FFT_EFFECT,
            ControlMode::Exclusive,
        ));
        assert!(c.active_session().is_none());
        assert_eq!(
            c.controller().unwrap().source,
            TransmissionSource::ManualEffect
        );
    }

    #[test]
    fn test_session_guard_ends_session_on_drop() {
        let config = PolicyConfig::default();
        let c = Arc::new(TransmissionCoordinator::new(
            Arc::new(TransmissionMonitor::new(&config)),
            &config,
        ));
        {
            let _guard = SessionGuard::begin(
                &c,
                TransmissionSource::ConnectionEffect,
                priority::CONNECTION_EFFECT,
                ControlMode::Exclusive,
            )
            .unwrap();
            assert!(!c.can_transmit(TransmissionSource::ManualEffect));
        }
        assert!(c.active_session().is_none());
        assert!(c.can_transmit(TransmissionSource::ManualEffect));
    }

    #[test]
    fn test_send_effect_records_only_when_permitted() {
        let config = PolicyConfig::default();
        let monitor = Arc::new(TransmissionMonitor::new(&config));
        let c = TransmissionCoordinator::new(Arc::clone(&monitor), &config);

        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));

        let denied = TransmissionEvent::new(
            TransmissionSource::FftEffect,
            "stick-1",
            EffectKind::Color,
            vec![],
        );
        assert!(!c.send_effect(denied));
        assert!(monitor.latest().is_none());

        let accepted = TransmissionEvent::new(
            TransmissionSource::ManualEffect,
            "stick-1",
            EffectKind::Color,
            vec![],
        );
        assert!(c.send_effect(accepted));
        assert_eq!(monitor.history(10).len(), 1);
    }

    #[test]
    fn test_force_release_all() {
        let c = coordinator();
        assert!(c.start_session(
            TransmissionSource::ManualEffect,
            priority::MANUAL_EFFECT,
            ControlMode::Exclusive,
        ));
        c.force_release_all();
        assert!(c.controller().is_none());
        assert!(c.active_session().is_none());
        assert!(c.can_transmit(TransmissionSource::Broadcast));
    }

    #[test]
    fn test_supersede_emits_control_event() {
        let c = coordinator();
        let events = c.subscribe();
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));

        assert_eq!(
            events.try_recv().unwrap(),
            ControlEvent::Acquired {
                source: TransmissionSource::FftEffect
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ControlEvent::Superseded {
                previous: TransmissionSource::FftEffect,
                source: TransmissionSource::ManualEffect,
            }
        );
    }

    #[test]
    fn test_controller_history_records_transitions() {
        let c = coordinator();
        assert!(request(&c, TransmissionSource::FftEffect, ControlMode::Exclusive));
        assert!(request(&c, TransmissionSource::ManualEffect, ControlMode::Exclusive));
        c.release_control(TransmissionSource::ManualEffect);

        let history = c.controller_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, TransmissionSource::FftEffect);
        assert_eq!(history[1].source, TransmissionSource::ManualEffect);
    }
}
