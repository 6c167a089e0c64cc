//! Transmission monitor - bounded send history with anti-flicker suppression
//!
//! Every accepted transmission is recorded here. The "latest" projection
//! feeds UI observation; a lower-priority send arriving hot on the heels
//! of a higher-priority send to the same device goes into history without
//! replacing "latest", so the stick is not seen flickering between
//! contradictory effects.

use crate::config::PolicyConfig;
use crate::source::TransmissionSource;
use lumen_link::Rgb;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Broad effect category carried by a transmission event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Color,
    Blink,
    Breathe,
    Strobe,
    TimelineFrame,
    Off,
}

/// Immutable record of one accepted transmission
#[derive(Debug, Clone)]
pub struct TransmissionEvent {
    pub timestamp: Instant,
    pub source: TransmissionSource,
    pub device_id: String,
    pub kind: EffectKind,
    pub payload: Vec<u8>,
    pub color: Option<Rgb>,
    pub background_color: Option<Rgb>,
    /// Fade-in time in milliseconds
    pub transit: Option<u16>,
    /// Effect period in milliseconds
    pub period: Option<u16>,
    pub metadata: Option<String>,
}

impl TransmissionEvent {
    pub fn new(
        source: TransmissionSource,
        device_id: impl Into<String>,
        kind: EffectKind,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            timestamp: Instant::now(),
            source,
            device_id: device_id.into(),
            kind,
            payload,
            color: None,
            background_color: None,
            transit: None,
            period: None,
            metadata: None,
        }
    }
}

struct MonitorState {
    history: VecDeque<TransmissionEvent>,
    latest: Option<TransmissionEvent>,
    counts: HashMap<TransmissionSource, u64>,
}

/// Append-only bounded transmission history plus a "latest" projection
///
/// The single place send statistics live. Performs no I/O; safe to call
/// from the audio callback, the position poller, and UI handlers.
pub struct TransmissionMonitor {
    state: Mutex<MonitorState>,
    suppression_window: Duration,
    capacity: usize,
}

impl TransmissionMonitor {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                history: VecDeque::with_capacity(config.history_capacity),
                latest: None,
                counts: HashMap::new(),
            }),
            suppression_window: config.suppression_window,
            capacity: config.history_capacity.max(1),
        }
    }

    /// Record an accepted transmission
    ///
    /// The event always lands in history and in the per-source counters.
    /// It only replaces the "latest" projection when it is not a
    /// lower-priority overwrite of a fresh higher-priority send to the
    /// same device.
    pub fn record(&self, event: TransmissionEvent) {
        let mut state = self.state.lock();

        let suppressed = match &state.latest {
            Some(latest) => {
                latest.device_id == event.device_id
                    && event.source.default_priority() < latest.source.default_priority()
                    && latest.timestamp.elapsed() < self.suppression_window
            }
            None => false,
        };

        if suppressed {
            tracing::debug!(
                source = event.source.name(),
                device = %event.device_id,
                "suppressing latest-effect overwrite"
            );
        } else {
            state.latest = Some(event.clone());
        }

        *state.counts.entry(event.source).or_insert(0) += 1;
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(event);
    }

    /// The most recent non-suppressed transmission
    pub fn latest(&self) -> Option<TransmissionEvent> {
        self.state.lock().latest.clone()
    }

    /// The most recent `limit` transmissions, newest first
    pub fn history(&self, limit: usize) -> Vec<TransmissionEvent> {
        let state = self.state.lock();
        state.history.iter().rev().take(limit).cloned().collect()
    }

    /// The most recent `limit` transmissions to one device, newest first
    pub fn history_for_device(&self, device_id: &str, limit: usize) -> Vec<TransmissionEvent> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .rev()
            .filter(|e| e.device_id == device_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// All retained transmissions at or after `since`, oldest first
    pub fn history_since(&self, since: Instant) -> Vec<TransmissionEvent> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Total transmissions recorded for one source
    pub fn count_by_source(&self, source: TransmissionSource) -> u64 {
        self.state
            .lock()
            .counts
            .get(&source)
            .copied()
            .unwrap_or(0)
    }

    /// Clear history, latest, and counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.latest = None;
        state.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> TransmissionMonitor {
        TransmissionMonitor::new(&PolicyConfig::default())
    }

    fn event(source: TransmissionSource, device: &str) -> TransmissionEvent {
        TransmissionEvent::new(source, device, EffectKind::Color, vec![0x01])
    }

    #[test]
    fn test_record_updates_latest_and_history() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));

        let latest = monitor.latest().unwrap();
        assert_eq!(latest.source, TransmissionSource::ManualEffect);
        assert_eq!(monitor.history(10).len(), 1);
        assert_eq!(monitor.count_by_source(TransmissionSource::ManualEffect), 1);
    }

    #[test]
    fn test_lower_priority_within_window_is_suppressed_from_latest() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        // Timeline (60) < manual (80), same device, well inside 500 ms
        monitor.record(event(TransmissionSource::TimelineEffect, "stick-1"));

        let latest = monitor.latest().unwrap();
        assert_eq!(latest.source, TransmissionSource::ManualEffect);
        // Both sends are still in history
        assert_eq!(monitor.history(10).len(), 2);
        assert_eq!(
            monitor.count_by_source(TransmissionSource::TimelineEffect),
            1
        );
    }

    #[test]
    fn test_lower_priority_for_other_device_is_not_suppressed() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        monitor.record(event(TransmissionSource::TimelineEffect, "stick-2"));

        let latest = monitor.latest().unwrap();
        assert_eq!(latest.source, TransmissionSource::TimelineEffect);
    }

    #[test]
    fn test_higher_priority_always_replaces_latest() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::FftEffect, "stick-1"));
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));

        let latest = monitor.latest().unwrap();
        assert_eq!(latest.source, TransmissionSource::ManualEffect);
    }

    #[test]
    fn test_suppression_window_expires() {
        let config = PolicyConfig {
            suppression_window: Duration::from_millis(0),
            ..PolicyConfig::default()
        };
        let monitor = TransmissionMonitor::new(&config);
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        monitor.record(event(TransmissionSource::TimelineEffect, "stick-1"));

        let latest = monitor.latest().unwrap();
        assert_eq!(latest.source, TransmissionSource::TimelineEffect);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = PolicyConfig {
            history_capacity: 3,
            ..PolicyConfig::default()
        };
        let monitor = TransmissionMonitor::new(&config);
        for i in 0..5 {
            let mut e = event(TransmissionSource::ManualEffect, "stick-1");
            e.payload = vec![i];
            monitor.record(e);
        }
        let history = monitor.history(10);
        assert_eq!(history.len(), 3);
        // Newest first; oldest two were evicted
        assert_eq!(history[0].payload, vec![4]);
        assert_eq!(history[2].payload, vec![2]);
    }

    #[test]
    fn test_history_for_device_filters() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        monitor.record(event(TransmissionSource::ManualEffect, "stick-2"));
        monitor.record(event(TransmissionSource::FftEffect, "stick-1"));

        let for_one = monitor.history_for_device("stick-1", 10);
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[0].source, TransmissionSource::FftEffect);
    }

    #[test]
    fn test_history_since() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        std::thread::sleep(Duration::from_millis(5));
        let cutoff = Instant::now();
        monitor.record(event(TransmissionSource::FftEffect, "stick-1"));

        let recent = monitor.history_since(cutoff);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source, TransmissionSource::FftEffect);
    }

    #[test]
    fn test_reset_clears_everything() {
        let monitor = monitor();
        monitor.record(event(TransmissionSource::ManualEffect, "stick-1"));
        monitor.reset();

        assert!(monitor.latest().is_none());
        assert!(monitor.history(10).is_empty());
        assert_eq!(monitor.count_by_source(TransmissionSource::ManualEffect), 0);
    }
}
