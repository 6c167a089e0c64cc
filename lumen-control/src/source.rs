//! Transmission sources, priorities, and control modes

/// A logical producer of light-effect commands
///
/// Closed set; sources are tags, never created dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionSource {
    /// User-triggered effect from the UI
    ManualEffect,
    /// Music-synchronized timeline playback
    TimelineEffect,
    /// Live audio frequency analysis
    FftEffect,
    /// Connection-confirmation animation
    ConnectionEffect,
    /// Broadcast to every connected device
    Broadcast,
}

/// Priority levels for transmission arbitration
///
/// Higher wins. Ties go to the source that already holds control.
pub mod priority {
    pub const SYSTEM: u8 = 120;
    pub const CONNECTION_EFFECT: u8 = 100;
    pub const MANUAL_EFFECT: u8 = 80;
    pub const TIMELINE_EFFECT: u8 = 60;
    pub const FFT_EFFECT: u8 = 40;
    pub const BROADCAST: u8 = 20;
}

impl TransmissionSource {
    pub const ALL: [TransmissionSource; 5] = [
        TransmissionSource::ManualEffect,
        TransmissionSource::TimelineEffect,
        TransmissionSource::FftEffect,
        TransmissionSource::ConnectionEffect,
        TransmissionSource::Broadcast,
    ];

    /// Default arbitration priority for this source
    pub fn default_priority(self) -> u8 {
        match self {
            TransmissionSource::ManualEffect => priority::MANUAL_EFFECT,
            TransmissionSource::TimelineEffect => priority::TIMELINE_EFFECT,
            TransmissionSource::FftEffect => priority::FFT_EFFECT,
            TransmissionSource::ConnectionEffect => priority::CONNECTION_EFFECT,
            TransmissionSource::Broadcast => priority::BROADCAST,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransmissionSource::ManualEffect => "manual",
            TransmissionSource::TimelineEffect => "timeline",
            TransmissionSource::FftEffect => "fft",
            TransmissionSource::ConnectionEffect => "connection",
            TransmissionSource::Broadcast => "broadcast",
        }
    }
}

/// How a controller shares (or refuses to share) the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Blocks all other sources until released or outranked
    Exclusive,
    /// Allows whitelisted source pairs to coexist
    Cooperative,
    /// Yields to any other request regardless of priority
    Background,
}

/// Whitelist of source pairs allowed to transmit cooperatively
///
/// Symmetric: `(a, b)` and `(b, a)` are the same pair. Seeded with
/// (timeline, fft); more pairs can be added through configuration.
#[derive(Debug, Clone)]
pub struct CompatibilityTable {
    pairs: Vec<(TransmissionSource, TransmissionSource)>,
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self {
            pairs: vec![(
                TransmissionSource::TimelineEffect,
                TransmissionSource::FftEffect,
            )],
        }
    }
}

impl CompatibilityTable {
    /// A table with no compatible pairs at all
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Allow `a` and `b` to transmit cooperatively
    pub fn allow(&mut self, a: TransmissionSource, b: TransmissionSource) {
        if a != b && !self.is_compatible(a, b) {
            self.pairs.push((a, b));
        }
    }

    /// Whether the pair may coexist under cooperative control
    pub fn is_compatible(&self, a: TransmissionSource, b: TransmissionSource) -> bool {
        self.pairs
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(priority::SYSTEM > priority::CONNECTION_EFFECT);
        assert!(priority::CONNECTION_EFFECT > priority::MANUAL_EFFECT);
        assert!(priority::MANUAL_EFFECT > priority::TIMELINE_EFFECT);
        assert!(priority::TIMELINE_EFFECT > priority::FFT_EFFECT);
        assert!(priority::FFT_EFFECT > priority::BROADCAST);
    }

    #[test]
    fn test_default_table_is_symmetric() {
        let table = CompatibilityTable::default();
        assert!(table.is_compatible(
            TransmissionSource::TimelineEffect,
            TransmissionSource::FftEffect
        ));
        assert!(table.is_compatible(
            TransmissionSource::FftEffect,
            TransmissionSource::TimelineEffect
        ));
        assert!(!table.is_compatible(
            TransmissionSource::ManualEffect,
            TransmissionSource::FftEffect
        ));
    }

    #[test]
    fn test_allow_ignores_duplicates_and_self_pairs() {
        let mut table = CompatibilityTable::empty();
        table.allow(
            TransmissionSource::ManualEffect,
            TransmissionSource::ManualEffect,
        );
        assert!(!table.is_compatible(
            TransmissionSource::ManualEffect,
            TransmissionSource::ManualEffect
        ));

        table.allow(
            TransmissionSource::ManualEffect,
            TransmissionSource::Broadcast,
        );
        table.allow(
            TransmissionSource::Broadcast,
            TransmissionSource::ManualEffect,
        );
        assert!(table.is_compatible(
            TransmissionSource::Broadcast,
            TransmissionSource::ManualEffect
        ));
    }
}
