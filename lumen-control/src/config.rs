//! Tunable arbitration and monitoring policy

use crate::source::CompatibilityTable;
use std::time::Duration;

/// Policy knobs shared by the coordinator, monitor, and engine
///
/// The 500 ms windows are grace periods, not load-bearing constants; they
/// exist so a freshly rendered high-priority effect is not visually
/// overwritten before the stick finishes showing it.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Anti-flicker window: a lower-priority send within this window of a
    /// higher-priority send to the same device does not replace "latest"
    pub suppression_window: Duration,
    /// Window during which a manual effect wins over timeline emission
    pub manual_override_window: Duration,
    /// Bounded send-history capacity in the monitor
    pub history_capacity: usize,
    /// Source pairs allowed to coexist under cooperative control
    pub compatibility: CompatibilityTable,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            suppression_window: Duration::from_millis(500),
            manual_override_window: Duration::from_millis(500),
            history_capacity: 100,
            compatibility: CompatibilityTable::default(),
        }
    }
}
