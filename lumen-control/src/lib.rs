//! Transmission arbitration for Lumen
//!
//! Multiple producers (manual effects, music timelines, live audio
//! analysis) compete to drive the same light sticks. This crate decides
//! who may transmit at any moment and records every accepted send:
//! - Coordinator: priority/mode arbitration plus session exclusivity
//! - Monitor: bounded send history with anti-flicker suppression

mod config;
mod coordinator;
mod monitor;
mod source;

pub use config::PolicyConfig;
pub use coordinator::{
    ControlEvent, ControllerState, SessionGuard, TransmissionCoordinator, CONTROLLER_HISTORY_CAP,
};
pub use monitor::{EffectKind, TransmissionEvent, TransmissionMonitor};
pub use source::{priority, CompatibilityTable, ControlMode, TransmissionSource};
