//! The `DeviceLink` transport trait

use thiserror::Error;

/// Errors surfaced by a device link implementation
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("device {0} is not connected")]
    NotConnected(String),
    #[error("send to {device_id} failed: {reason}")]
    SendFailed { device_id: String, reason: String },
}

/// A connected light stick as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Transport-level identifier (BLE address or similar)
    pub id: String,
    /// Advertised device name
    pub name: String,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Vendor transport capability
///
/// Implementations are expected to be fast or fire-and-forget: the engine
/// does not await delivery acknowledgment before recording a send.
pub trait DeviceLink: Send + Sync {
    /// Send an encoded effect payload to one device
    fn send(&self, device_id: &str, payload: &[u8]) -> Result<(), LinkError>;

    /// Snapshot of currently connected devices
    fn connected_devices(&self) -> Vec<DeviceHandle>;

    /// Upload a timeline to the device's native player
    ///
    /// Returns false when the device has no native timeline support; the
    /// engine then falls back to position-driven emission.
    fn load_native_timeline(&self, device_id: &str, entries: &[(u32, Vec<u8>)]) -> bool;

    /// Forward the current playback position to the device
    fn update_playback_position(&self, device_id: &str, position_ms: u32);

    /// Stop any native timeline playback on the device
    fn stop_native_timeline(&self, device_id: &str);
}
