//! Console stand-ins for the vendor transport
//!
//! The real BLE link and payload builder come from the vendor SDK; these
//! implementations log sends instead, for demos and manual testing.

use lumen_link::{DeviceHandle, DeviceLink, EffectIntent, LinkError, PayloadBuilder};

/// A `DeviceLink` that prints transmissions instead of radioing them
pub struct ConsoleLink {
    devices: Vec<DeviceHandle>,
}

impl ConsoleLink {
    pub fn new(device_ids: &[&str]) -> Self {
        Self {
            devices: device_ids
                .iter()
                .map(|id| DeviceHandle::new(*id, format!("console stick {id}")))
                .collect(),
        }
    }
}

impl DeviceLink for ConsoleLink {
    fn send(&self, device_id: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(LinkError::NotConnected(device_id.to_string()));
        }
        tracing::info!(device = device_id, bytes = payload.len(), payload = ?payload, "send");
        Ok(())
    }

    fn connected_devices(&self) -> Vec<DeviceHandle> {
        self.devices.clone()
    }

    fn load_native_timeline(&self, device_id: &str, entries: &[(u32, Vec<u8>)]) -> bool {
        // No native player on the console; the engine drives emission
        tracing::debug!(device = device_id, entries = entries.len(), "no native timeline player");
        false
    }

    fn update_playback_position(&self, device_id: &str, position_ms: u32) {
        tracing::debug!(device = device_id, position_ms, "position update");
    }

    fn stop_native_timeline(&self, device_id: &str) {
        tracing::debug!(device = device_id, "stop native timeline");
    }
}

/// Demo wire encoding: one tag byte followed by the intent's parameters
///
/// Stands in for the vendor payload builder; the engine never looks
/// inside the bytes.
pub struct ConsolePayloadBuilder;

impl PayloadBuilder for ConsolePayloadBuilder {
    fn build(&self, intent: &EffectIntent) -> Vec<u8> {
        match intent {
            EffectIntent::SolidColor { color, transit_ms } => {
                let mut p = vec![0x01, color.r, color.g, color.b];
                p.extend_from_slice(&transit_ms.to_le_bytes());
                p
            }
            EffectIntent::Blink {
                color,
                background,
                period_ms,
            } => {
                let mut p = vec![
                    0x02, color.r, color.g, color.b, background.r, background.g, background.b,
                ];
                p.extend_from_slice(&period_ms.to_le_bytes());
                p
            }
            EffectIntent::Breathe { color, period_ms } => {
                let mut p = vec![0x03, color.r, color.g, color.b];
                p.extend_from_slice(&period_ms.to_le_bytes());
                p
            }
            EffectIntent::Strobe { color, period_ms } => {
                let mut p = vec![0x04, color.r, color.g, color.b];
                p.extend_from_slice(&period_ms.to_le_bytes());
                p
            }
            EffectIntent::TimelineFrame { payload } => payload.clone(),
            EffectIntent::Off => vec![0x00],
        }
    }
}
