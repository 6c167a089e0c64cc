//! Device link boundary for Lumen
//!
//! The vendor BLE transport lives behind the [`DeviceLink`] trait; payload
//! wire encoding lives behind [`PayloadBuilder`]. The rest of the workspace
//! depends on these traits, never on a concrete transport.

mod intent;
mod link;

pub use intent::{EffectIntent, PayloadBuilder, Rgb};
pub use link::{DeviceHandle, DeviceLink, LinkError};
