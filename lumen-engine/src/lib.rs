//! Effect engine for Lumen
//!
//! Translates high-level effect intents, timeline positions, and live
//! band energies into arbitrated device transmissions.

mod engine;
mod task;

pub use engine::{EffectEngine, PlaybackState, FFT_TRANSIT_MS};
pub use task::EffectTask;
