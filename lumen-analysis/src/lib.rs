//! Live audio analysis for Lumen
//!
//! Reduces raw PCM windows to three frequency-band energies that drive
//! audio-reactive light effects.

mod spectrum;

pub use spectrum::{FrequencyBand, SpectrumAnalyzer, DEFAULT_WINDOW_SIZE};
