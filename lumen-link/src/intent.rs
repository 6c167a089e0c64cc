//! High-level effect intents and the payload builder boundary
//!
//! The core never defines wire bytes. It describes what the stick should do
//! as an [`EffectIntent`] and hands it to a vendor-supplied
//! [`PayloadBuilder`] for encoding.

/// 8-bit RGB color triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// All channels off
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
}

/// What the light stick should do, independent of wire encoding
///
/// Matched exhaustively by payload builders; adding a variant forces every
/// builder to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectIntent {
    /// Hold a single color, fading over `transit_ms`
    SolidColor { color: Rgb, transit_ms: u16 },
    /// Alternate between color and background at `period_ms`
    Blink {
        color: Rgb,
        background: Rgb,
        period_ms: u16,
    },
    /// Sinusoidal fade in/out at `period_ms`
    Breathe { color: Rgb, period_ms: u16 },
    /// Hard on/off flashes at `period_ms`
    Strobe { color: Rgb, period_ms: u16 },
    /// Pre-encoded timeline frame, passed through untouched
    TimelineFrame { payload: Vec<u8> },
    /// Turn the stick off
    Off,
}

/// Encodes an [`EffectIntent`] into vendor wire bytes
///
/// Implemented once against the actual device SDK; the engine treats the
/// output as opaque.
pub trait PayloadBuilder: Send + Sync {
    fn build(&self, intent: &EffectIntent) -> Vec<u8>;
}
