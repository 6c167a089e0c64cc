//! Timeline handling for Lumen
//!
//! Parses and serializes the fixed-size binary `.efx` effect-timeline
//! format and loads timeline files from disk.

mod codec;
mod loader;

pub use codec::{decode, encode, CodecError, EfxEntry, Timeline, PAYLOAD_SIZE, RECORD_SIZE};
pub use loader::{LoadError, TimelineLoader};
