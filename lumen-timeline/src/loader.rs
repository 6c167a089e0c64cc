//! Timeline file loading

use crate::codec::{self, CodecError, Timeline};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a timeline file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Loads `.efx` timeline files from disk
pub struct TimelineLoader;

impl TimelineLoader {
    /// Read and decode a timeline file
    pub fn load(path: &Path) -> Result<Timeline, LoadError> {
        let bytes = std::fs::read(path)?;
        let timeline = codec::decode(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            entries = timeline.len(),
            "loaded timeline"
        );
        Ok(timeline)
    }

    /// Encode and write a timeline file
    pub fn save(path: &Path, timeline: &Timeline) -> Result<(), LoadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, codec::encode(timeline))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EfxEntry, PAYLOAD_SIZE};

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join("lumen-timeline-test");
        let path = dir.join("track.efx");
        let timeline = Timeline::new(vec![
            EfxEntry::new(0, [1; PAYLOAD_SIZE]),
            EfxEntry::new(2500, [2; PAYLOAD_SIZE]),
        ]);

        TimelineLoader::save(&path, &timeline).unwrap();
        let loaded = TimelineLoader::load(&path).unwrap();
        assert_eq!(loaded, timeline);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TimelineLoader::load(Path::new("/nonexistent/track.efx")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
