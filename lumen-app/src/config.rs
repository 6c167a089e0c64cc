//! Simple configuration persistence for Lumen
//!
//! Stores policy tunables like the anti-flicker window and extra
//! cooperative source pairs.

use lumen_control::{PolicyConfig, TransmissionSource};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug)]
pub struct AppConfig {
    /// Anti-flicker suppression window in milliseconds
    pub suppression_ms: u64,
    /// Manual-over-timeline override window in milliseconds
    pub manual_override_ms: u64,
    /// Monitor history capacity
    pub history_capacity: usize,
    /// Extra cooperative pairs as (a, b) source names
    pub cooperative_pairs: Vec<(TransmissionSource, TransmissionSource)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let defaults = PolicyConfig::default();
        Self {
            suppression_ms: defaults.suppression_window.as_millis() as u64,
            manual_override_ms: defaults.manual_override_window.as_millis() as u64,
            history_capacity: defaults.history_capacity,
            cooperative_pairs: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen")
            .join("config.txt")
    }

    /// Materialize the policy the core components consume
    pub fn to_policy(&self) -> PolicyConfig {
        let mut policy = PolicyConfig {
            suppression_window: Duration::from_millis(self.suppression_ms),
            manual_override_window: Duration::from_millis(self.manual_override_ms),
            history_capacity: self.history_capacity,
            ..PolicyConfig::default()
        };
        for &(a, b) in &self.cooperative_pairs {
            policy.compatibility.allow(a, b);
        }
        policy
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "suppression_ms" => {
                        if let Ok(v) = value.parse() {
                            config.suppression_ms = v;
                        }
                    }
                    "manual_override_ms" => {
                        if let Ok(v) = value.parse() {
                            config.manual_override_ms = v;
                        }
                    }
                    "history_capacity" => {
                        if let Ok(v) = value.parse() {
                            config.history_capacity = v;
                        }
                    }
                    "cooperative_pairs" => {
                        config.cooperative_pairs = Self::parse_pairs(value);
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        config
    }

    /// Parse "a+b,c+d" into source pairs, skipping unknown names
    fn parse_pairs(value: &str) -> Vec<(TransmissionSource, TransmissionSource)> {
        value
            .split(',')
            .filter_map(|pair| {
                let (a, b) = pair.split_once('+')?;
                Some((Self::parse_source(a)?, Self::parse_source(b)?))
            })
            .collect()
    }

    fn parse_source(name: &str) -> Option<TransmissionSource> {
        TransmissionSource::ALL
            .iter()
            .copied()
            .find(|s| s.name() == name.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let content = r#"
            # Lumen policy
            suppression_ms = 250
            manual_override_ms = 750
            history_capacity = 32
            cooperative_pairs = timeline+fft, manual+broadcast
        "#;
        let config = AppConfig::parse(content);
        assert_eq!(config.suppression_ms, 250);
        assert_eq!(config.manual_override_ms, 750);
        assert_eq!(config.history_capacity, 32);
        assert_eq!(config.cooperative_pairs.len(), 2);

        let policy = config.to_policy();
        assert!(policy.compatibility.is_compatible(
            TransmissionSource::ManualEffect,
            TransmissionSource::Broadcast
        ));
    }

    #[test]
    fn test_garbage_lines_are_ignored() {
        let config = AppConfig::parse("nonsense\nsuppression_ms = what\nunknown = 1\n");
        assert_eq!(config.suppression_ms, AppConfig::default().suppression_ms);
    }
}
