//! Demo configuration, loaded from an optional JSON file.
//!
//! Every field has a default, so `{}` is a valid file:
//!
//! ```json
//! { "tick_rate": 30.0, "max_ticks": 300, "entities": 10000, "gravity": [0.0, -9.81, 0.0] }
//! ```

use std::path::Path;

use anyhow::{Context, Result, ensure};
use glam::Vec3;
use serde::Deserialize;

/// Configuration for the tick loop and the demo scene.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Entities spawned before the first tick.
    pub entities: usize,
    /// Worker threads (0 = `ENGINE_WORKERS` or available parallelism).
    pub workers: usize,
    /// Constant acceleration applied to every moving entity.
    pub gravity: Vec3,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            entities: 1024,
            workers: 0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl TickConfig {
    /// Load from `path`, or use the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if `tick_rate` is not
    /// a positive number.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_json(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, unknown fields or a non-positive `tick_rate`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        ensure!(
            config.tick_rate.is_finite() && config.tick_rate > 0.0,
            "tick_rate must be positive, got {}",
            config.tick_rate
        );
        Ok(config)
    }

    /// Fixed time step in seconds.
    #[must_use]
    pub fn dt(&self) -> f32 {
        (1.0 / self.tick_rate) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(TickConfig::from_json("{}").unwrap(), TickConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config =
            TickConfig::from_json(r#"{ "max_ticks": 5, "gravity": [0.0, 0.0, -1.0] }"#).unwrap();
        assert_eq!(config.max_ticks, 5);
        assert_eq!(config.gravity, Vec3::NEG_Z);
        assert_eq!(config.tick_rate, 60.0);
    }

    #[test]
    fn test_rejects_bad_tick_rate() {
        assert!(TickConfig::from_json(r#"{ "tick_rate": 0.0 }"#).is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(TickConfig::from_json(r#"{ "tickrate": 30.0 }"#).is_err());
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(TickConfig::load(None).unwrap(), TickConfig::default());
    }
}
