//! Engine configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::DEFAULT_SAMPLING_RATE;

/// Configuration for [`crate::engine::ClipEngine`].
///
/// Every field has a default, so a JSON file only needs the keys it changes:
///
/// ```
/// # use clip_rs::config::EngineConfig;
/// let cfg = EngineConfig::from_json_str(r#"{ "vibration_feedback": true }"#).unwrap();
/// assert!(cfg.vibration_feedback);
/// assert_eq!(cfg.calibration_gestures, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vibrate on execution-state changes (`SLEEP`, `EXEC`). Gesture
    /// vibration is not affected. Default: `false`.
    pub vibration_feedback: bool,
    /// Gestures to train during calibration. Default: `4`.
    pub calibration_gestures: u8,
    /// Repetitions per gesture during calibration. Default: `3`.
    pub calibration_repetitions: u8,
    /// Ask the firmware to simulate calibration (`z1`, `z2`) instead of
    /// running it for real (`z0`). Default: `false`.
    pub fake_calibration: bool,
    /// Sampling ratio requested after the handshake. Default: `1`.
    pub default_sampling_rate: u8,
    /// Capacity of the event channel. Events, including finished captures,
    /// are dropped with a warning when the consumer falls this far behind.
    /// Default: `256`.
    pub event_buffer: usize,
    /// Largest `STS_DATA` sample count the engine will allocate for. Larger
    /// announcements are rejected as malformed. Default: `65536`.
    pub max_capture_samples: usize,
    /// Log every decoded sample at `debug` level. Default: `false`.
    pub decode_trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vibration_feedback: false,
            calibration_gestures: 4,
            calibration_repetitions: 3,
            fake_calibration: false,
            default_sampling_rate: DEFAULT_SAMPLING_RATE,
            event_buffer: 256,
            max_capture_samples: 65_536,
            decode_trace: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid engine configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(EngineConfig::from_json_str(r#"{ "event_buffer": "lots" }"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fake_calibration": true, "calibration_repetitions": 5 }}"#).unwrap();
        let cfg = EngineConfig::from_json_file(file.path()).unwrap();
        assert!(cfg.fake_calibration);
        assert_eq!(cfg.calibration_repetitions, 5);
        assert_eq!(cfg.event_buffer, 256);
        assert_eq!(cfg.max_capture_samples, 65_536);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = EngineConfig::from_json_file("/nonexistent/clip.json").unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
