//! Upload descriptor for decoded captures.
//!
//! The collection server expects a JSON sidecar next to each raw capture.
//! Numeric fields other than `gesture_size` travel as strings.

use serde::Serialize;

use crate::types::{gesture_name, RawCapture};

/// Facts about the connection a capture came from.
#[derive(Debug, Clone, Copy)]
pub struct CaptureContext<'a> {
    /// Device address, `AA:BB:CC:DD:EE:FF`.
    pub mac: &'a str,
    pub calibrating: bool,
    pub sampling_ticks: u32,
    pub sampling_rate: u8,
    /// Seconds since the Unix epoch.
    pub unix_time: u64,
}

/// JSON sidecar describing one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureMetadata {
    /// `<mac without colons>_<c|g><gesture>_<unix time>`.
    pub name: String,
    pub gesture: String,
    pub gesture_string: String,
    pub mac: String,
    /// `"calibration"` or `"gesture"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Raw bytes in the capture.
    pub gesture_size: usize,
    pub sampling_ticks: String,
    pub sampling_rate: String,
}

impl CaptureMetadata {
    pub fn new(capture: &RawCapture, ctx: &CaptureContext<'_>) -> Self {
        let prefix = if ctx.calibrating { 'c' } else { 'g' };
        let name = format!(
            "{}_{prefix}{}_{}",
            ctx.mac.replace(':', ""),
            capture.gesture,
            ctx.unix_time
        );
        Self {
            name,
            gesture: capture.gesture.to_string(),
            gesture_string: gesture_name(capture.gesture).to_owned(),
            mac: ctx.mac.to_owned(),
            kind: if ctx.calibrating { "calibration" } else { "gesture" }.to_owned(),
            gesture_size: capture.raw.len(),
            sampling_ticks: ctx.sampling_ticks.to_string(),
            sampling_rate: ctx.sampling_rate.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
