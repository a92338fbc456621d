//! Event and data types produced by the engine.

use std::fmt;

use crate::protocol::CHANNELS;
use crate::session::ExecutionState;

// ── Gestures ─────────────────────────────────────────────────────────────────

/// Gesture codes reported by `G` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gesture {
    None = 0,
    Enter = 1,
    Home = 2,
    Up = 3,
    Down = 4,
    Back = 5,
    /// The hardware button, reported through the same path as gestures.
    PhysicalButton = 10,
}

impl Gesture {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Enter,
            2 => Self::Home,
            3 => Self::Up,
            4 => Self::Down,
            5 => Self::Back,
            10 => Self::PhysicalButton,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Enter => "ENTER",
            Self::Home => "HOME",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Back => "BACK",
            Self::PhysicalButton => "BUTTON",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display name for any gesture code; unknown codes read as `"NONE"`.
pub fn gesture_name(code: u8) -> &'static str {
    Gesture::from_code(code).map_or("NONE", Gesture::name)
}

// ── Event payloads ───────────────────────────────────────────────────────────

/// A gesture-status value from a direct `S`/`F` frame.
///
/// The firmware packs two digits into the value; `unit` and `decimal` are
/// `value % 10` and `(value / 10) % 10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureStatusReport {
    pub value: u8,
    pub unit: u8,
    pub decimal: u8,
}

impl GestureStatusReport {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            unit: value % 10,
            decimal: (value / 10) % 10,
        }
    }
}

/// An `ACK` or `NAK` that no specialised handler consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckReport {
    /// `true` for `ACK`, `false` for `NAK`.
    pub ack: bool,
    /// Raw command byte echoed by the device.
    pub command: u8,
    /// Value byte minus `'0'`; may be negative or above 9.
    pub value: i16,
}

/// A decoded binary capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    /// Gesture code current when the capture closed.
    pub gesture: u8,
    /// Decoded values, [`CHANNELS`] per sample, sample-major.
    pub samples: Vec<u16>,
    /// Bytes consumed by the decoder.
    pub raw: Vec<u8>,
    /// `false` when the capture was flushed before reaching its sample count.
    pub complete: bool,
}

impl RawCapture {
    pub fn sample_count(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Iterate samples as `[c0, c1, c2, c3]`.
    pub fn iter_samples(&self) -> impl Iterator<Item = [u16; CHANNELS]> + '_ {
        self.samples.chunks_exact(CHANNELS).map(|s| [s[0], s[1], s[2], s[3]])
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Domain events emitted by [`crate::engine::ClipEngine`], in processing order.
///
/// Consumers receive these through the `mpsc::Receiver` returned by
/// [`crate::engine::ClipEngine::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipEvent {
    /// `{OK}` handshake completed; the engine has already issued its
    /// post-handshake queries.
    DeviceReady,
    /// `G` with a nonzero code.
    GestureClassified(u8),
    /// `G` with code 0.
    GestureUnclassified,
    /// `Q`, 0–9.
    GestureQuality(u8),
    GestureStatus(GestureStatusReport),
    /// The device acknowledged `S` with `STARTED`.
    CalibrationStepStarted { gesture_index: u8, iteration: u8 },
    /// The device acknowledged a write into the calibration state.
    CalibrationWritten(ExecutionState),
    NotCalibrated,
    ChargingState(bool),
    BatteryLevel(u8),
    FirmwareVersion(String),
    FirmwareRevision(String),
    /// `STK` tick period.
    StreamingSpeed(u32),
    /// `BT` payload.
    ButtonPressed(String),
    DeviceAck(AckReport),
    RawSamples(RawCapture),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_names() {
        assert_eq!(gesture_name(1), "ENTER");
        assert_eq!(gesture_name(5), "BACK");
        assert_eq!(gesture_name(10), "BUTTON");
        assert_eq!(gesture_name(7), "NONE");
        assert_eq!(Gesture::Up.to_string(), "UP");
    }

    #[test]
    fn status_digits() {
        let r = GestureStatusReport::new(47);
        assert_eq!((r.unit, r.decimal), (7, 4));
        let r = GestureStatusReport::new(123);
        assert_eq!((r.unit, r.decimal), (3, 2));
    }

    #[test]
    fn capture_sample_iteration() {
        let cap = RawCapture {
            gesture: 2,
            samples: vec![1, 2, 3, 4, 5, 6, 7, 8],
            raw: vec![],
            complete: true,
        };
        assert_eq!(cap.sample_count(), 2);
        let all: Vec<_> = cap.iter_samples().collect();
        assert_eq!(all, vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
    }
}
