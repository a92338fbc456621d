//! Per-connection device and calibration state.
//!
//! Both records are owned by [`crate::engine::ClipEngine`]; applications see
//! them through read-only accessors. [`DeviceSession::reset`] returns every
//! field to its connect-time default.

use std::fmt;

use crate::protocol::HANDSHAKE_ACK;

/// Sampling ratio requested right after the handshake.
pub const DEFAULT_SAMPLING_RATE: u8 = 1;

/// Tick period assumed until the device reports `STK`.
pub const DEFAULT_SAMPLING_TICKS: u32 = 2500;

// ── Execution state ──────────────────────────────────────────────────────────

/// Device execution state. The discriminant is the wire code carried by
/// `W` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ExecutionState {
    #[default]
    Idle = 0,
    Calibrating = 1,
    Executing = 2,
    Sleeping = 3,
    PrecalibAmplitude = 4,
    PrecalibCadence = 5,
    PrecalibSimilarity = 6,
    PrecalibDebug = 7,
}

impl ExecutionState {
    /// Map a wire code; `None` for anything outside `0..=7`.
    pub fn from_wire(code: i16) -> Option<Self> {
        Some(match code {
            0 => Self::Idle,
            1 => Self::Calibrating,
            2 => Self::Executing,
            3 => Self::Sleeping,
            4 => Self::PrecalibAmplitude,
            5 => Self::PrecalibCadence,
            6 => Self::PrecalibSimilarity,
            7 => Self::PrecalibDebug,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Calibrating => "CALIB",
            Self::Executing => "EXEC",
            Self::Sleeping => "SLEEP",
            Self::PrecalibAmplitude => "PRECALIB_AMP",
            Self::PrecalibCadence => "PRECALIB_CAD",
            Self::PrecalibSimilarity => "PRECALIB_SIM",
            Self::PrecalibDebug => "PRECALIB_DEB",
        })
    }
}

// ── Gesture status ───────────────────────────────────────────────────────────

/// Secondary calibration status carried by `S`/`F` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum GestureStatus {
    #[default]
    None = 0,
    Started = 1,
    Recording = 2,
    Ok = 3,
    Error1 = 4,
    Error2 = 5,
    Error3 = 6,
    OkRepetition = 7,
    OkGesture = 8,
    OkCalibration = 9,
    OkAmplitude = 10,
    OkCadence = 11,
    OkSimilarity = 12,
}

impl GestureStatus {
    pub fn from_wire(code: i16) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Started,
            2 => Self::Recording,
            3 => Self::Ok,
            4 => Self::Error1,
            5 => Self::Error2,
            6 => Self::Error3,
            7 => Self::OkRepetition,
            8 => Self::OkGesture,
            9 => Self::OkCalibration,
            10 => Self::OkAmplitude,
            11 => Self::OkCadence,
            12 => Self::OkSimilarity,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for GestureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Started => "STARTED",
            Self::Recording => "RECORDING",
            Self::Ok => "OK",
            Self::Error1 => "ERROR1",
            Self::Error2 => "ERROR2",
            Self::Error3 => "ERROR3",
            Self::OkRepetition => "OKREPETITION",
            Self::OkGesture => "OKGESTURE",
            Self::OkCalibration => "OKCALIBRATION",
            Self::OkAmplitude => "OKCAMP",
            Self::OkCadence => "OKCAD",
            Self::OkSimilarity => "OKCSIM",
        })
    }
}

// ── Device session ───────────────────────────────────────────────────────────

/// Everything the engine knows about the connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    /// `{OK}` has been received on this connection.
    pub handshake_ok: bool,
    pub calibrated: bool,
    pub charging: bool,
    /// Only changes on `[ACK:W<n>]`.
    pub execution_state: ExecutionState,
    /// `VER` payload; empty until reported.
    pub firmware_version: String,
    /// `GIT` payload; empty until reported.
    pub firmware_revision: String,
    /// Last ratio sent with `R`.
    pub sampling_rate: u8,
    /// Tick period from `STK`.
    pub sampling_ticks: u32,
    pub battery_level: Option<u8>,
    /// Code of the most recent `G` frame.
    pub last_gesture: u8,
    /// Sample count of the most recent `STS_DATA`.
    pub last_capture_expected: Option<usize>,
    pub application_visible: bool,
    pub application_paused: bool,
    /// A sleep timer has been armed and not yet fired or cancelled.
    pub sleep_pending: bool,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self {
            handshake_ok: false,
            calibrated: false,
            charging: false,
            execution_state: ExecutionState::Idle,
            firmware_version: String::new(),
            firmware_revision: String::new(),
            sampling_rate: DEFAULT_SAMPLING_RATE,
            sampling_ticks: DEFAULT_SAMPLING_TICKS,
            battery_level: None,
            last_gesture: 0,
            last_capture_expected: None,
            application_visible: false,
            application_paused: false,
            sleep_pending: false,
        }
    }
}

impl DeviceSession {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record an `O` value. Returns `true` only on the false → true edge.
    pub fn accept_handshake(&mut self, value: u8) -> bool {
        if value != HANDSHAKE_ACK || self.handshake_ok {
            return false;
        }
        self.handshake_ok = true;
        true
    }
}

// ── Calibration state ────────────────────────────────────────────────────────

/// Progress of an on-device calibration session.
///
/// `gesture_index` and `gesture_iteration` are set by
/// [`CalibrationState::begin`] and then only reported, never advanced: the
/// device owns the step sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationState {
    pub num_gestures: u8,
    pub num_repetitions: u8,
    pub gesture_index: u8,
    pub gesture_iteration: u8,
    /// Last `CALIB`-family state acknowledged by the device.
    pub calibration_status: Option<ExecutionState>,
    pub gesture_status: GestureStatus,
}

impl CalibrationState {
    pub fn new(num_gestures: u8, num_repetitions: u8) -> Self {
        Self {
            num_gestures,
            num_repetitions,
            gesture_index: 0,
            gesture_iteration: 0,
            calibration_status: None,
            gesture_status: GestureStatus::None,
        }
    }

    /// Reset for a fresh calibration run. Counts are kept.
    pub fn begin(&mut self) {
        self.calibration_status = None;
        self.gesture_status = GestureStatus::None;
        self.gesture_index = 1;
        self.gesture_iteration = 1;
    }
}
