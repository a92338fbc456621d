//! Error taxonomy for the protocol engine.
//!
//! None of these are fatal. The engine absorbs every variant at the point it
//! occurs and logs it; they are surfaced as values only by the lower-level
//! parsing helpers so that callers and tests can see why a frame was dropped.

use thiserror::Error;

/// Protocol-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The chunk matched neither the report grammar nor the command-frame shape.
    #[error("Malformed frame ({len} bytes)")]
    MalformedFrame { len: usize },

    /// A report matched the grammar but its payload could not be interpreted.
    #[error("Malformed [{tag}] report payload: {payload:?}")]
    MalformedReport { tag: String, payload: String },

    /// `STE_DATA` reported a different sample count than `STS_DATA` announced.
    #[error("Capture size mismatch: expected {expected} samples, device reported {reported}")]
    CaptureSizeMismatch { expected: usize, reported: usize },

    /// A decoded value would land outside the capture buffer.
    #[error("Decode overflow: slot {index} outside buffer of {len}")]
    DecodeOverflow { index: usize, len: usize },

    /// An outbound frame was requested with no transport registered.
    #[error("No transport registered")]
    MissingTransport,

    /// The registered transport rejected the write.
    #[error("Transport error: {0}")]
    Transport(String),
}
