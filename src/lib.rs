//! # clip-rs
//!
//! Protocol engine for the Clip wearable gesture controller.
//!
//! The Clip talks to its host over a single UART-style byte channel that
//! carries three kinds of traffic at once: 4-byte `{code value}` command
//! frames, `[tag:payload]` reports, and bursts of binary sensor samples. This
//! crate frames that traffic, tracks the device's connection, calibration and
//! execution state, decodes the mode-switching sample stream into 4-channel
//! arrays, and encodes commands going the other way.
//!
//! Establishing the radio link, rendering samples and driving the vibration
//! motor are left to the host application.
//!
//! ## Quick start
//!
//! ```no_run
//! use clip_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mut engine, mut rx) = ClipEngine::new(EngineConfig::default());
//!     let (transport, mut outbound) = ChannelTransport::new();
//!     engine.register_transport(transport);
//!
//!     // Feed chunks as the link delivers them.
//!     engine.handle_chunk(b"{OK}");
//!
//!     while let Ok(frame) = outbound.try_recv() {
//!         println!("to device: {}", frame.escape_ascii());
//!     }
//!     while let Ok(event) = rx.try_recv() {
//!         match event {
//!             ClipEvent::DeviceReady => println!("ready"),
//!             ClipEvent::GestureClassified(g) => println!("gesture {}", gesture_name(g)),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`engine`] | [`engine::ClipEngine`]: inbound dispatch, state tracking and the command API |
//! | [`frame`] | Chunk classification and `{…}` / `[…]` frame parsing |
//! | [`stream`] | Streaming sample decoder |
//! | [`session`] | Device and calibration state records |
//! | [`protocol`] | Command codes, report tags, markers and the command encoder |
//! | [`types`] | Events and their payloads |
//! | [`vibration`] | Vibration pattern selection and the actuator worker |
//! | [`transport`] | Outbound transport trait and a channel-backed implementation |
//! | [`config`] | [`config::EngineConfig`] |
//! | [`export`] | JSON descriptor for captured samples |
//! | [`error`] | [`error::ProtocolError`] |

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;
pub mod vibration;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Engine ────────────────────────────────────────────────────────────────
    pub use crate::config::EngineConfig;
    pub use crate::engine::{ClipEngine, SleepSchedule};
    pub use crate::transport::{ChannelTransport, Transport};
    pub use crate::vibration::{Actuator, VibrationDispatcher, VibrationPattern};

    // ── Events and state ──────────────────────────────────────────────────────
    pub use crate::export::CaptureMetadata;
    pub use crate::session::{CalibrationState, DeviceSession, ExecutionState, GestureStatus};
    pub use crate::types::{
        gesture_name, AckReport, ClipEvent, Gesture, GestureStatusReport, RawCapture,
    };

    // ── Protocol ──────────────────────────────────────────────────────────────
    pub use crate::error::ProtocolError;
    pub use crate::protocol::{encode_command, CommandCode, CHANNELS};
}
