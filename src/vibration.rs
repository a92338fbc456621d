//! Haptic pattern selection and the fire-and-forget actuator worker.
//!
//! The engine only decides *which* pattern to play. Playing it is the job of
//! an [`Actuator`] running on its own task behind a [`VibrationDispatcher`],
//! so a slow motor driver never stalls decoding.

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::Gesture;

/// Named vibration patterns.
///
/// | Pattern | Timings (ms, off/on alternating) |
/// |---|---|
/// | `Default` | 0, 20, 10, 50 |
/// | `Enter` | 0, 50, 20, 10 |
/// | `Home` | 0, 50, 20, 50 |
/// | `Up` | 0, 20, 15, 40 |
/// | `Down` | 0, 40, 15, 20 |
/// | `Button` | 0, 30, 10, 40 |
/// | `Sleep` | 0, 20, 10, 20 |
/// | `Execution` | 0, 40, 10, 10 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VibrationPattern {
    Default,
    Enter,
    Home,
    Up,
    Down,
    Button,
    Sleep,
    Execution,
}

impl VibrationPattern {
    /// Map a gesture code to its pattern. The physical button has its own
    /// pattern; every other code past the table falls back to `Default`.
    pub fn select(code: u8) -> Self {
        if code == Gesture::PhysicalButton.code() {
            return Self::Button;
        }
        match code {
            1 => Self::Enter,
            2 => Self::Home,
            3 => Self::Up,
            4 => Self::Down,
            5 => Self::Button,
            6 => Self::Sleep,
            7 => Self::Execution,
            _ => Self::Default,
        }
    }

    /// Alternating off/on durations in milliseconds, starting with a delay.
    pub fn timings(self) -> [u64; 4] {
        match self {
            Self::Default => [0, 20, 10, 50],
            Self::Enter => [0, 50, 20, 10],
            Self::Home => [0, 50, 20, 50],
            Self::Up => [0, 20, 15, 40],
            Self::Down => [0, 40, 15, 20],
            Self::Button => [0, 30, 10, 40],
            Self::Sleep => [0, 20, 10, 20],
            Self::Execution => [0, 40, 10, 10],
        }
    }
}

/// Something that can play a vibration pattern.
pub trait Actuator: Send + 'static {
    fn vibrate(&mut self, pattern: VibrationPattern) -> anyhow::Result<()>;
}

impl<F> Actuator for F
where
    F: FnMut(VibrationPattern) -> anyhow::Result<()> + Send + 'static,
{
    fn vibrate(&mut self, pattern: VibrationPattern) -> anyhow::Result<()> {
        self(pattern)
    }
}

/// Non-blocking handle for queueing vibration requests.
#[derive(Debug, Clone)]
pub struct VibrationDispatcher {
    tx: mpsc::UnboundedSender<VibrationPattern>,
}

impl VibrationDispatcher {
    /// Start a worker task that drives `actuator`. Must be called inside a
    /// tokio runtime. The worker exits once every dispatcher clone is dropped.
    pub fn spawn<A: Actuator>(mut actuator: A) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<VibrationPattern>();
        let worker = tokio::spawn(async move {
            while let Some(pattern) = rx.recv().await {
                debug!("vibrate {pattern:?}");
                if let Err(e) = actuator.vibrate(pattern) {
                    warn!("Actuator failed on {pattern:?}: {e}");
                }
            }
            debug!("vibration worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Wrap an existing channel; the caller owns the receiving side.
    pub fn from_sender(tx: mpsc::UnboundedSender<VibrationPattern>) -> Self {
        Self { tx }
    }

    /// Queue a pattern. Never blocks; a stopped worker is logged and ignored.
    pub fn request(&self, pattern: VibrationPattern) {
        if self.tx.send(pattern).is_err() {
            warn!("Vibration worker gone; dropping {pattern:?}");
        }
    }
}
