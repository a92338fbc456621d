//! Streaming sample decoder.
//!
//! A capture is opened by a `[STS_DATA:n]` report and reconstructs `n`
//! four-channel samples from the binary bytes that follow. The device switches
//! between three encodings on the fly; a switch is only recognised at the
//! start of a sample (channel 0, no half-word pending):
//!
//! | Marker | Mode | Consumes | Produces |
//! |---|---|---|---|
//! | `0xFD` | [`DecodeMode::Full16Bit`] (initial) | 2 bytes | 1 channel, `(hi << 8) + lo` |
//! | `0xFE` | [`DecodeMode::Incremental8Bit`] | 1 byte | 1 channel, previous sample + signed delta |
//! | `0xFF` | [`DecodeMode::SignalCount`] | 1 byte `k` | `k` samples of [`CENTRE_SIGNAL`] |
//!
//! The sample buffer is pre-filled with [`BUFFER_FILL`], so a capture that is
//! flushed early still yields a complete array.

use log::{debug, info, warn};

use crate::error::ProtocolError;
use crate::protocol::{
    BUFFER_FILL, CENTRE_SIGNAL, CHANNELS, MARKER_FULL_16BIT, MARKER_INC_8BIT, MARKER_SIGNAL_COUNT,
};

/// Encoding currently applied to incoming bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    #[default]
    Full16Bit,
    Incremental8Bit,
    SignalCount,
}

impl DecodeMode {
    fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            MARKER_SIGNAL_COUNT => Some(DecodeMode::SignalCount),
            MARKER_INC_8BIT => Some(DecodeMode::Incremental8Bit),
            MARKER_FULL_16BIT => Some(DecodeMode::Full16Bit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStep {
    Pending,
    Complete,
}

/// An open binary capture.
#[derive(Debug, Clone)]
pub struct StreamingCapture {
    /// Samples announced by `STS_DATA`.
    expected: usize,
    /// `expected × CHANNELS` values, sample-major.
    samples: Vec<u16>,
    /// Every byte consumed so far, for diagnostics and export.
    raw: Vec<u8>,
    /// Index of the sample being written.
    position: usize,
    /// Channel within the current sample.
    channel: usize,
    mode: DecodeMode,
    /// High byte of a 16-bit value waiting for its low byte.
    pending_high: Option<u16>,
    /// Log every completed sample.
    trace: bool,
}

impl StreamingCapture {
    /// Open a capture for `expected` samples.
    ///
    /// The buffer is allocated up front, so `expected` must already be
    /// bounded; the engine rejects counts above
    /// [`EngineConfig::max_capture_samples`](crate::config::EngineConfig::max_capture_samples).
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            samples: vec![BUFFER_FILL; expected * CHANNELS],
            raw: Vec::new(),
            position: 0,
            channel: 0,
            mode: DecodeMode::default(),
            pending_high: None,
            trace: false,
        }
    }

    /// Enable per-sample debug logging.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Index of the next sample to be written.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Decoded values, sample-major (`[s0c0, s0c1, s0c2, s0c3, s1c0, …]`).
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Bytes consumed so far.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn total_bytes(&self) -> usize {
        self.raw.len()
    }

    /// `true` once the sample cursor has reached the announced count.
    pub fn is_complete(&self) -> bool {
        self.position >= self.expected
    }

    /// All four channels of one sample.
    pub fn sample(&self, index: usize) -> Option<[u16; CHANNELS]> {
        let base = index.checked_mul(CHANNELS)?;
        let slot = self.samples.get(base..base + CHANNELS)?;
        let mut out = [0u16; CHANNELS];
        out.copy_from_slice(slot);
        Some(out)
    }

    /// Consume the capture, returning `(samples, raw bytes)`.
    pub fn into_parts(self) -> (Vec<u16>, Vec<u8>) {
        (self.samples, self.raw)
    }

    /// Decode a chunk of streaming bytes.
    ///
    /// Returns `true` when the capture completed inside this chunk. Bytes
    /// after the completing byte are not consumed.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        for (i, &byte) in chunk.iter().enumerate() {
            self.raw.push(byte);
            if self.decode_byte(byte) == DecodeStep::Complete {
                let trailing = chunk.len() - i - 1;
                if trailing > 0 {
                    debug!("capture complete, ignoring {trailing} trailing byte(s)");
                }
                info!(
                    "End of stream: {} samples, {} bytes transferred",
                    self.position,
                    self.raw.len()
                );
                return true;
            }
        }
        false
    }

    fn decode_byte(&mut self, byte: u8) -> DecodeStep {
        if self.channel == 0 && self.pending_high.is_none() {
            if let Some(mode) = DecodeMode::from_marker(byte) {
                if self.trace {
                    debug!("stream mode → {mode:?}");
                }
                self.mode = mode;
                return DecodeStep::Pending;
            }
        }

        let value = match self.mode {
            DecodeMode::Full16Bit => match self.pending_high.take() {
                None => {
                    self.pending_high = Some(u16::from(byte) << 8);
                    return DecodeStep::Pending;
                }
                Some(high) => high | u16::from(byte),
            },
            DecodeMode::Incremental8Bit => {
                let delta = i16::from(byte as i8);
                self.previous_value().wrapping_add_signed(delta)
            }
            DecodeMode::SignalCount => {
                self.fill_centre(usize::from(byte));
                return if self.is_complete() {
                    DecodeStep::Complete
                } else {
                    DecodeStep::Pending
                };
            }
        };

        self.store(value)
    }

    /// Same channel of the previous sample. The first sample has no
    /// predecessor, so its own pre-filled slot is used as the base.
    fn previous_value(&self) -> u16 {
        let index = match self.position.checked_sub(1) {
            Some(prev) => prev * CHANNELS + self.channel,
            None => self.channel,
        };
        self.samples.get(index).copied().unwrap_or(BUFFER_FILL)
    }

    fn store(&mut self, value: u16) -> DecodeStep {
        let index = self.position * CHANNELS + self.channel;
        let len = self.samples.len();
        let Some(slot) = self.samples.get_mut(index) else {
            warn!("{}; byte dropped", ProtocolError::DecodeOverflow { index, len });
            return DecodeStep::Pending;
        };
        *slot = value;

        self.channel += 1;
        if self.channel < CHANNELS {
            return DecodeStep::Pending;
        }

        if self.trace {
            if let Some(s) = self.sample(self.position) {
                debug!("{} {} {} {} {}", self.position, s[0], s[1], s[2], s[3]);
            }
        }
        self.channel = 0;
        self.position += 1;
        if self.is_complete() {
            DecodeStep::Complete
        } else {
            DecodeStep::Pending
        }
    }

    fn fill_centre(&mut self, count: usize) {
        if self.trace {
            debug!("repeat {count}");
        }
        let len = self.samples.len();
        let end = self.position + count;
        for sample in self.position..end {
            let base = sample * CHANNELS;
            match self.samples.get_mut(base..base + CHANNELS) {
                Some(slot) => slot.copy_from_slice(&CENTRE_SIGNAL),
                None => {
                    warn!(
                        "{}; {} run-length sample(s) dropped",
                        ProtocolError::DecodeOverflow { index: base, len },
                        end - sample
                    );
                    break;
                }
            }
        }
        self.position += count;
        self.channel = 0;
    }
}
