//! Inbound frame classification.
//!
//! Every chunk delivered by the transport is turned into exactly one
//! [`Frame`] before anything else looks at it. Binary sample traffic must
//! never be mistaken for text, so the byte-range check in
//! [`is_sample_data`] runs before any attempt to parse a report.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProtocolError;
use crate::protocol::{
    decode_digit, CommandCode, COMMAND_END, COMMAND_FRAME_LEN, COMMAND_START, REPORT_END,
    REPORT_START,
};

/// `[tag:payload]`, anchored on both ends. `.` does not cross newlines.
static REPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let open = regex::escape(&char::from(REPORT_START).to_string());
    let close = regex::escape(&char::from(REPORT_END).to_string());
    Regex::new(&format!(r"^{open}(\w+):(.*){close}$")).expect("report pattern must compile")
});

// ── Command frames ───────────────────────────────────────────────────────────

/// A 4-byte `{code value}` frame as received from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Raw code byte.
    pub code: u8,
    /// Raw value byte, still ASCII-encoded.
    pub value: u8,
}

impl CommandFrame {
    /// Recognise `{` code value `}`. Any other length or delimiter fails.
    pub fn parse(chunk: &[u8]) -> Option<Self> {
        match chunk {
            [COMMAND_START, code, value, COMMAND_END] => Some(Self {
                code: *code,
                value: *value,
            }),
            _ => None,
        }
    }

    /// Known command code, if any.
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::from_byte(self.code)
    }

    /// Value with the ASCII-digit offset removed (see [`decode_digit`]).
    pub fn digit_value(&self) -> u8 {
        decode_digit(self.value)
    }

    /// Wire representation.
    pub fn to_bytes(self) -> [u8; COMMAND_FRAME_LEN] {
        [COMMAND_START, self.code, self.value, COMMAND_END]
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

/// A `[tag:payload]` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub tag: String,
    pub payload: String,
}

impl Report {
    /// Match the whole of `text` against the report grammar.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = REPORT_PATTERN.captures(text)?;
        // Group 0 is the whole match; the grammar has exactly two groups.
        if caps.len() != 3 {
            return None;
        }
        Some(Self {
            tag: caps.get(1)?.as_str().to_owned(),
            payload: caps.get(2)?.as_str().to_owned(),
        })
    }

    /// Payload interpreted as an unsigned decimal number.
    pub fn numeric_payload(&self) -> Result<usize, ProtocolError> {
        self.payload.parse().map_err(|_| self.malformed())
    }

    /// `ACK`/`NAK` payload split into `(command byte, value byte)`.
    ///
    /// Only the first two bytes are significant; trailing bytes are ignored.
    pub fn ack_parts(&self) -> Result<(u8, u8), ProtocolError> {
        match self.payload.as_bytes() {
            [cmd, value, ..] => Ok((*cmd, *value)),
            _ => Err(self.malformed()),
        }
    }

    fn malformed(&self) -> ProtocolError {
        ProtocolError::MalformedReport {
            tag: self.tag.clone(),
            payload: self.payload.clone(),
        }
    }
}

// ── Classification ───────────────────────────────────────────────────────────

/// One classified inbound chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Direct `{code value}` frame.
    Command(CommandFrame),
    /// Tagged `[tag:payload]` report.
    Report(Report),
    /// Bytes for the streaming sample decoder.
    Streaming(&'a [u8]),
    /// Zero-length chunk; marks end of stream when a capture is open.
    Empty,
    /// Anything else. Dropped by the dispatcher.
    Malformed(ProtocolError),
}

/// `true` when `buf` contains at least one byte outside printable ASCII
/// (newline excepted).
pub fn is_sample_data(buf: &[u8]) -> bool {
    buf.iter().any(|&b| b >= 127 || (b < 32 && b != b'\n'))
}

/// Classify an inbound chunk.
///
/// `capturing` tells the classifier whether a streaming capture is open. While
/// it is, every chunk that is not an exact report or command frame is sample
/// payload, including chunks whose bytes all happen to be printable.
pub fn classify(chunk: &[u8], capturing: bool) -> Frame<'_> {
    if chunk.is_empty() {
        return Frame::Empty;
    }
    if is_sample_data(chunk) {
        return Frame::Streaming(chunk);
    }
    if let Some(frame) = parse_control(chunk) {
        return frame;
    }
    if capturing {
        Frame::Streaming(chunk)
    } else {
        Frame::Malformed(ProtocolError::MalformedFrame { len: chunk.len() })
    }
}

fn parse_control(chunk: &[u8]) -> Option<Frame<'static>> {
    if let Some(report) = std::str::from_utf8(chunk).ok().and_then(Report::parse) {
        return Some(Frame::Report(report));
    }
    CommandFrame::parse(chunk).map(Frame::Command)
}
