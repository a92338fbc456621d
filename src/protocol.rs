//! Wire-format constants, command codes, and the command-frame encoder for the
//! Clip UART protocol.
//!
//! The device and the host share one byte channel carrying three kinds of
//! traffic:
//!
//! | Traffic | Shape | Example |
//! |---|---|---|
//! | Command frame | `{` code value `}` (4 bytes) | `{W2}` |
//! | Report | `[` tag `:` payload `]` | `[ACK:W2]`, `[STS_DATA:120]` |
//! | Streaming payload | raw binary | `FD 15 7C 15 70 …` |
//!
//! Small integers travel as ASCII digits: the encoder adds `'0'` to any value
//! below it, and the decoder strips it again (see [`encode_command`] and
//! [`decode_digit`]).

// ── Delimiters ───────────────────────────────────────────────────────────────

/// Opening byte of a 4-byte command frame.
pub const COMMAND_START: u8 = b'{';

/// Closing byte of a 4-byte command frame.
pub const COMMAND_END: u8 = b'}';

/// Opening byte of a tagged report.
pub const REPORT_START: u8 = b'[';

/// Closing byte of a tagged report.
pub const REPORT_END: u8 = b']';

/// Total length of a command frame on the wire.
pub const COMMAND_FRAME_LEN: usize = 4;

// ── Command codes ────────────────────────────────────────────────────────────

/// Single-character command codes understood by the Clip firmware.
///
/// The same codes appear in both directions: the host writes them inside
/// command frames, and the device echoes them back inside `ACK`/`NAK` reports
/// or sends them unsolicited as direct command frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    /// Gesture classified by the device (`G`).
    Gesture = b'G',
    /// Calibration gesture status (`S`).
    GestureStatus = b'S',
    /// Calibration error (`E`).
    Error = b'E',
    /// Gesture quality, 0–9 (`Q`).
    GestureQuality = b'Q',
    /// Gesture status feedback; handled like [`CommandCode::GestureStatus`] (`F`).
    GestureFeedback = b'F',
    /// "Is calibrated" query (`C`).
    IsCalibrated = b'C',
    /// Liveness / handshake (`O`).
    Ok = b'O',
    /// Charging state (`t`).
    ChargingState = b't',
    /// Write execution state (`W`).
    WriteStatus = b'W',
    /// Select a setting slot (`T`).
    Setting = b'T',
    /// Setting payload, written before [`CommandCode::Setting`] (`D`).
    SettingData = b'D',
    /// Ping (`P`).
    Ping = b'P',
    /// Debug channel control (`z`).
    Debug = b'z',
    /// Shut the device down (`H`).
    Halt = b'H',
    /// Firmware version query (`V`).
    Version = b'V',
    /// Set the sampling ratio (`R`).
    SampleRatio = b'R',
    /// Ask the device to report its sampling ratio (`r`).
    RequestSampleRatio = b'r',
    /// Enable/disable raw sensor streaming (`s`).
    SensorStreaming = b's',
    /// Generic enable (`e`).
    Enable = b'e',
    /// Generic disable (`d`).
    Disable = b'd',
}

impl CommandCode {
    /// Every known code, in declaration order.
    pub const ALL: [CommandCode; 20] = [
        CommandCode::Gesture,
        CommandCode::GestureStatus,
        CommandCode::Error,
        CommandCode::GestureQuality,
        CommandCode::GestureFeedback,
        CommandCode::IsCalibrated,
        CommandCode::Ok,
        CommandCode::ChargingState,
        CommandCode::WriteStatus,
        CommandCode::Setting,
        CommandCode::SettingData,
        CommandCode::Ping,
        CommandCode::Debug,
        CommandCode::Halt,
        CommandCode::Version,
        CommandCode::SampleRatio,
        CommandCode::RequestSampleRatio,
        CommandCode::SensorStreaming,
        CommandCode::Enable,
        CommandCode::Disable,
    ];

    /// The ASCII byte used on the wire.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Look up a code from its wire byte. Returns `None` for unknown codes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_byte() == byte)
    }
}

// ── Report tags ──────────────────────────────────────────────────────────────

/// Positive acknowledgement: payload is `<code><value>`.
pub const TAG_ACK: &str = "ACK";
/// Negative acknowledgement: payload is `<code><value>`.
pub const TAG_NAK: &str = "NAK";
/// Physical button pressed.
pub const TAG_BUTTON: &str = "BT";
/// Streaming tick period.
pub const TAG_STREAMING_TICKS: &str = "STK";
/// Firmware source revision.
pub const TAG_FIRMWARE_REVISION: &str = "GIT";
/// Firmware version string.
pub const TAG_FIRMWARE_VERSION: &str = "VER";
/// Start of a binary capture; payload is the sample count.
pub const TAG_STREAM_START: &str = "STS_DATA";
/// End of a binary capture; payload is the sample count the device sent.
pub const TAG_STREAM_END: &str = "STE_DATA";

// ── Streaming payload ────────────────────────────────────────────────────────

/// Number of sensor channels per sample.
pub const CHANNELS: usize = 4;

/// Marker: following bytes are run-length counts of centre-valued samples.
pub const MARKER_SIGNAL_COUNT: u8 = 0xFF;
/// Marker: following bytes are signed 8-bit deltas against the previous sample.
pub const MARKER_INC_8BIT: u8 = 0xFE;
/// Marker: following byte pairs are big-endian 16-bit values.
pub const MARKER_FULL_16BIT: u8 = 0xFD;

/// Neutral reading emitted for every channel of a run-length encoded sample.
pub const CENTRE_SIGNAL: [u16; CHANNELS] = [5488, 5488, 5488, 5488];

/// Value every slot of a fresh capture buffer is pre-filled with.
pub const BUFFER_FILL: u16 = 5500;

// ── Settings and queries ─────────────────────────────────────────────────────

/// Setting slot: number of gestures to calibrate.
pub const SET_NUMBER_GESTURE: u8 = 0xC0;
/// Setting slot: repetitions per calibrated gesture.
pub const SET_NUMBER_REPETITION: u8 = 0xC1;

/// [`CommandCode::Version`] selector for the compilation version (`VER`).
pub const VERSION_COMPILATION: u8 = 0;
/// [`CommandCode::Version`] selector for the source revision (`GIT`).
pub const VERSION_REVISION: u8 = 1;

/// Value the device sends with [`CommandCode::Ok`] to complete the handshake.
pub const HANDSHAKE_ACK: u8 = b'K';

/// Firmware build this protocol implementation was written against.
pub const FIRMWARE_APPLICATION_VERSION: &str = "v310517-0745";

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Encode a command frame for the device.
///
/// ```text
/// byte 0 : '{'
/// byte 1 : command code
/// byte 2 : value (value < '0' is shifted up by '0')
/// byte 3 : '}'
/// ```
///
/// Values already at or above `'0'` are sent untouched, so callers passing an
/// ASCII character (or a setting slot such as [`SET_NUMBER_GESTURE`]) must not
/// pre-shift it.
///
/// ```
/// # use clip_rs::protocol::{encode_command, CommandCode};
/// assert_eq!(&encode_command(CommandCode::WriteStatus, 2), b"{W2}");
/// assert_eq!(&encode_command(CommandCode::Setting, 0xC0), &[b'{', b'T', 0xC0, b'}']);
/// ```
pub fn encode_command(code: CommandCode, value: u8) -> [u8; COMMAND_FRAME_LEN] {
    let value = if value < b'0' { value + b'0' } else { value };
    [COMMAND_START, code.as_byte(), value, COMMAND_END]
}

/// Strip the ASCII offset from a digit carried in a direct command frame.
///
/// Non-digit bytes (such as the `K` of the handshake) are returned unchanged.
pub fn decode_digit(value: u8) -> u8 {
    if value.is_ascii_digit() {
        value - b'0'
    } else {
        value
    }
}

/// Value carried by an `ACK`/`NAK` report: the byte minus `'0'`.
///
/// Unlike [`decode_digit`] this is applied unconditionally, so `K` becomes 27
/// and bytes below `'0'` become negative.
pub fn ack_value(byte: u8) -> i16 {
    i16::from(byte) - i16::from(b'0')
}
