//! The Clip protocol engine.
//!
//! [`ClipEngine`] owns everything that belongs to one device connection:
//! session state, calibration progress, the optional open capture, the
//! outbound transport and the event sender. Inbound chunks go through
//! [`ClipEngine::handle_chunk`] strictly in arrival order; everything the
//! device tells us comes back out as [`ClipEvent`]s on the receiver returned
//! by [`ClipEngine::new`].
//!
//! # Inbound dispatch
//!
//! | Frame | Handling |
//! |---|---|
//! | `[ACK:W<n>]` | execution state → `n`; vibrate on `SLEEP`/`EXEC` when enabled |
//! | `[ACK:C<n>]` | calibrated = `n != 0`; calibrated devices are sent `{W2}` |
//! | `[ACK:S<n>]` | gesture-status feedback; `STARTED` opens a calibration step |
//! | `[ACK:OK]`, `{OK}` | handshake (first time only) |
//! | other `ACK`, every `NAK` | [`ClipEvent::DeviceAck`] |
//! | `[BT:…]` | wake from `SLEEP`, then [`ClipEvent::ButtonPressed`] |
//! | `[STK:n]`, `[GIT:…]`, `[VER:…]` | stored and re-emitted |
//! | `[STS_DATA:n]` / `[STE_DATA:n]` | open / close a binary capture |
//! | `{G n}`, `{Q n}`, `{S n}`, `{F n}`, `{t n}` | gesture, quality, status, charging |
//! | empty chunk | flush an open capture |
//!
//! Nothing here returns an error to the caller. Malformed input is logged
//! and dropped.

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::ProtocolError;
use crate::export::{CaptureContext, CaptureMetadata};
use crate::frame::{classify, CommandFrame, Frame, Report};
use crate::protocol::{
    ack_value, encode_command, CommandCode, CHANNELS, FIRMWARE_APPLICATION_VERSION,
    SET_NUMBER_GESTURE, SET_NUMBER_REPETITION, TAG_ACK, TAG_BUTTON, TAG_FIRMWARE_REVISION,
    TAG_FIRMWARE_VERSION, TAG_NAK, TAG_STREAMING_TICKS, TAG_STREAM_END, TAG_STREAM_START,
    VERSION_COMPILATION, VERSION_REVISION,
};
use crate::session::{CalibrationState, DeviceSession, ExecutionState, GestureStatus};
use crate::stream::StreamingCapture;
use crate::transport::Transport;
use crate::types::{AckReport, ClipEvent, GestureStatusReport, RawCapture};
use crate::vibration::{VibrationDispatcher, VibrationPattern};

/// What the host should do with its sleep timer after
/// [`ClipEngine::set_application_paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepSchedule {
    /// Start the timer and call [`ClipEngine::sleep_timer_elapsed`] when it fires.
    ArmTimer,
    /// The device is asleep or a timer is already running.
    AlreadyScheduled,
    /// Cancel any running timer; the device has been asked to resume.
    Cancelled,
}

// ── ClipEngine ───────────────────────────────────────────────────────────────

/// Protocol engine for one Clip connection.
pub struct ClipEngine {
    config: EngineConfig,
    session: DeviceSession,
    calibration: CalibrationState,
    capture: Option<StreamingCapture>,
    transport: Option<Box<dyn Transport>>,
    vibration: Option<VibrationDispatcher>,
    events: mpsc::Sender<ClipEvent>,
}

impl ClipEngine {
    /// Create an engine and the receiver its events are delivered on.
    ///
    /// The channel holds [`EngineConfig::event_buffer`] events and the engine
    /// never blocks on it: once full, further events are dropped with a
    /// warning, finished captures ([`ClipEvent::RawSamples`]) included. Drain
    /// the receiver between calls to [`handle_chunk`](Self::handle_chunk).
    pub fn new(config: EngineConfig) -> (Self, mpsc::Receiver<ClipEvent>) {
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let calibration =
            CalibrationState::new(config.calibration_gestures, config.calibration_repetitions);
        let engine = Self {
            config,
            session: DeviceSession::default(),
            calibration,
            capture: None,
            transport: None,
            vibration: None,
            events,
        };
        (engine, rx)
    }

    /// Route outbound frames to `transport`, replacing any previous one.
    pub fn register_transport(&mut self, transport: impl Transport + 'static) {
        self.transport = Some(Box::new(transport));
    }

    /// Send vibration requests to `dispatcher`. Without one they are skipped.
    pub fn set_vibration_dispatcher(&mut self, dispatcher: VibrationDispatcher) {
        self.vibration = Some(dispatcher);
    }

    /// Tear down per-connection state. Any open capture is discarded and the
    /// transport is unregistered; the vibration dispatcher is kept.
    pub fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            debug!(
                "discarding open capture at sample {}/{}",
                capture.position(),
                capture.expected()
            );
        }
        self.session.reset();
        self.calibration = CalibrationState::new(
            self.config.calibration_gestures,
            self.config.calibration_repetitions,
        );
        self.transport = None;
        info!("session released");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    /// The capture currently being decoded, if any.
    pub fn capture(&self) -> Option<&StreamingCapture> {
        self.capture.as_ref()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn is_calibrating(&self) -> bool {
        self.session.execution_state == ExecutionState::Calibrating
    }

    /// Upload descriptor for a capture produced by this engine.
    pub fn capture_metadata(
        &self,
        capture: &RawCapture,
        mac: &str,
        unix_time: u64,
    ) -> CaptureMetadata {
        CaptureMetadata::new(
            capture,
            &CaptureContext {
                mac,
                calibrating: self.is_calibrating(),
                sampling_ticks: self.session.sampling_ticks,
                sampling_rate: self.session.sampling_rate,
                unix_time,
            },
        )
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Process one chunk exactly as delivered by the transport.
    pub fn handle_chunk(&mut self, chunk: &[u8]) {
        match classify(chunk, self.capture.is_some()) {
            Frame::Empty => self.on_empty(),
            Frame::Streaming(bytes) => self.on_streaming(bytes),
            Frame::Report(report) => self.on_report(report),
            Frame::Command(frame) => self.on_command(frame),
            Frame::Malformed(e) => debug!("{e}: {:?} dropped", chunk.escape_ascii().to_string()),
        }
    }

    fn on_empty(&mut self) {
        if self.capture.is_some() {
            debug!("empty frame closes open capture");
            self.close_capture(false);
        }
    }

    fn on_streaming(&mut self, bytes: &[u8]) {
        let Some(capture) = self.capture.as_mut() else {
            debug!("{} streaming byte(s) with no capture open; ignored", bytes.len());
            return;
        };
        if capture.feed(bytes) {
            self.close_capture(true);
        }
    }

    fn on_report(&mut self, report: Report) {
        debug!("[{}:{}]", report.tag, report.payload);
        match report.tag.as_str() {
            TAG_ACK | TAG_NAK => match report.ack_parts() {
                Ok((command, value)) if report.tag == TAG_ACK => self.on_ack(command, value),
                Ok((command, value)) => self.emit(ClipEvent::DeviceAck(AckReport {
                    ack: false,
                    command,
                    value: ack_value(value),
                })),
                Err(e) => debug!("{e}"),
            },
            TAG_BUTTON => {
                if self.session.execution_state == ExecutionState::Sleeping {
                    info!("button pressed while asleep; waking device");
                    self.set_application_paused(false);
                }
                self.emit(ClipEvent::ButtonPressed(report.payload));
            }
            TAG_STREAMING_TICKS => match report.payload.parse::<u32>() {
                Ok(ticks) => {
                    self.session.sampling_ticks = ticks;
                    self.emit(ClipEvent::StreamingSpeed(ticks));
                }
                Err(_) => debug!(
                    "{}",
                    ProtocolError::MalformedReport {
                        tag: TAG_STREAMING_TICKS.to_owned(),
                        payload: report.payload,
                    }
                ),
            },
            TAG_FIRMWARE_REVISION => {
                info!("firmware revision {}", report.payload);
                self.session.firmware_revision.clone_from(&report.payload);
                self.emit(ClipEvent::FirmwareRevision(report.payload));
            }
            TAG_FIRMWARE_VERSION => {
                info!("firmware version {}", report.payload);
                self.session.firmware_version.clone_from(&report.payload);
                self.emit(ClipEvent::FirmwareVersion(report.payload));
            }
            TAG_STREAM_START => match report.numeric_payload() {
                Ok(samples) if self.capture_fits(samples) => self.open_capture(samples),
                Ok(_) => warn!(
                    "{}",
                    ProtocolError::MalformedReport {
                        tag: TAG_STREAM_START.to_owned(),
                        payload: report.payload,
                    }
                ),
                Err(e) => debug!("{e}"),
            },
            TAG_STREAM_END => {
                self.close_capture(false);
                match report.numeric_payload() {
                    Ok(reported) => self.check_capture_size(reported),
                    Err(e) => debug!("{e}"),
                }
            }
            other => debug!("unknown report tag {other:?}"),
        }
    }

    fn on_ack(&mut self, command: u8, value_byte: u8) {
        let value = ack_value(value_byte);
        match CommandCode::from_byte(command) {
            Some(CommandCode::IsCalibrated) => {
                if value == 0 {
                    info!("Clip is not calibrated");
                    self.session.calibrated = false;
                    self.emit(ClipEvent::NotCalibrated);
                } else {
                    self.session.calibrated = true;
                    self.write_status(ExecutionState::Executing);
                }
            }
            Some(CommandCode::WriteStatus) => {
                self.on_status_written(value);
                return;
            }
            Some(CommandCode::GestureStatus) => {
                self.on_gesture_status(value);
                return;
            }
            Some(CommandCode::Ok) => self.on_handshake(value_byte),
            _ => {}
        }
        self.emit(ClipEvent::DeviceAck(AckReport {
            ack: true,
            command,
            value,
        }));
    }

    fn on_status_written(&mut self, value: i16) {
        let Some(state) = ExecutionState::from_wire(value) else {
            warn!("device acknowledged unknown execution state {value}");
            return;
        };
        info!("execution state {} → {state}", self.session.execution_state);
        match state {
            ExecutionState::Sleeping if self.config.vibration_feedback => {
                self.vibrate(VibrationPattern::Sleep)
            }
            ExecutionState::Executing if self.config.vibration_feedback => {
                self.vibrate(VibrationPattern::Execution)
            }
            ExecutionState::Calibrating => {
                self.calibration.calibration_status = Some(state);
                self.emit(ClipEvent::CalibrationWritten(state));
            }
            _ => {}
        }
        self.session.execution_state = state;
    }

    fn on_gesture_status(&mut self, value: i16) {
        match GestureStatus::from_wire(value) {
            Some(GestureStatus::Started) => {
                debug!(
                    "gesture status STARTED, gesture {} iteration {}",
                    self.calibration.gesture_index, self.calibration.gesture_iteration
                );
                self.calibration.gesture_status = GestureStatus::Started;
                self.emit(ClipEvent::CalibrationStepStarted {
                    gesture_index: self.calibration.gesture_index,
                    iteration: self.calibration.gesture_iteration,
                });
            }
            Some(status) => debug!("gesture status {status}"),
            None => debug!("gesture status {value}"),
        }
    }

    fn on_handshake(&mut self, value: u8) {
        if !self.session.accept_handshake(value) {
            return;
        }
        info!("handshake complete");
        self.session.execution_state = ExecutionState::Idle;
        self.query_versions();
        self.set_capture_rate(self.config.default_sampling_rate);
        self.emit(ClipEvent::DeviceReady);
    }

    fn on_command(&mut self, frame: CommandFrame) {
        if self.capture.is_some() {
            debug!("command frame interrupts open capture");
            self.close_capture(false);
        }
        let value = frame.digit_value();
        match frame.command() {
            Some(CommandCode::ChargingState) => {
                let charging = value == 1;
                info!("{}", if charging { "charging" } else { "discharging" });
                self.session.charging = charging;
                self.emit(ClipEvent::ChargingState(charging));
            }
            Some(CommandCode::Gesture) => self.on_gesture(value),
            Some(CommandCode::GestureStatus | CommandCode::GestureFeedback) => {
                self.on_gesture_status(i16::from(value));
                self.emit(ClipEvent::GestureStatus(GestureStatusReport::new(value)));
            }
            Some(CommandCode::GestureQuality) => self.emit(ClipEvent::GestureQuality(value)),
            Some(CommandCode::Ok) => self.on_handshake(value),
            _ => debug!("unhandled command frame {:?}", frame.to_bytes().escape_ascii().to_string()),
        }
    }

    fn on_gesture(&mut self, code: u8) {
        self.session.last_gesture = code;
        if code == 0 {
            self.emit(ClipEvent::GestureUnclassified);
        } else {
            self.emit(ClipEvent::GestureClassified(code));
            self.vibrate(VibrationPattern::select(code));
        }
    }

    // ── Captures ─────────────────────────────────────────────────────────────

    /// Announced counts come from the device; bound them before allocating.
    fn capture_fits(&self, samples: usize) -> bool {
        samples <= self.config.max_capture_samples && samples.checked_mul(CHANNELS).is_some()
    }

    fn open_capture(&mut self, samples: usize) {
        if self.capture.is_some() {
            warn!("new capture announced while one is open; flushing the old one");
            self.close_capture(false);
        }
        info!("start of stream: {samples} samples");
        self.session.last_capture_expected = Some(samples);
        self.capture = Some(StreamingCapture::new(samples).with_trace(self.config.decode_trace));
    }

    fn close_capture(&mut self, complete: bool) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        if !complete {
            info!(
                "partial capture: {}/{} samples, {} bytes",
                capture.position(),
                capture.expected(),
                capture.total_bytes()
            );
        }
        let (samples, raw) = capture.into_parts();
        self.emit(ClipEvent::RawSamples(RawCapture {
            gesture: self.session.last_gesture,
            samples,
            raw,
            complete,
        }));
    }

    fn check_capture_size(&self, reported: usize) {
        match self.session.last_capture_expected {
            Some(expected) if expected != reported => {
                warn!("{}", ProtocolError::CaptureSizeMismatch { expected, reported })
            }
            Some(_) => debug!("end of stream: {reported} samples"),
            None => debug!("end of stream with no capture announced"),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    fn write_command(&mut self, code: CommandCode, value: u8) {
        let frame = encode_command(code, value);
        let Some(transport) = self.transport.as_mut() else {
            warn!("{}: {} not sent", ProtocolError::MissingTransport, frame.escape_ascii());
            return;
        };
        debug!("command {}", frame.escape_ascii());
        if let Err(e) = transport.send_bytes(&frame) {
            warn!("{}", ProtocolError::Transport(e.to_string()));
        }
    }

    /// Send arbitrary text to the device.
    pub fn send_raw_string(&mut self, text: &str) {
        let Some(transport) = self.transport.as_mut() else {
            warn!("{}: {text:?} not sent", ProtocolError::MissingTransport);
            return;
        };
        if let Err(e) = transport.send_string(text) {
            warn!("{}", ProtocolError::Transport(e.to_string()));
        }
    }

    /// Tell the device the host is listening (`{O1}`).
    pub fn notify_ready_to_send(&mut self) {
        self.write_command(CommandCode::Ok, 1);
    }

    pub fn query_calibration(&mut self) {
        self.write_command(CommandCode::IsCalibrated, 0);
    }

    pub fn query_charging_state(&mut self) {
        self.write_command(CommandCode::ChargingState, 0);
    }

    /// Ask for firmware revision, compilation version and sampling ratio.
    pub fn query_versions(&mut self) {
        self.write_command(CommandCode::Version, VERSION_REVISION);
        self.write_command(CommandCode::Version, VERSION_COMPILATION);
        self.write_command(CommandCode::RequestSampleRatio, 1);
    }

    pub fn set_capture_rate(&mut self, rate: u8) {
        self.write_command(CommandCode::SampleRatio, rate);
        self.session.sampling_rate = rate;
    }

    pub fn write_shutdown(&mut self) {
        self.write_command(CommandCode::Halt, 1);
    }

    pub fn write_ping(&mut self) {
        self.write_command(CommandCode::Ping, 1);
    }

    /// Request an execution state. The session only changes once the device
    /// acknowledges it.
    pub fn write_status(&mut self, state: ExecutionState) {
        debug!("write status {state}");
        self.write_command(CommandCode::WriteStatus, state.code());
    }

    pub fn write_gesture_status(&mut self, status: GestureStatus) {
        self.write_command(CommandCode::GestureStatus, status.code());
    }

    pub fn set_sensor_streaming(&mut self, enabled: bool) {
        self.write_command(CommandCode::SensorStreaming, u8::from(enabled));
    }

    // ── Calibration ──────────────────────────────────────────────────────────

    fn write_setting(&mut self, slot: u8, value: u8) {
        self.write_command(CommandCode::SettingData, value);
        self.write_command(CommandCode::Setting, slot);
    }

    pub fn set_gesture_count(&mut self, count: u8) {
        self.calibration.num_gestures = count;
        self.write_setting(SET_NUMBER_GESTURE, count);
    }

    pub fn set_repetition_count(&mut self, count: u8) {
        self.calibration.num_repetitions = count;
        self.write_setting(SET_NUMBER_REPETITION, count);
    }

    /// Reset calibration progress and put the device into `CALIB`.
    pub fn start_calibration(&mut self) {
        info!(
            "starting calibration: {} gestures × {} repetitions",
            self.calibration.num_gestures, self.calibration.num_repetitions
        );
        self.calibration.begin();
        self.write_status(ExecutionState::Calibrating);
        if self.config.fake_calibration {
            self.write_command(CommandCode::Debug, 1);
            self.write_command(CommandCode::Debug, 2);
        } else {
            self.write_command(CommandCode::Debug, 0);
        }
    }

    pub fn next_calibration_step(&mut self) {
        self.write_gesture_status(GestureStatus::Started);
    }

    pub fn stop_calibration(&mut self) {
        self.write_status(ExecutionState::Executing);
    }

    // ── Application lifecycle ────────────────────────────────────────────────

    pub fn set_application_focus(&mut self, visible: bool) {
        self.session.application_visible = visible;
    }

    /// Pausing asks the host to arm a sleep timer; resuming cancels it and
    /// requests `EXEC`.
    pub fn set_application_paused(&mut self, paused: bool) -> SleepSchedule {
        self.session.application_paused = paused;
        if !paused {
            self.session.sleep_pending = false;
            self.write_status(ExecutionState::Executing);
            return SleepSchedule::Cancelled;
        }
        if self.session.execution_state == ExecutionState::Sleeping || self.session.sleep_pending {
            return SleepSchedule::AlreadyScheduled;
        }
        self.session.sleep_pending = true;
        SleepSchedule::ArmTimer
    }

    /// The sleep timer armed after [`SleepSchedule::ArmTimer`] fired.
    ///
    /// A timer that was cancelled in the meantime (resume, or a button wake)
    /// is ignored.
    pub fn sleep_timer_elapsed(&mut self) {
        if !self.session.sleep_pending {
            debug!("sleep timer fired with no sleep pending; ignored");
            return;
        }
        if !self.session.application_visible {
            info!("application hidden; putting device to sleep");
            self.write_status(ExecutionState::Sleeping);
        }
        self.session.sleep_pending = false;
    }

    // ── Device info ──────────────────────────────────────────────────────────

    /// Battery level delivered by the transport's battery service.
    pub fn on_battery_level(&mut self, level: u8) {
        self.session.battery_level = Some(level);
        self.emit(ClipEvent::BatteryLevel(level));
    }

    /// Compare the reported firmware version with the one this engine
    /// targets. With no version known yet the device is asked for one and
    /// `false` is returned.
    pub fn is_same_firmware_version(&mut self) -> bool {
        if self.session.firmware_version.is_empty() {
            self.query_versions();
            return false;
        }
        self.session.firmware_version == FIRMWARE_APPLICATION_VERSION
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn emit(&self, event: ClipEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("event channel full; dropping {event:?}")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => debug!("event receiver dropped"),
        }
    }

    fn vibrate(&self, pattern: VibrationPattern) {
        match &self.vibration {
            Some(dispatcher) => dispatcher.request(pattern),
            None => debug!("no actuator; {pattern:?} skipped"),
        }
    }
}
