//! End-to-end engine behaviour: chunks in, frames and events out.

use clip_rs::prelude::*;
use clip_rs::protocol::{BUFFER_FILL, CENTRE_SIGNAL, MARKER_FULL_16BIT, MARKER_SIGNAL_COUNT};
use tokio::sync::mpsc;

struct Harness {
    engine: ClipEngine,
    events: mpsc::Receiver<ClipEvent>,
    wire: mpsc::UnboundedReceiver<Vec<u8>>,
    vibrations: mpsc::UnboundedReceiver<VibrationPattern>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        let (mut engine, events) = ClipEngine::new(config);
        let (transport, wire) = ChannelTransport::new();
        engine.register_transport(transport);
        let (vib_tx, vibrations) = mpsc::unbounded_channel();
        engine.set_vibration_dispatcher(VibrationDispatcher::from_sender(vib_tx));
        Self { engine, events, wire, vibrations }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.engine.handle_chunk(chunk);
    }

    fn events(&mut self) -> Vec<ClipEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }

    fn sent(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.wire.try_recv().ok()).collect()
    }

    fn vibrations(&mut self) -> Vec<VibrationPattern> {
        std::iter::from_fn(|| self.vibrations.try_recv().ok()).collect()
    }
}

fn be_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn only_capture(events: Vec<ClipEvent>) -> RawCapture {
    match events.as_slice() {
        [ClipEvent::RawSamples(cap)] => cap.clone(),
        other => panic!("expected a single capture event, got {other:?}"),
    }
}

// ── Execution state ──────────────────────────────────────────────────────────

#[test]
fn state_transitions_follow_acknowledgements() {
    let mut h = Harness::new(EngineConfig {
        vibration_feedback: true,
        ..EngineConfig::default()
    });
    assert_eq!(h.engine.session().execution_state, ExecutionState::Idle);

    h.engine.write_status(ExecutionState::Executing);
    assert_eq!(h.sent(), vec![b"{W2}".to_vec()]);
    assert_eq!(h.engine.session().execution_state, ExecutionState::Idle);

    h.feed(b"[ACK:W2]");
    assert_eq!(h.engine.session().execution_state, ExecutionState::Executing);
    h.feed(b"[ACK:W3]");
    assert_eq!(h.engine.session().execution_state, ExecutionState::Sleeping);
    h.feed(b"[ACK:W1]");
    assert_eq!(h.engine.session().execution_state, ExecutionState::Calibrating);

    assert_eq!(
        h.vibrations(),
        vec![VibrationPattern::Execution, VibrationPattern::Sleep]
    );
    assert_eq!(
        h.events(),
        vec![ClipEvent::CalibrationWritten(ExecutionState::Calibrating)]
    );
    assert_eq!(
        h.engine.calibration().calibration_status,
        Some(ExecutionState::Calibrating)
    );
}

#[test]
fn state_vibration_respects_config() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[ACK:W2]");
    h.feed(b"[ACK:W3]");
    assert!(h.vibrations().is_empty());
}

#[test]
fn gesture_vibration_is_always_requested() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"{G3}");
    h.feed(b"{G0}");
    h.feed(b"{G:}");
    assert_eq!(
        h.events(),
        vec![
            ClipEvent::GestureClassified(3),
            ClipEvent::GestureUnclassified,
            ClipEvent::GestureClassified(b':'),
        ]
    );
    assert_eq!(h.vibrations(), vec![VibrationPattern::Up, VibrationPattern::Default]);
    assert_eq!(h.engine.session().last_gesture, b':');
}

// ── Direct command frames ────────────────────────────────────────────────────

#[test]
fn direct_frames() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"{t1}");
    h.feed(b"{Q7}");
    h.feed(b"{F9}");
    h.feed(b"{t0}");
    assert_eq!(
        h.events(),
        vec![
            ClipEvent::ChargingState(true),
            ClipEvent::GestureQuality(7),
            ClipEvent::GestureStatus(GestureStatusReport { value: 9, unit: 9, decimal: 0 }),
            ClipEvent::ChargingState(false),
        ]
    );
    assert!(!h.engine.session().charging);
}

#[test]
fn malformed_chunks_are_dropped() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"garbage");
    h.feed(b"{G3");
    h.feed(b"[ACK:]");
    h.feed(b"[XYZ:1]");
    h.feed(&[0xFD, 0x00, 0x01]);
    assert!(h.events().is_empty());
    assert!(h.sent().is_empty());
}

// ── Captures ─────────────────────────────────────────────────────────────────

#[test]
fn full_capture_closes_itself() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"{G4}");
    h.events();

    let values: Vec<u16> = (0..8).map(|i| 5400 + i).collect();
    h.feed(b"[STS_DATA:2]");
    assert!(h.engine.is_capturing());
    let mut payload = vec![MARKER_FULL_16BIT];
    payload.extend(be_bytes(&values));
    h.feed(&payload[..7]);
    assert_eq!(h.engine.capture().map(|c| c.position()), Some(0));
    h.feed(&payload[7..]);
    assert!(!h.engine.is_capturing());

    let cap = only_capture(h.events());
    assert!(cap.complete);
    assert_eq!(cap.gesture, 4);
    assert_eq!(cap.samples, values);
    assert_eq!(cap.raw, payload);

    // Nothing is left open to swallow the next frame.
    h.feed(b"{G1}");
    assert_eq!(h.events(), vec![ClipEvent::GestureClassified(1)]);
}

#[test]
fn printable_bytes_inside_a_capture_are_samples() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:1]");
    h.feed(b"ABCDEFGH");
    let cap = only_capture(h.events());
    assert!(cap.complete);
    assert_eq!(cap.samples, vec![0x4142, 0x4344, 0x4546, 0x4748]);
}

#[test]
fn run_length_capture() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:5]");
    let mut payload = vec![MARKER_SIGNAL_COUNT, 3, MARKER_FULL_16BIT];
    payload.extend(be_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]));
    h.feed(&payload);
    let cap = only_capture(h.events());
    assert!(cap.complete);
    let samples: Vec<_> = cap.iter_samples().collect();
    assert_eq!(&samples[..3], &[CENTRE_SIGNAL; 3]);
    assert_eq!(samples[3], [1, 2, 3, 4]);
    assert_eq!(samples[4], [5, 6, 7, 8]);
}

#[test]
fn empty_frame_flushes_prefilled_capture() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:3]");
    h.feed(b"");
    assert!(!h.engine.is_capturing());

    let cap = only_capture(h.events());
    assert!(!cap.complete);
    assert_eq!(cap.samples, vec![BUFFER_FILL; 12]);
    assert!(cap.raw.is_empty());

    h.feed(b"{G2}");
    assert_eq!(h.events(), vec![ClipEvent::GestureClassified(2)]);
}

#[test]
fn empty_frame_without_capture_is_a_no_op() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"");
    assert!(h.events().is_empty());
}

#[test]
fn command_frame_interrupts_capture() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:3]");
    h.feed(&be_bytes(&[0x0101, 0x0202, 0x0303, 0x0404, 0x0505]));
    h.feed(b"{t1}");

    let events = h.events();
    assert_eq!(events.len(), 2);
    let ClipEvent::RawSamples(cap) = &events[0] else {
        panic!("capture must be flushed first, got {:?}", events[0]);
    };
    assert!(!cap.complete);
    assert_eq!(&cap.samples[..5], &[0x0101, 0x0202, 0x0303, 0x0404, 0x0505]);
    assert_eq!(&cap.samples[5..], &[BUFFER_FILL; 7]);
    assert_eq!(events[1], ClipEvent::ChargingState(true));
}

#[test]
fn stream_end_report_flushes_and_checks_size() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:4]");
    h.feed(&be_bytes(&[9, 9, 9, 9]));
    h.feed(b"[STE_DATA:3]");
    let cap = only_capture(h.events());
    assert!(!cap.complete);
    assert_eq!(cap.sample_count(), 4);
    assert_eq!(h.engine.session().last_capture_expected, Some(4));

    // After a self-closing capture the end report has nothing left to flush.
    h.feed(b"[STS_DATA:1]");
    h.feed(&be_bytes(&[1, 2, 3, 4]));
    h.feed(b"[STE_DATA:1]");
    assert_eq!(h.events().len(), 1);
}

#[test]
fn second_start_flushes_previous_capture() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"[STS_DATA:2]");
    h.feed(b"[STS_DATA:1]");
    let cap = only_capture(h.events());
    assert_eq!(cap.sample_count(), 2);
    assert_eq!(h.engine.capture().map(|c| c.expected()), Some(1));
}

#[test]
fn binary_without_capture_is_ignored() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(&[0xFD, 0x15, 0x7C, 0x15, 0x70]);
    assert!(h.events().is_empty());
    assert!(!h.engine.is_capturing());
}

// ── Calibration ──────────────────────────────────────────────────────────────

#[test]
fn calibration_round_trip() {
    let mut h = Harness::new(EngineConfig::default());
    h.feed(b"{OK}");
    h.feed(b"[ACK:C0]");
    assert_eq!(h.events(), vec![
        ClipEvent::DeviceReady,
        ClipEvent::NotCalibrated,
        ClipEvent::DeviceAck(AckReport { ack: true, command: b'C', value: 0 }),
    ]);
    h.sent();

    h.engine.start_calibration();
    assert_eq!(h.sent(), vec![b"{W1}".to_vec(), b"{z0}".to_vec()]);
    h.feed(b"[ACK:W1]");
    assert!(h.engine.is_calibrating());

    h.engine.next_calibration_step();
    assert_eq!(h.sent(), vec![b"{S1}".to_vec()]);
    h.feed(b"[ACK:S1]");
    // Progress counters are owned by the device and stay where they were set.
    h.feed(b"[ACK:S1]");
    assert_eq!(
        h.events(),
        vec![
            ClipEvent::CalibrationWritten(ExecutionState::Calibrating),
            ClipEvent::CalibrationStepStarted { gesture_index: 1, iteration: 1 },
            ClipEvent::CalibrationStepStarted { gesture_index: 1, iteration: 1 },
        ]
    );

    h.feed(b"[STS_DATA:1]");
    h.feed(&be_bytes(&[1, 2, 3, 4]));
    let cap = only_capture(h.events());
    let meta = h.engine.capture_metadata(&cap, "00:11:22:33:44:55", 1_500_000_000);
    assert_eq!(meta.name, "001122334455_c0_1500000000");
    assert_eq!(meta.kind, "calibration");
    assert_eq!(meta.sampling_rate, "1");

    h.engine.stop_calibration();
    h.feed(b"[ACK:W2]");
    assert!(!h.engine.is_calibrating());
}

#[test]
fn battery_level_is_stored_and_reported() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.on_battery_level(64);
    assert_eq!(h.engine.session().battery_level, Some(64));
    assert_eq!(h.events(), vec![ClipEvent::BatteryLevel(64)]);
}

#[tokio::test]
async fn spawned_dispatcher_receives_gesture_patterns() {
    use std::sync::{Arc, Mutex};

    let played = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&played);
    let (dispatcher, worker) = VibrationDispatcher::spawn(move |p: VibrationPattern| {
        sink.lock().unwrap().push(p);
        anyhow::Ok(())
    });

    let (mut engine, _events) = ClipEngine::new(EngineConfig::default());
    engine.set_vibration_dispatcher(dispatcher);
    engine.handle_chunk(b"{G1}");
    engine.handle_chunk(b"{G:}");
    drop(engine);
    worker.await.unwrap();

    assert_eq!(
        *played.lock().unwrap(),
        vec![VibrationPattern::Enter, VibrationPattern::Default]
    );
}
