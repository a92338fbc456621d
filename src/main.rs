//! `clip-replay`: feed a recorded Clip byte log through the protocol engine.
//!
//! ```text
//! clip-replay [--config engine.json] [capture.log]
//! ```
//!
//! One chunk per line, read from the file or from stdin:
//!
//! | Line | Chunk |
//! |---|---|
//! | `hex:fd157c…` | binary bytes |
//! | *(blank)* | empty chunk |
//! | `# …` | comment, skipped |
//! | anything else | the line's bytes, e.g. `{OK}` or `[STS_DATA:120]` |

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;

use clip_rs::config::EngineConfig;
use clip_rs::engine::ClipEngine;
use clip_rs::transport::ChannelTransport;
use clip_rs::types::{gesture_name, ClipEvent};
use clip_rs::vibration::{VibrationDispatcher, VibrationPattern};

/// Replay a recorded Clip chunk log through the protocol engine.
#[derive(Parser, Debug)]
#[command(name = "clip-replay", long_about = None)]
struct Args {
    /// Engine configuration (JSON). Defaults apply to missing keys.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chunk log to replay. Reads stdin when omitted.
    input: Option<PathBuf>,
}

/// Turn one log line into the chunk it records.
fn line_to_chunk(line: &str) -> Result<Option<Vec<u8>>> {
    let line = line.trim_end_matches('\r');
    if line.starts_with('#') {
        return Ok(None);
    }
    if let Some(hex_bytes) = line.strip_prefix("hex:") {
        let bytes = hex::decode(hex_bytes.trim()).context("bad hex chunk")?;
        return Ok(Some(bytes));
    }
    Ok(Some(line.as_bytes().to_vec()))
}

fn print_event(event: ClipEvent) {
    match event {
        ClipEvent::DeviceReady => println!("[READY]"),
        ClipEvent::GestureClassified(g) => println!("[GESTURE] {g} ({})", gesture_name(g)),
        ClipEvent::GestureUnclassified => println!("[GESTURE] not classified"),
        ClipEvent::GestureQuality(q) => println!("[QUALITY] {q}"),
        ClipEvent::GestureStatus(s) => {
            println!("[STATUS] {} (unit={} decimal={})", s.value, s.unit, s.decimal)
        }
        ClipEvent::CalibrationStepStarted { gesture_index, iteration } => {
            println!("[CALIB] step gesture={gesture_index} iteration={iteration}")
        }
        ClipEvent::CalibrationWritten(state) => println!("[CALIB] state {state}"),
        ClipEvent::NotCalibrated => println!("[CALIB] device not calibrated"),
        ClipEvent::ChargingState(c) => println!("[CHARGING] {c}"),
        ClipEvent::BatteryLevel(b) => println!("[BATTERY] {b}%"),
        ClipEvent::FirmwareVersion(v) => println!("[VERSION] {v}"),
        ClipEvent::FirmwareRevision(r) => println!("[REVISION] {r}"),
        ClipEvent::StreamingSpeed(t) => println!("[TICKS] {t}"),
        ClipEvent::ButtonPressed(p) => println!("[BUTTON] {p}"),
        ClipEvent::DeviceAck(a) => println!(
            "[{}] {} {}",
            if a.ack { "ACK" } else { "NAK" },
            char::from(a.command),
            a.value
        ),
        ClipEvent::RawSamples(cap) => {
            println!(
                "[SAMPLES] gesture={} samples={} bytes={} complete={}",
                cap.gesture,
                cap.sample_count(),
                cap.raw.len(),
                cap.complete
            );
            for (i, s) in cap.iter_samples().enumerate() {
                println!("  {i:4}  {:5} {:5} {:5} {:5}", s[0], s[1], s[2], s[3]);
            }
        }
    }
}

fn drain(outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>, rx: &mut mpsc::Receiver<ClipEvent>) {
    while let Ok(frame) = outbound.try_recv() {
        println!("[TX] {}", frame.escape_ascii());
    }
    while let Ok(event) = rx.try_recv() {
        print_event(event);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    //   RUST_LOG=clip_rs=debug clip-replay capture.log
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let (mut engine, mut rx) = ClipEngine::new(config);
    let (transport, mut outbound) = ChannelTransport::new();
    engine.register_transport(transport);

    let (vibration, worker) = VibrationDispatcher::spawn(|pattern: VibrationPattern| {
        println!("[VIBRATE] {pattern:?} {:?}", pattern.timings());
        anyhow::Ok(())
    });
    engine.set_vibration_dispatcher(vibration);

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    // ── Replay ────────────────────────────────────────────────────────────────
    let mut chunks = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("reading capture log")?;
        match line_to_chunk(&line) {
            Ok(Some(chunk)) => {
                engine.handle_chunk(&chunk);
                chunks += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("line {}: {e:#}", n + 1),
        }
        drain(&mut outbound, &mut rx);
    }

    engine.release();
    drain(&mut outbound, &mut rx);
    drop(engine);
    worker.await.ok();

    info!("Replayed {chunks} chunk(s).");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line() {
        let args = Args::try_parse_from(["clip-replay", "-c", "engine.json", "run.log"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("engine.json")));
        assert_eq!(args.input, Some(PathBuf::from("run.log")));

        let args = Args::try_parse_from(["clip-replay"]).unwrap();
        assert!(args.config.is_none() && args.input.is_none());

        assert!(Args::try_parse_from(["clip-replay", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["clip-replay", "--config"]).is_err());
    }

    #[test]
    fn log_line_forms() {
        assert_eq!(line_to_chunk("{OK}").unwrap(), Some(b"{OK}".to_vec()));
        assert_eq!(line_to_chunk("").unwrap(), Some(Vec::new()));
        assert_eq!(line_to_chunk("[BT:1]\r").unwrap(), Some(b"[BT:1]".to_vec()));
        assert_eq!(line_to_chunk("hex:fd157c").unwrap(), Some(vec![0xFD, 0x15, 0x7C]));
        assert_eq!(line_to_chunk("# comment").unwrap(), None);
        assert!(line_to_chunk("hex:zz").is_err());
    }
}
