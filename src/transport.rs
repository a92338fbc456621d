//! Outbound byte channel to the device.
//!
//! The radio link lives outside this crate. The engine writes through the
//! [`Transport`] trait; [`ChannelTransport`] forwards each write onto an
//! unbounded channel so the link can be serviced from its own task.

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

/// Sink for frames headed to the device.
pub trait Transport: Send {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    fn send_string(&mut self, text: &str) -> Result<()> {
        self.send_bytes(text.as_bytes())
    }
}

/// [`Transport`] that pushes every write onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the link task should drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| anyhow!("device link closed"))
    }
}
