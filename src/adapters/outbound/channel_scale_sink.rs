//! Channel Scale Sink
//!
//! Implements ScaleSink by forwarding signals to a bounded tokio mpsc channel.
//! The provisioner owns the receiving end.

use crate::domain::entities::ScaleSignal;
use crate::domain::ports::ScaleSink;
use tokio::sync::mpsc;

/// mpsc-backed scale sink.
///
/// Never blocks: a full or closed channel drops the signal with a warning.
#[derive(Clone)]
pub struct ChannelScaleSink {
    tx: mpsc::Sender<ScaleSignal>,
}

impl ChannelScaleSink {
    pub fn new(tx: mpsc::Sender<ScaleSignal>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ScaleSignal>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ScaleSink for ChannelScaleSink {
    fn emit(&self, signal: ScaleSignal) {
        if let Err(e) = self.tx.try_send(signal) {
            match e {
                mpsc::error::TrySendError::Full(s) => {
                    tracing::warn!("scale signal dropped, provisioner lagging: {:?}", s.direction)
                }
                mpsc::error::TrySendError::Closed(s) => {
                    tracing::warn!("scale signal dropped, no provisioner: {:?}", s.direction)
                }
            }
        }
    }
}
