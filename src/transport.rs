//! Channel pair between the connection manager and whatever moves frames.
//!
//! The manager only ever sees a [`Transport`]: outbound JSON strings go in,
//! [`TransportEvent`]s come out. The WebSocket task holds the other end, and
//! tests hold it directly through [`Transport::pair`].

use bytes::Bytes;
use tokio::sync::mpsc;

/// Something that happened on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished.
    Opened,
    /// One inbound frame payload, undecoded.
    Frame(Bytes),
    /// The connection could not be established.
    Failed(String),
    /// The connection ended, with the close reason if one was given.
    Closed(Option<String>),
}

/// Manager-side half.
#[derive(Debug)]
pub struct Transport {
    pub(crate) outbound: mpsc::UnboundedSender<String>,
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Wire-side half.
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl Transport {
    pub fn pair() -> (Transport, TransportPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Transport {
                outbound: outbound_tx,
                events: events_rx,
            },
            TransportPeer {
                events: events_tx,
                outbound: outbound_rx,
            },
        )
    }
}

impl TransportPeer {
    /// Pushes an event towards the manager. Returns `false` once the manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Drains every frame the manager has queued so far.
    pub fn drain_outbound(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
