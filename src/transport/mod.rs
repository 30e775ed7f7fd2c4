//! In-process stand-in for the externally provided peer data channel.
//!
//! The real transport (WebRTC data channel, relay, whatever the host app
//! wires up) is an external collaborator that delivers ordered, reliable
//! frames once open. Tests and the demo binary run both protocol sides over
//! this mpsc-backed pair; the state machines only ever see frames.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::core::error::ProtocolError;
use crate::protocol::{self, ProtocolMessage};

/// Frames buffered per direction before senders back-pressure
const CHANNEL_CAPACITY: usize = 64;

/// Result of a non-blocking receive attempt
#[derive(Debug)]
pub enum Polled {
    Frame(Vec<u8>),
    Empty,
    Closed,
}

/// One endpoint of an ordered, reliable, in-process duplex channel.
///
/// Dropping an endpoint closes the transport: the peer's `recv` returns
/// `None` once buffered frames are drained.
pub struct PeerChannel {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

/// Open a connected pair of endpoints
pub fn open_pair() -> (PeerChannel, PeerChannel) {
    let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        PeerChannel { tx: a_tx, rx: b_rx },
        PeerChannel { tx: b_tx, rx: a_rx },
    )
}

impl PeerChannel {
    /// Send a raw frame to the peer
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), ProtocolError> {
        self.tx.send(frame).await.map_err(|_| ProtocolError::Closed)
    }

    /// Encode and send a protocol message
    pub async fn send_message(&self, message: &ProtocolMessage) -> Result<(), ProtocolError> {
        self.send(protocol::encode(message)?).await
    }

    /// Await the next frame; `None` means the peer closed
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Non-blocking receive, used to drain control frames between chunks
    pub fn poll_frame(&mut self) -> Polled {
        match self.rx.try_recv() {
            Ok(frame) => Polled::Frame(frame),
            Err(TryRecvError::Empty) => Polled::Empty,
            Err(TryRecvError::Disconnected) => Polled::Closed,
        }
    }

    /// Clonable handle for sending to the peer from outside the owning task
    pub fn sender(&self) -> ChannelSender {
        ChannelSender(self.tx.clone())
    }

    /// Close the transport
    pub fn close(self) {}
}

/// Send-only handle to a connection's outbound side.
///
/// The uploader session keeps one per connection so a report broadcast can
/// reach every sibling without touching the tasks that own the channels.
#[derive(Clone)]
pub struct ChannelSender(mpsc::Sender<Vec<u8>>);

impl ChannelSender {
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), ProtocolError> {
        self.0.send(frame).await.map_err(|_| ProtocolError::Closed)
    }

    pub async fn send_message(&self, message: &ProtocolMessage) -> Result<(), ProtocolError> {
        self.send(protocol::encode(message)?).await
    }
}
