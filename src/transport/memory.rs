//! In-process transport.
//!
//! Each `connect` hands a [`MemoryPeer`] to whoever holds the receiver
//! returned by [`MemoryConnector::new`]. The peer sees every encoded frame
//! the client writes and can push frames, raw bytes or transport errors
//! back. It carries bytes only; there is no server logic behind it.
//!
//! The client-to-peer direction is bounded: once the buffer is full of
//! unread messages, the client's sink waits for the peer to read.

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::{BoxFuture, Connector, Handshake, TransportPair};
use crate::error::{DialogError, Result};
use crate::protocol::Frame;

/// Default number of unread client messages before the sink waits.
pub const DEFAULT_PEER_BUFFER: usize = 1024;

/// Connector backed by in-process channels.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    buffer: usize,
    refuse: Option<String>,
}

impl MemoryConnector {
    /// Create a connector and the receiver that gets one peer per connect.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        Self::bounded(DEFAULT_PEER_BUFFER)
    }

    /// Like [`new`](Self::new), but the client's sink holds at most
    /// `buffer + 1` unread messages before it waits for the peer.
    pub fn bounded(buffer: usize) -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded();
        (
            Self {
                peers,
                buffer,
                refuse: None,
            },
            rx,
        )
    }

    /// A connector whose every connect fails with a transport error.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (peers, _rx) = mpsc::unbounded();
        Self {
            peers,
            buffer: DEFAULT_PEER_BUFFER,
            refuse: Some(reason.into()),
        }
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, handshake: &'a Handshake) -> BoxFuture<'a, Result<TransportPair>> {
        Box::pin(async move {
            if let Some(reason) = &self.refuse {
                return Err(DialogError::Transport(reason.clone()));
            }

            let (client_tx, peer_rx) = mpsc::channel::<Bytes>(self.buffer);
            let (peer_tx, client_rx) = mpsc::unbounded::<Result<Bytes>>();

            let peer = MemoryPeer {
                handshake: handshake.clone(),
                inbound: peer_rx,
                outbound: peer_tx,
            };
            self.peers
                .unbounded_send(peer)
                .map_err(|_| DialogError::Transport("no peer listening".to_string()))?;
            debug!(connect_id = %handshake.connect_id, "Memory transport opened");

            Ok(TransportPair {
                sink: Box::pin(client_tx.sink_map_err(|_| DialogError::ConnectionClosed)),
                stream: Box::pin(client_rx),
            })
        })
    }
}

/// Remote end of an in-process transport.
pub struct MemoryPeer {
    /// Handshake the client connected with.
    pub handshake: Handshake,
    inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::UnboundedSender<Result<Bytes>>,
}

impl MemoryPeer {
    /// Next message the client wrote. `None` once the client closed its side.
    pub async fn recv_raw(&mut self) -> Option<Bytes> {
        self.inbound.next().await
    }

    /// Next frame the client wrote.
    pub async fn next_frame(&mut self) -> Result<Frame> {
        let bytes = self.recv_raw().await.ok_or(DialogError::ConnectionClosed)?;
        Ok(Frame::decode(&bytes)?)
    }

    /// Every remaining frame until the client closes its side.
    pub async fn drain(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(bytes) = self.recv_raw().await {
            frames.push(Frame::decode(&bytes)?);
        }
        Ok(frames)
    }

    /// Stop accepting client writes while keeping the client's stream
    /// open. Later writes fail with `ConnectionClosed`.
    pub fn stop_reading(&mut self) {
        self.inbound.close();
    }

    /// Deliver a frame to the client.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        self.send_raw(frame.encode()?)
    }

    /// Deliver raw bytes to the client.
    pub fn send_raw(&self, bytes: impl Into<Bytes>) -> Result<()> {
        self.outbound
            .unbounded_send(Ok(bytes.into()))
            .map_err(|_| DialogError::ConnectionClosed)
    }

    /// Make the client's stream yield a transport error.
    pub fn fail(&self, error: DialogError) -> Result<()> {
        self.outbound
            .unbounded_send(Err(error))
            .map_err(|_| DialogError::ConnectionClosed)
    }

    /// Close the peer side; the client's stream ends.
    pub fn close(self) {
        self.outbound.close_channel();
    }
}
