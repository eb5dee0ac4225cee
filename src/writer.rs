//! Dedicated writer task for outbound frames.
//!
//! Every outbound frame goes through one bounded mpsc channel into a single
//! task that owns the transport sink, so frames reach the wire in the order
//! they were queued. The channel and a [`BackpressureController`] bound the
//! queue.
//!
//! # Architecture
//!
//! ```text
//! connect / send_audio ─┐
//! send_hello          ──┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► FrameSink
//! finish_session      ──┘
//! ```
//!
//! Ready frames are fed in batches of up to [`MAX_BATCH_SIZE`] and flushed
//! once per batch. Dropping every [`WriterHandle`] drains the queue, closes
//! the sink and ends the task.
//!
//! [`WriterHandle::shutdown`] is the other way out: frames still queued or
//! waiting on a slow sink are discarded, only the given goodbye frames are
//! written, and the sink is closed.

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::backpressure::BackpressureController;
use crate::error::{DialogError, Result};
use crate::protocol::Frame;
use crate::transport::FrameSink;

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames fed before a flush.
pub const MAX_BATCH_SIZE: usize = 64;

/// An encoded frame waiting for the writer.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Event id, for logging.
    pub event_id: Option<u32>,
    /// Encoded frame.
    pub bytes: Bytes,
}

impl OutboundFrame {
    /// Encode a frame for queueing.
    pub fn encode(frame: &Frame) -> Result<Self> {
        Ok(Self {
            event_id: frame.event_id,
            bytes: frame.encode()?,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queueing frames. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    control: mpsc::Sender<Vec<OutboundFrame>>,
    backpressure: BackpressureController,
}

impl WriterHandle {
    /// Queue a frame, waiting while the queue is full.
    ///
    /// Fails with `BackpressureTimeout` if no slot frees up in time and with
    /// `ConnectionClosed` once the writer task has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.backpressure.reserve().await?;
        self.tx.send(frame).await.map_err(|_| {
            self.backpressure.release();
            DialogError::ConnectionClosed
        })
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.backpressure.try_reserve()?;
        self.tx.try_send(frame).map_err(|e| {
            self.backpressure.release();
            match e {
                mpsc::error::TrySendError::Full(_) => DialogError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => DialogError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        !self.backpressure.can_accept()
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backpressure.pending_count()
    }

    /// Whether the writer task is gone.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop the writer: drop every frame not yet written, write `farewell`,
    /// then close the sink.
    ///
    /// Fails with `ConnectionClosed` if the writer already stopped or a
    /// shutdown is already under way.
    pub fn shutdown(&self, farewell: Vec<OutboundFrame>) -> Result<()> {
        self.control
            .try_send(farewell)
            .map_err(|_| DialogError::ConnectionClosed)
    }
}

/// Spawn the writer task over a transport sink.
///
/// The task ends with `Ok` after every handle is dropped and the queue is
/// drained, or after [`WriterHandle::shutdown`] wrote its frames. It ends
/// with the first sink error otherwise.
pub fn spawn_writer_task(
    sink: FrameSink,
    config: &WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let (control, control_rx) = mpsc::channel(1);
    let backpressure =
        BackpressureController::new(config.max_pending_frames.max(1), config.backpressure_timeout);

    let handle = WriterHandle {
        tx,
        control,
        backpressure: backpressure.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, control_rx, sink, backpressure));

    (handle, task)
}

enum Step {
    Written(Result<()>),
    Shutdown(Vec<OutboundFrame>),
}

async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut control: mpsc::Receiver<Vec<OutboundFrame>>,
    mut sink: FrameSink,
    backpressure: BackpressureController,
) -> Result<()> {
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let first = tokio::select! {
            biased;
            Some(farewell) = control.recv() => {
                return shutdown(rx, sink, &backpressure, farewell).await;
            }
            first = rx.recv() => first,
        };
        let Some(first) = first else { break };

        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let count = batch.len();
        // a shutdown abandons the batch; frames not yet fed are dropped
        let step = tokio::select! {
            biased;
            Some(farewell) = control.recv() => Step::Shutdown(farewell),
            result = write_batch(&mut sink, &mut batch) => Step::Written(result),
        };
        backpressure.release_many(count);

        match step {
            Step::Written(Ok(())) => {}
            Step::Written(Err(e)) => {
                error!(error = %e, "Writer failed");
                return Err(e);
            }
            Step::Shutdown(farewell) => {
                debug!(batch = count, "Abandoning batch in flight");
                batch.clear();
                return shutdown(rx, sink, &backpressure, farewell).await;
            }
        }
    }

    debug!("Writer queue closed, closing transport");
    sink.close().await
}

async fn shutdown(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut sink: FrameSink,
    backpressure: &BackpressureController,
    mut farewell: Vec<OutboundFrame>,
) -> Result<()> {
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    backpressure.release_many(discarded);
    if discarded > 0 {
        debug!(discarded, "Discarding queued frames");
    }

    if let Err(e) = write_batch(&mut sink, &mut farewell).await {
        error!(error = %e, "Failed to write goodbye frames");
        return Err(e);
    }
    debug!("Writer shut down, closing transport");
    sink.close().await
}

async fn write_batch(sink: &mut FrameSink, batch: &mut Vec<OutboundFrame>) -> Result<()> {
    for frame in batch.drain(..) {
        debug!(event_id = ?frame.event_id, len = frame.size(), "Writing frame");
        sink.feed(frame.bytes).await?;
    }
    sink.flush().await
}
