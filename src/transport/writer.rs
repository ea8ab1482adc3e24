//! Outbound side: one task owns the write half of the connection.
//!
//! Callers marshal on their own task and hand finished frames over an mpsc
//! channel; the writer task is the only thing touching the `AsyncWrite`, so
//! frames reach the peer whole and in queue order.
//!
//! ```text
//! caller ──marshal──► EncodedFrame ──┐
//! caller ──marshal──► EncodedFrame ──┼──► channel ──► run_writer ──► AsyncWrite
//! caller ──marshal──► EncodedFrame ──┘
//! ```
//!
//! Whatever is queued when the task wakes goes out in one vectored write.
//! Senders park once `max_queued_frames` frames are in flight and give up
//! after `send_timeout`.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::commands::{Command, MessageCommand};
use crate::error::{OpenWireError, Result};
use crate::protocol::WireFormat;

pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 1024;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How long `send` waits for room before failing with `BackpressureTimeout`.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on frames drained from the channel per write.
const MAX_BATCH_FRAMES: usize = 64;

/// A frame already marshalled by a [`WireFormat`], prefix included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Bytes);

impl EncodedFrame {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Encode `command`, or the null frame for `None`.
    pub fn encode(wf: &WireFormat, command: Option<&dyn Command>) -> Result<Self> {
        Ok(Self(wf.marshal_to_bytes(command)?))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub max_queued_frames: usize,
    pub channel_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl WriterOptions {
    pub fn with_max_queued_frames(mut self, limit: usize) -> Self {
        self.max_queued_frames = limit;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Frames handed to the writer but not yet written.
struct Inflight {
    queued: AtomicUsize,
    limit: usize,
    freed: Notify,
}

impl Inflight {
    fn new(limit: usize) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            limit,
            freed: Notify::new(),
        }
    }

    fn count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        self.count() >= self.limit
    }

    fn acquire(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self, frames: usize) {
        self.queued.fetch_sub(frames, Ordering::AcqRel);
        self.freed.notify_waiters();
    }
}

/// Cloneable sender side of the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    inflight: Arc<Inflight>,
    send_timeout: Duration,
}

impl WriterHandle {
    /// Queue `frame`, parking while the writer is saturated.
    pub async fn send(&self, frame: EncodedFrame) -> Result<()> {
        if self.inflight.is_full() {
            self.wait_for_room().await?;
        }
        self.inflight.acquire();
        if self.tx.send(frame.into_bytes()).await.is_err() {
            self.inflight.release(1);
            return Err(OpenWireError::ConnectionClosed);
        }
        Ok(())
    }

    /// Encode `command` here, then queue it.
    pub async fn send_command(&self, wf: &WireFormat, command: &dyn Command) -> Result<()> {
        let frame = EncodedFrame::encode(wf, Some(command))?;
        trace!(
            data_type = command.data_structure_type(),
            len = frame.len(),
            "Queueing command"
        );
        self.send(frame).await
    }

    /// Freeze the message body, encode and queue it, then lock the message.
    ///
    /// After a successful send, body and property writes fail with
    /// `WriteToReadOnly`. A message whose frame never reached the queue stays
    /// frozen and can be sent again unchanged.
    pub async fn send_message(
        &self,
        wf: &WireFormat,
        message: &mut dyn MessageCommand,
    ) -> Result<()> {
        message.message_mut().freeze_for_send();
        self.send_command(wf, message.to_command()).await?;
        message.message_mut().on_send();
        Ok(())
    }

    /// Queue `frame` only if that is possible right now.
    pub fn try_send(&self, frame: EncodedFrame) -> Result<()> {
        if self.inflight.is_full() {
            return Err(OpenWireError::BackpressureTimeout);
        }
        self.inflight.acquire();
        self.tx.try_send(frame.into_bytes()).map_err(|err| {
            self.inflight.release(1);
            match err {
                mpsc::error::TrySendError::Full(_) => OpenWireError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => OpenWireError::ConnectionClosed,
            }
        })
    }

    pub fn is_saturated(&self) -> bool {
        self.inflight.is_full()
    }

    pub fn queued_frames(&self) -> usize {
        self.inflight.count()
    }

    async fn wait_for_room(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.send_timeout;
        loop {
            let freed = self.inflight.freed.notified();
            tokio::pin!(freed);
            // Register before checking so a release in between is not lost.
            freed.as_mut().enable();
            if !self.inflight.is_full() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, freed).await.is_err() {
                debug!(queued = self.inflight.count(), "Writer saturated past send timeout");
                return Err(OpenWireError::BackpressureTimeout);
            }
        }
    }
}

/// Start the writer task on `sink`.
///
/// The task returns `Ok(())` after the last handle is dropped and every
/// queued frame was written, or the first I/O error.
pub fn spawn_writer<W>(
    sink: W,
    options: WriterOptions,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.channel_capacity);
    let inflight = Arc::new(Inflight::new(options.max_queued_frames));
    let task = tokio::spawn(run_writer(rx, sink, Arc::clone(&inflight)));
    let handle = WriterHandle {
        tx,
        inflight,
        send_timeout: options.send_timeout,
    };
    (handle, task)
}

pub fn spawn_default_writer<W>(sink: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer(sink, WriterOptions::default())
}

async fn run_writer<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut sink: W,
    inflight: Arc<Inflight>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = Vec::with_capacity(MAX_BATCH_FRAMES);
    while rx.recv_many(&mut frames, MAX_BATCH_FRAMES).await > 0 {
        let drained = frames.len();
        let outcome = flush_frames(&mut sink, &mut frames).await;
        frames.clear();
        inflight.release(drained);
        outcome?;
    }
    debug!("Every writer handle dropped, writer task exiting");
    Ok(())
}

/// Write `frames` completely and flush. Frames are consumed as they go out.
async fn flush_frames<W>(sink: &mut W, frames: &mut [Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = 0;
    loop {
        while frames.get(head).is_some_and(Bytes::is_empty) {
            head += 1;
        }
        if head == frames.len() {
            break;
        }

        let slices: Vec<IoSlice<'_>> = frames[head..].iter().map(|f| IoSlice::new(f)).collect();
        let mut accepted = sink.write_vectored(&slices).await?;
        if accepted == 0 {
            return Err(OpenWireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "sink accepted no bytes",
            )));
        }

        while accepted > 0 {
            let current = &mut frames[head];
            if accepted >= current.len() {
                accepted -= current.len();
                head += 1;
            } else {
                current.advance(accepted);
                accepted = 0;
            }
        }
    }
    sink.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::KeepAliveInfo;
    use crate::message::{BodyState, StreamMessage};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    /// Accepts at most two bytes per write call.
    #[derive(Default)]
    struct Trickle(Vec<u8>);

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(2);
            self.0.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn detached(limit: usize, timeout: Duration) -> (WriterHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = WriterHandle {
            tx,
            inflight: Arc::new(Inflight::new(limit)),
            send_timeout: timeout,
        };
        (handle, rx)
    }

    fn raw(bytes: &'static [u8]) -> EncodedFrame {
        EncodedFrame::from_bytes(Bytes::from_static(bytes))
    }

    #[test]
    fn test_options_builder() {
        let options = WriterOptions::default()
            .with_max_queued_frames(4)
            .with_send_timeout(Duration::from_millis(50));
        assert_eq!(options.max_queued_frames, 4);
        assert_eq!(options.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(options.send_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_flush_survives_short_writes() {
        let mut sink = Trickle::default();
        let mut frames = vec![
            Bytes::from_static(b"abc"),
            Bytes::new(),
            Bytes::from_static(b"defg"),
            Bytes::from_static(b"h"),
        ];
        flush_frames(&mut sink, &mut frames).await.unwrap();
        assert_eq!(sink.0, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_command_reaches_peer_intact() {
        let (local, mut peer) = duplex(4096);
        let (handle, _task) = spawn_default_writer(local);
        let wf = WireFormat::default();

        handle
            .send_command(&wf, &KeepAliveInfo::default())
            .await
            .unwrap();

        let expected = wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap();
        let mut received = vec![0u8; expected.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected.to_vec());
    }

    #[tokio::test]
    async fn test_sent_message_is_locked() {
        let (local, mut peer) = duplex(4096);
        let (handle, _task) = spawn_default_writer(local);
        let wf = WireFormat::default();

        let mut message = StreamMessage::new();
        message.write_int(1).unwrap();
        message.message().set_property("attempt", 1).unwrap();
        assert_eq!(message.message().envelope().state(), BodyState::Building);

        handle.send_message(&wf, &mut message).await.unwrap();
        assert_eq!(message.message().envelope().state(), BodyState::ReadOnly);
        assert!(message.message().is_read_only());
        assert!(matches!(message.write_int(2), Err(OpenWireError::WriteToReadOnly)));
        assert!(message.message().set_property("attempt", 2).is_err());

        let expected = wf.marshal_to_bytes(Some(&message)).unwrap();
        let mut received = vec![0u8; expected.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected.to_vec());
    }

    #[tokio::test]
    async fn test_unsent_message_stays_frozen() {
        let (handle, rx) = detached(4, Duration::from_secs(1));
        drop(rx);
        let wf = WireFormat::default();

        let mut message = StreamMessage::new();
        message.write_int(7).unwrap();
        assert!(matches!(
            handle.send_message(&wf, &mut message).await,
            Err(OpenWireError::ConnectionClosed)
        ));
        assert_eq!(message.message().envelope().state(), BodyState::Frozen);
        assert!(!message.message().is_read_only());
        assert_eq!(message.read_int().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_queue_order_preserved() {
        let (local, mut peer) = duplex(4096);
        let (handle, _task) = spawn_default_writer(local);

        for tag in 0..10u8 {
            handle
                .send(EncodedFrame::from_bytes(Bytes::from(vec![tag; 3])))
                .await
                .unwrap();
        }

        let mut received = [0u8; 30];
        peer.read_exact(&mut received).await.unwrap();
        for (tag, chunk) in received.chunks(3).enumerate() {
            assert_eq!(chunk, [tag as u8; 3]);
        }
    }

    #[tokio::test]
    async fn test_try_send_rejects_when_saturated() {
        let (handle, _rx) = detached(1, Duration::from_secs(1));
        handle.try_send(raw(b"a")).unwrap();

        assert!(handle.is_saturated());
        assert!(matches!(
            handle.try_send(raw(b"b")),
            Err(OpenWireError::BackpressureTimeout)
        ));
        assert_eq!(handle.queued_frames(), 1);
    }

    #[tokio::test]
    async fn test_send_gives_up_after_timeout() {
        let (handle, _rx) = detached(1, Duration::from_millis(10));
        handle.send(raw(b"a")).await.unwrap();

        assert!(matches!(
            handle.send(raw(b"b")).await,
            Err(OpenWireError::BackpressureTimeout)
        ));
        assert_eq!(handle.queued_frames(), 1);
    }

    #[tokio::test]
    async fn test_send_resumes_once_released() {
        let (handle, _rx) = detached(1, Duration::from_secs(5));
        handle.send(raw(b"a")).await.unwrap();

        let inflight = Arc::clone(&handle.inflight);
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            inflight.release(1);
        });

        handle.send(raw(b"b")).await.unwrap();
        releaser.await.unwrap();
        assert_eq!(handle.queued_frames(), 1);
    }

    #[tokio::test]
    async fn test_send_without_writer_task() {
        let (handle, rx) = detached(4, Duration::from_secs(1));
        drop(rx);
        assert!(matches!(
            handle.send(raw(b"a")).await,
            Err(OpenWireError::ConnectionClosed)
        ));
        assert_eq!(handle.queued_frames(), 0);
    }

    #[tokio::test]
    async fn test_task_ends_when_handles_dropped() {
        let (local, _peer) = duplex(4096);
        let (handle, task) = spawn_default_writer(local);
        let second = handle.clone();
        drop(handle);
        drop(second);
        assert!(task.await.unwrap().is_ok());
    }
}
