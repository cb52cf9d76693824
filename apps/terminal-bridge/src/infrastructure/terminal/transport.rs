//! Terminal WebSocket Transport
//!
//! Owns the single socket to the terminal. Outbound frames go through an
//! unbounded queue drained by a writer task; inbound text frames are pushed
//! by a reader task into a bounded queue consumed by the correlator.
//!
//! # Lifecycle
//!
//! `Connecting → Open → Closing → Closed`, or `Faulted` on a socket error.
//! A transport is connected exactly once: [`Transport::connect`] is the only
//! constructor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Bytes, Message};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DeliveryReceipt, FrameSink, TransportError};
use crate::infrastructure::config::TerminalSettings;

// =============================================================================
// Link State
// =============================================================================

/// Socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handshake in progress.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// Close requested, outbound queue draining.
    Closing,
    /// Socket closed normally.
    Closed,
    /// Socket failed.
    Faulted,
}

impl LinkState {
    /// Lowercase label for health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Faulted => "faulted",
        }
    }
}

/// Shared view of the socket for health reporting.
#[derive(Debug)]
pub struct LinkStatus {
    state: parking_lot::RwLock<LinkState>,
    opened_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    error_message: parking_lot::RwLock<Option<String>>,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStatus {
    /// Fresh status in the `Connecting` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: parking_lot::RwLock::new(LinkState::Connecting),
            opened_at: parking_lot::RwLock::new(None),
            error_message: parking_lot::RwLock::new(None),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Set the link state.
    pub fn set_state(&self, state: LinkState) {
        *self.state.write() = state;
        if state == LinkState::Open {
            *self.opened_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
        }
    }

    /// Mark the link faulted with a message.
    pub fn set_error(&self, message: String) {
        *self.state.write() = LinkState::Faulted;
        *self.error_message.write() = Some(message);
    }

    /// Mark the link closed unless it already faulted.
    fn settle_closed(&self) {
        let mut state = self.state.write();
        if *state != LinkState::Faulted {
            *state = LinkState::Closed;
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    /// When the socket last opened.
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        *self.opened_at.read()
    }

    /// Last socket error, if faulted.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    /// Inbound data frames seen so far.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Outbound data frames written so far.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Transport
// =============================================================================

enum Outbound {
    Text(String, oneshot::Sender<Result<(), TransportError>>),
    Pong(Bytes),
    Close,
}

/// Connected terminal socket.
pub struct Transport {
    outbound: parking_lot::Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    writer: parking_lot::Mutex<Option<JoinHandle<()>>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    link: Arc<LinkStatus>,
    close_timeout: Duration,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.link.state())
            .field("close_timeout", &self.close_timeout)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Open the socket and start the reader and writer tasks.
    ///
    /// Returns the transport together with the inbound queue of text frames.
    /// The queue ends when the socket closes, fails, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] if the handshake fails.
    pub async fn connect(
        settings: &TerminalSettings,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<String>), TransportError> {
        let link = Arc::new(LinkStatus::new());
        tracing::info!(endpoint = %settings.endpoint, "Connecting to terminal");

        let (socket, _response) = tokio_tungstenite::connect_async(settings.endpoint.as_str())
            .await
            .map_err(|e| {
                link.set_error(e.to_string());
                TransportError::ConnectFailed(e.to_string())
            })?;
        link.set_state(LinkState::Open);
        tracing::info!(endpoint = %settings.endpoint, "Terminal connection open");

        let (write, read) = socket.split();
        Ok(Self::start(
            write,
            read,
            link,
            settings.inbound_capacity,
            settings.close_timeout,
            cancel,
        ))
    }

    fn start<W, R>(
        write: W,
        read: R,
        link: Arc<LinkStatus>,
        inbound_capacity: usize,
        close_timeout: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<String>)
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));

        let writer = tokio::spawn(run_writer(write, outbound_rx, Arc::clone(&link)));
        let reader = tokio::spawn(run_reader(
            read,
            inbound_tx,
            outbound_tx.clone(),
            Arc::clone(&link),
            cancel,
        ));

        let transport = Self {
            outbound: parking_lot::Mutex::new(Some(outbound_tx)),
            writer: parking_lot::Mutex::new(Some(writer)),
            reader: parking_lot::Mutex::new(Some(reader)),
            link,
            close_timeout,
        };
        (transport, inbound_rx)
    }

    /// Shared link status.
    #[must_use]
    pub fn link(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.link)
    }

    /// Stop accepting frames, drain the outbound queue, send a normal close
    /// frame and wait for both tasks, each bounded by the close timeout.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let Some(sender) = self.outbound.lock().take() else {
            return;
        };
        if self.link.state() == LinkState::Open {
            self.link.set_state(LinkState::Closing);
        }
        let _ = sender.send(Outbound::Close);
        drop(sender);

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            let abort = writer.abort_handle();
            if tokio::time::timeout(self.close_timeout, writer).await.is_err() {
                tracing::warn!(
                    timeout_ms = self.close_timeout.as_millis(),
                    "Outbound queue did not drain in time"
                );
                abort.abort();
            }
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            let abort = reader.abort_handle();
            if tokio::time::timeout(self.close_timeout, reader).await.is_err() {
                tracing::debug!("Terminal did not acknowledge close");
                abort.abort();
            }
        }

        self.link.settle_closed();
        tracing::info!("Terminal connection closed");
    }
}

impl FrameSink for Transport {
    fn send(&self, text: String) -> Result<DeliveryReceipt, TransportError> {
        if text.is_empty() {
            return Err(TransportError::EmptyFrame);
        }
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        let (ack, receipt) = DeliveryReceipt::channel();
        sender
            .send(Outbound::Text(text, ack))
            .map_err(|_| TransportError::Closed)?;
        Ok(receipt)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

// =============================================================================
// Tasks
// =============================================================================

async fn run_writer<W>(
    mut sink: W,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    link: Arc<LinkStatus>,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Text(text, ack) => match sink.send(Message::Text(text.into())).await {
                Ok(()) => {
                    link.frames_sent.fetch_add(1, Ordering::Relaxed);
                    let _ = ack.send(Ok(()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to write frame");
                    link.set_error(e.to_string());
                    let _ = ack.send(Err(TransportError::Socket(e.to_string())));
                    break;
                }
            },
            Outbound::Pong(data) => {
                if let Err(e) = sink.send(Message::Pong(data)).await {
                    tracing::warn!(error = %e, "Failed to answer ping");
                    link.set_error(e.to_string());
                    break;
                }
            }
            Outbound::Close => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Close frame not sent");
                }
                break;
            }
        }
    }

    queue.close();
    while let Ok(item) = queue.try_recv() {
        if let Outbound::Text(_, ack) = item {
            let _ = ack.send(Err(TransportError::Closed));
        }
    }
}

async fn run_reader<R>(
    mut stream: R,
    inbound: mpsc::Sender<String>,
    outbound: mpsc::UnboundedSender<Outbound>,
    link: Arc<LinkStatus>,
    cancel: CancellationToken,
) where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Terminal reader cancelled");
                break;
            }
            message = stream.next() => message,
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(data))) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    text
                } else {
                    tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                    continue;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = outbound.send(Outbound::Pong(data));
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Terminal sent close frame");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Terminal socket error");
                link.set_error(e.to_string());
                break;
            }
            None => {
                tracing::info!("Terminal stream ended");
                break;
            }
        };

        link.frames_received.fetch_add(1, Ordering::Relaxed);
        if inbound.send(text).await.is_err() {
            tracing::debug!("Inbound consumer dropped");
            break;
        }
    }

    link.settle_closed();
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as futures_mpsc;

    use super::*;

    struct Harness {
        transport: Transport,
        inbound: mpsc::Receiver<String>,
        server_rx: futures_mpsc::UnboundedReceiver<Message>,
        server_tx: futures_mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    }

    fn harness() -> Harness {
        let (write, server_rx) = futures_mpsc::unbounded::<Message>();
        let (server_tx, read) = futures_mpsc::unbounded();
        let write = write.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
        let link = Arc::new(LinkStatus::new());
        link.set_state(LinkState::Open);
        let (transport, inbound) = Transport::start(
            write,
            read,
            link,
            8,
            Duration::from_millis(200),
            CancellationToken::new(),
        );
        Harness {
            transport,
            inbound,
            server_rx,
            server_tx,
        }
    }

    #[tokio::test]
    async fn send_writes_text_and_acks() {
        let mut h = harness();
        let receipt = h.transport.send("{\"a\":1}".to_string()).unwrap();
        receipt.delivered().await.unwrap();
        assert_eq!(
            h.server_rx.next().await,
            Some(Message::Text("{\"a\":1}".into()))
        );
        assert_eq!(h.transport.link().frames_sent(), 1);
    }

    #[tokio::test]
    async fn empty_frame_rejected() {
        let h = harness();
        assert_eq!(
            h.transport.send(String::new()).unwrap_err(),
            TransportError::EmptyFrame
        );
    }

    #[tokio::test]
    async fn inbound_text_and_binary_forwarded() {
        let mut h = harness();
        h.server_tx
            .unbounded_send(Ok(Message::Text("one".into())))
            .unwrap();
        h.server_tx
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(b"two"))))
            .unwrap();
        h.server_tx
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(&[0xff, 0xfe]))))
            .unwrap();
        h.server_tx
            .unbounded_send(Ok(Message::Text("three".into())))
            .unwrap();

        assert_eq!(h.inbound.recv().await.as_deref(), Some("one"));
        assert_eq!(h.inbound.recv().await.as_deref(), Some("two"));
        assert_eq!(h.inbound.recv().await.as_deref(), Some("three"));
        assert_eq!(h.transport.link().frames_received(), 3);
    }

    #[tokio::test]
    async fn ping_answered_with_pong() {
        let mut h = harness();
        h.server_tx
            .unbounded_send(Ok(Message::Ping(Bytes::from_static(b"p"))))
            .unwrap();
        assert_eq!(
            h.server_rx.next().await,
            Some(Message::Pong(Bytes::from_static(b"p")))
        );
    }

    #[tokio::test]
    async fn server_close_ends_inbound() {
        let mut h = harness();
        h.server_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(h.inbound.recv().await, None);
        assert_eq!(h.transport.link().state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn socket_error_faults_link() {
        let mut h = harness();
        h.server_tx
            .unbounded_send(Err(tungstenite::Error::ConnectionClosed))
            .unwrap();
        assert_eq!(h.inbound.recv().await, None);
        assert_eq!(h.transport.link().state(), LinkState::Faulted);
        assert!(h.transport.link().error_message().is_some());
    }

    #[tokio::test]
    async fn close_drains_then_sends_normal_close() {
        let mut h = harness();
        let first = h.transport.send("a".to_string()).unwrap();
        let second = h.transport.send("b".to_string()).unwrap();
        drop(h.server_tx);
        h.transport.close().await;

        assert!(first.delivered().await.is_ok());
        assert!(second.delivered().await.is_ok());
        assert_eq!(h.server_rx.next().await, Some(Message::Text("a".into())));
        assert_eq!(h.server_rx.next().await, Some(Message::Text("b".into())));
        match h.server_rx.next().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected close frame, got {other:?}"),
        }

        assert_eq!(
            h.transport.send("c".to_string()).unwrap_err(),
            TransportError::Closed
        );
        assert_eq!(h.transport.link().state(), LinkState::Closed);
        h.transport.close().await;
    }
}
