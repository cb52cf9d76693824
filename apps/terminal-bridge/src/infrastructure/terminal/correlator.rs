//! Request/Response Correlator
//!
//! Pairs outbound routing requests with their inbound responses over one
//! shared socket. Each request registers a waiter keyed by its correlation
//! id; a single dispatcher task reads the inbound queue and hands every
//! matching response to its waiter. Any number of requests may be in
//! flight at once.
//!
//! # Inbound Frame Handling
//!
//! | Frame | Effect |
//! |-------|--------|
//! | heartbeat | dropped |
//! | id, command and channel match a waiter | waiter resolved |
//! | id pending, command or channel differ | ignored, waiter keeps waiting |
//! | id abandoned within the grace period | logged as late |
//! | any other id | logged as unknown |
//! | malformed, readable pending id | that waiter fails |
//! | malformed otherwise | every pending waiter fails |
//!
//! When the inbound queue ends, every pending waiter fails with
//! [`CorrelationError::NotReceived`] and later requests fail with
//! [`CorrelationError::Closed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, EnvelopeCodec, Frame};
use crate::application::ports::{CorrelationError, DeliveryReceipt, FrameSink, TerminalPort};
use crate::domain::envelope::{
    Channel, RESPONSE_COMMAND, RoutingRequest, RoutingResponse, unquote_payload,
};
use crate::infrastructure::config::TerminalSettings;
use crate::infrastructure::metrics::{self, Unmatched};

type Outcome = Result<String, CorrelationError>;

// =============================================================================
// Settings
// =============================================================================

/// Correlator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorSettings {
    /// Per-call timeout used by [`TerminalPort::request`].
    pub timeout: Duration,
    /// How long an abandoned id is remembered so a late answer is
    /// recognized as such.
    pub late_grace: Duration,
}

impl From<&TerminalSettings> for CorrelatorSettings {
    fn from(settings: &TerminalSettings) -> Self {
        Self {
            timeout: settings.timeout,
            late_grace: settings.late_grace,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

struct Waiter {
    channel: &'static str,
    tx: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Registry {
    waiters: HashMap<String, Waiter>,
    abandoned: HashMap<String, Instant>,
    closed: bool,
}

impl Registry {
    fn register(
        &mut self,
        id: &str,
        channel: Channel,
    ) -> Result<oneshot::Receiver<Outcome>, CorrelationError> {
        if self.closed {
            return Err(CorrelationError::Closed);
        }
        if self.waiters.contains_key(id) {
            return Err(CorrelationError::Protocol(format!(
                "correlation id {id} is already pending"
            )));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(
            id.to_string(),
            Waiter {
                channel: channel.as_str(),
                tx,
            },
        );
        metrics::set_pending_requests(self.waiters.len());
        Ok(rx)
    }

    fn abandon(&mut self, id: &str, grace: Duration) {
        if self.waiters.remove(id).is_some() {
            self.prune(grace);
            self.abandoned.insert(id.to_string(), Instant::now());
            metrics::set_pending_requests(self.waiters.len());
        }
    }

    fn prune(&mut self, grace: Duration) {
        self.abandoned.retain(|_, at| at.elapsed() < grace);
    }

    fn deliver(&mut self, response: RoutingResponse, grace: Duration) {
        let Some(waiter) = self.waiters.get(&response.id) else {
            self.discard_unmatched(&response.id, grace);
            return;
        };

        if response.command != RESPONSE_COMMAND
            || response.channel != waiter.channel
        {
            tracing::debug!(
                id = %response.id,
                command = %response.command,
                channel = %response.channel,
                expected_channel = waiter.channel,
                "Frame shares a pending id but does not answer it"
            );
            metrics::record_unmatched(Unmatched::Mismatch);
            return;
        }

        if let Some(waiter) = self.waiters.remove(&response.id) {
            let _ = waiter.tx.send(Ok(response.payload));
            metrics::set_pending_requests(self.waiters.len());
        }
    }

    /// Drop a frame naming an id nobody waits for.
    fn discard_unmatched(&mut self, id: &str, grace: Duration) {
        self.prune(grace);
        if self.abandoned.remove(id).is_some() {
            tracing::debug!(id = %id, "Late frame discarded");
            metrics::record_unmatched(Unmatched::Late);
        } else {
            tracing::debug!(id = %id, "Frame for unknown id discarded");
            metrics::record_unmatched(Unmatched::UnknownId);
        }
    }

    fn fail_malformed(&mut self, error: &CodecError, grace: Duration) {
        metrics::record_protocol_error();
        let reason = error.to_string();

        // A readable id confines the failure to that request, if any.
        if let Some(id) = error.correlation_id() {
            match self.waiters.remove(id) {
                Some(waiter) => {
                    tracing::warn!(id = %id, error = %reason, "Malformed response for pending request");
                    let _ = waiter.tx.send(Err(CorrelationError::Protocol(reason)));
                    metrics::set_pending_requests(self.waiters.len());
                }
                None => self.discard_unmatched(id, grace),
            }
            return;
        }

        tracing::error!(
            pending = self.waiters.len(),
            error = %reason,
            "Unreadable frame, failing pending requests"
        );
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter
                .tx
                .send(Err(CorrelationError::Protocol(reason.clone())));
        }
        metrics::set_pending_requests(0);
    }

    fn close(&mut self) {
        self.closed = true;
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.tx.send(Err(CorrelationError::NotReceived));
        }
        self.abandoned.clear();
        metrics::set_pending_requests(0);
    }
}

/// Moves a still-pending id to the abandoned set when the caller stops
/// waiting for any reason.
struct PendingGuard<'a> {
    registry: &'a parking_lot::Mutex<Registry>,
    id: &'a str,
    grace: Duration,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().abandon(self.id, self.grace);
    }
}

// =============================================================================
// Correlator
// =============================================================================

/// Demultiplexing request/response correlator.
pub struct Correlator {
    sink: Arc<dyn FrameSink>,
    registry: Arc<parking_lot::Mutex<Registry>>,
    settings: CorrelatorSettings,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("settings", &self.settings)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Correlator {
    /// Start the dispatcher over `inbound` and return the correlator with
    /// the dispatcher's handle.
    ///
    /// Requests made through [`TerminalPort::request`] are cancelled when
    /// `shutdown` fires.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn FrameSink>,
        inbound: mpsc::Receiver<String>,
        settings: CorrelatorSettings,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(parking_lot::Mutex::new(Registry::default()));
        let dispatcher = tokio::spawn(run_dispatcher(
            Arc::clone(&registry),
            inbound,
            settings.late_grace,
        ));
        let correlator = Self {
            sink,
            registry,
            settings,
            shutdown,
        };
        (correlator, dispatcher)
    }

    /// Requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.lock().waiters.len()
    }

    /// Whether the inbound stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Send `request` and wait for its response on `channel`, using the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// See [`Correlator::send_and_await_within`].
    pub async fn send_and_await(
        &self,
        request: &RoutingRequest,
        channel: Channel,
        cancel: &CancellationToken,
    ) -> Result<String, CorrelationError> {
        self.send_and_await_within(request, channel, self.settings.timeout, cancel)
            .await
    }

    /// Send `request` and wait up to `timeout` for the frame whose id,
    /// command and channel all match. Returns its payload with one layer of
    /// quoting removed.
    ///
    /// # Errors
    ///
    /// - [`CorrelationError::Closed`] if the inbound stream already ended
    /// - [`CorrelationError::Transport`] if the frame could not be sent
    /// - [`CorrelationError::NotReceived`] if the stream ends first
    /// - [`CorrelationError::TimedOut`] if `timeout` elapses first
    /// - [`CorrelationError::Cancelled`] if `cancel` fires first
    /// - [`CorrelationError::Protocol`] if a malformed frame arrives for it
    pub async fn send_and_await_within(
        &self,
        request: &RoutingRequest,
        channel: Channel,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, CorrelationError> {
        let started = Instant::now();
        let id = request.id().as_str();

        let outcome = self.exchange(request, channel, timeout, cancel).await;

        let label = metrics::outcome_label(outcome.as_ref().map(|_| ()));
        metrics::record_request(channel, label, started.elapsed());
        match &outcome {
            Ok(payload) => tracing::debug!(
                id,
                channel = channel.as_str(),
                bytes = payload.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Response received"
            ),
            Err(e) => tracing::warn!(
                id,
                channel = channel.as_str(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis(),
                "Request failed"
            ),
        }
        outcome
    }

    async fn exchange(
        &self,
        request: &RoutingRequest,
        channel: Channel,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, CorrelationError> {
        let id = request.id().as_str();
        let frame = EnvelopeCodec::new().encode(request)?;

        let response = self.registry.lock().register(id, channel)?;
        let _guard = PendingGuard {
            registry: &self.registry,
            id,
            grace: self.settings.late_grace,
        };

        let receipt = self.sink.send(frame)?;
        tracing::debug!(id, channel = channel.as_str(), "Request enqueued");

        tokio::select! {
            () = cancel.cancelled() => Err(CorrelationError::Cancelled),
            result = tokio::time::timeout(timeout, await_response(receipt, response)) => {
                result.unwrap_or(Err(CorrelationError::TimedOut(timeout)))
            }
        }
    }
}

async fn await_response(
    receipt: DeliveryReceipt,
    mut response: oneshot::Receiver<Outcome>,
) -> Result<String, CorrelationError> {
    tokio::select! {
        delivered = receipt.delivered() => delivered?,
        outcome = &mut response => return settle(outcome),
    }
    settle(response.await)
}

fn settle(outcome: Result<Outcome, oneshot::error::RecvError>) -> Result<String, CorrelationError> {
    let raw = outcome.map_err(|_| CorrelationError::NotReceived)??;
    Ok(unquote_payload(&raw)?)
}

#[async_trait]
impl TerminalPort for Correlator {
    async fn request(&self, channel: Channel, payload: Value) -> Result<String, CorrelationError> {
        let request = RoutingRequest::new(channel, &payload)?;
        self.send_and_await(&request, channel, &self.shutdown).await
    }
}

async fn run_dispatcher(
    registry: Arc<parking_lot::Mutex<Registry>>,
    mut inbound: mpsc::Receiver<String>,
    late_grace: Duration,
) {
    let codec = EnvelopeCodec::new();
    while let Some(text) = inbound.recv().await {
        metrics::record_frame_received();
        match codec.decode(&text) {
            Ok(Frame::Heartbeat) => {
                tracing::trace!("Heartbeat");
                metrics::record_heartbeat();
            }
            Ok(Frame::Response(response)) => registry.lock().deliver(response, late_grace),
            Err(e) => registry.lock().fail_malformed(&e, late_grace),
        }
    }

    let mut registry = registry.lock();
    if !registry.waiters.is_empty() {
        tracing::warn!(
            pending = registry.waiters.len(),
            "Inbound stream ended with requests pending"
        );
    }
    registry.close();
    drop(registry);
    tracing::info!("Correlator dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::ports::{MockFrameSink, TransportError};
    use crate::domain::envelope::CorrelationId;

    /// Sink that hands every frame to the test.
    struct Loopback {
        sent: mpsc::UnboundedSender<String>,
    }

    impl FrameSink for Loopback {
        fn send(&self, text: String) -> Result<DeliveryReceipt, TransportError> {
            self.sent.send(text).map_err(|_| TransportError::Closed)?;
            Ok(DeliveryReceipt::resolved(Ok(())))
        }
    }

    struct Harness {
        correlator: Arc<Correlator>,
        dispatcher: JoinHandle<()>,
        sent: mpsc::UnboundedReceiver<String>,
        inbound: mpsc::Sender<String>,
        shutdown: CancellationToken,
    }

    fn harness(timeout: Duration) -> Harness {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (inbound, inbound_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let (correlator, dispatcher) = Correlator::spawn(
            Arc::new(Loopback { sent: sent_tx }),
            inbound_rx,
            CorrelatorSettings {
                timeout,
                late_grace: Duration::from_secs(30),
            },
            shutdown.clone(),
        );
        Harness {
            correlator: Arc::new(correlator),
            dispatcher,
            sent,
            inbound,
            shutdown,
        }
    }

    fn response_frame(id: &str, channel: &str, inner: &str) -> String {
        json!({
            "Id": id,
            "Command": "response",
            "Channel": channel,
            "Payload": serde_json::to_string(inner).unwrap(),
        })
        .to_string()
    }

    async fn next_request_id(sent: &mut mpsc::UnboundedReceiver<String>) -> String {
        let frame: Value = serde_json::from_str(&sent.recv().await.unwrap()).unwrap();
        frame["Id"].as_str().unwrap().to_string()
    }

    fn spawn_request(
        correlator: &Arc<Correlator>,
        channel: Channel,
        payload: Value,
    ) -> JoinHandle<Result<String, CorrelationError>> {
        let correlator = Arc::clone(correlator);
        tokio::spawn(async move { correlator.request(channel, payload).await })
    }

    #[tokio::test]
    async fn heartbeat_then_response_resolves() {
        let mut h = harness(Duration::from_secs(5));
        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({"Type": "Accounts"}));

        let frame: Value = serde_json::from_str(&h.sent.recv().await.unwrap()).unwrap();
        assert_eq!(frame["Command"], "request");
        assert_eq!(frame["Channel"], "#Data.Query");
        assert_eq!(frame["Payload"], "{\"Type\":\"Accounts\"}");
        let id = frame["Id"].as_str().unwrap();

        h.inbound
            .send(json!({"heartbeat": true}).to_string())
            .await
            .unwrap();
        h.inbound
            .send(response_frame(id, "#Data.Query", r#"{"Data":[]}"#))
            .await
            .unwrap();

        assert_eq!(call.await.unwrap().unwrap(), r#"{"Data":[]}"#);
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_answered_out_of_order() {
        let mut h = harness(Duration::from_secs(5));
        let first = spawn_request(&h.correlator, Channel::DataQuery, json!({"n": 1}));
        let first_id = next_request_id(&mut h.sent).await;
        let second = spawn_request(&h.correlator, Channel::ArchiveQuery, json!({"n": 2}));
        let second_id = next_request_id(&mut h.sent).await;
        assert_eq!(h.correlator.pending_count(), 2);

        h.inbound
            .send(response_frame(&second_id, "#Archive.Query", "second"))
            .await
            .unwrap();
        h.inbound
            .send(response_frame(&first_id, "#Data.Query", "first"))
            .await
            .unwrap();

        assert_eq!(first.await.unwrap().unwrap(), "first");
        assert_eq!(second.await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn mismatched_channel_or_command_ignored() {
        let mut h = harness(Duration::from_secs(5));
        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let id = next_request_id(&mut h.sent).await;

        h.inbound
            .send(response_frame(&id, "#Archive.Query", "wrong channel"))
            .await
            .unwrap();
        h.inbound
            .send(
                json!({"Id": id, "Command": "request", "Channel": "#Data.Query", "Payload": "x"})
                    .to_string(),
            )
            .await
            .unwrap();
        h.inbound
            .send(response_frame("someone-else", "#Data.Query", "stray"))
            .await
            .unwrap();
        h.inbound
            .send(response_frame(&id, "#Data.Query", "right"))
            .await
            .unwrap();

        assert_eq!(call.await.unwrap().unwrap(), "right");
    }

    #[tokio::test]
    async fn unquoted_payload_passes_through() {
        let mut h = harness(Duration::from_secs(5));
        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let id = next_request_id(&mut h.sent).await;
        h.inbound
            .send(
                json!({"Id": id, "Command": "response", "Channel": "#Data.Query", "Payload": "{\"Data\":[]}"})
                    .to_string(),
            )
            .await
            .unwrap();
        assert_eq!(call.await.unwrap().unwrap(), r#"{"Data":[]}"#);
    }

    #[tokio::test]
    async fn malformed_frame_with_pending_id_fails_that_request() {
        let mut h = harness(Duration::from_secs(5));
        let failing = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let failing_id = next_request_id(&mut h.sent).await;
        let surviving = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let surviving_id = next_request_id(&mut h.sent).await;

        h.inbound
            .send(json!({"Id": failing_id, "Command": "response"}).to_string())
            .await
            .unwrap();
        assert!(matches!(
            failing.await.unwrap(),
            Err(CorrelationError::Protocol(_))
        ));

        h.inbound
            .send(response_frame(&surviving_id, "#Data.Query", "ok"))
            .await
            .unwrap();
        assert_eq!(surviving.await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn malformed_frame_for_other_id_spares_pending_requests() {
        let mut h = harness(Duration::from_secs(5));
        let live = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let live_id = next_request_id(&mut h.sent).await;

        h.inbound
            .send(json!({"Id": "long-gone", "Command": "response"}).to_string())
            .await
            .unwrap();
        h.inbound
            .send(response_frame(&live_id, "#Data.Query", "ok"))
            .await
            .unwrap();

        assert_eq!(live.await.unwrap().unwrap(), "ok");
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn malformed_late_frame_is_discarded() {
        let mut h = harness(Duration::from_millis(50));
        let expired = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let expired_id = next_request_id(&mut h.sent).await;
        assert!(matches!(
            expired.await.unwrap(),
            Err(CorrelationError::TimedOut(_))
        ));

        let live = tokio::spawn({
            let correlator = Arc::clone(&h.correlator);
            async move {
                let request = RoutingRequest::new(Channel::DataQuery, &json!({})).unwrap();
                correlator
                    .send_and_await_within(
                        &request,
                        Channel::DataQuery,
                        Duration::from_secs(5),
                        &CancellationToken::new(),
                    )
                    .await
            }
        });
        let live_id = next_request_id(&mut h.sent).await;
        h.inbound
            .send(json!({"Id": expired_id, "Channel": 5}).to_string())
            .await
            .unwrap();
        h.inbound
            .send(response_frame(&live_id, "#Data.Query", "still fine"))
            .await
            .unwrap();

        assert_eq!(live.await.unwrap().unwrap(), "still fine");
    }

    #[tokio::test]
    async fn unreadable_frame_fails_every_pending_request() {
        let mut h = harness(Duration::from_secs(5));
        let first = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        next_request_id(&mut h.sent).await;
        let second = spawn_request(&h.correlator, Channel::OrderEnter, json!({}));
        next_request_id(&mut h.sent).await;

        h.inbound.send("not json".to_string()).await.unwrap();

        assert!(matches!(first.await.unwrap(), Err(CorrelationError::Protocol(_))));
        assert!(matches!(second.await.unwrap(), Err(CorrelationError::Protocol(_))));

        // The dispatcher keeps serving later requests.
        let third = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let id = next_request_id(&mut h.sent).await;
        h.inbound
            .send(response_frame(&id, "#Data.Query", "fine"))
            .await
            .unwrap();
        assert_eq!(third.await.unwrap().unwrap(), "fine");
    }

    #[tokio::test]
    async fn stream_end_fails_pending_and_closes() {
        let mut h = harness(Duration::from_secs(5));
        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        next_request_id(&mut h.sent).await;

        drop(h.inbound);
        assert!(matches!(
            call.await.unwrap(),
            Err(CorrelationError::NotReceived)
        ));
        h.dispatcher.await.unwrap();
        assert!(h.correlator.is_closed());

        let err = h
            .correlator
            .request(Channel::DataQuery, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CorrelationError::Closed));
    }

    #[tokio::test]
    async fn timeout_abandons_and_late_answer_is_harmless() {
        let mut h = harness(Duration::from_millis(50));
        let err = {
            let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
            let id = next_request_id(&mut h.sent).await;
            let err = call.await.unwrap().unwrap_err();
            h.inbound
                .send(response_frame(&id, "#Data.Query", "late"))
                .await
                .unwrap();
            err
        };
        assert!(matches!(err, CorrelationError::TimedOut(d) if d == Duration::from_millis(50)));
        assert_eq!(h.correlator.pending_count(), 0);

        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        let id = next_request_id(&mut h.sent).await;
        h.inbound
            .send(response_frame(&id, "#Data.Query", "fresh"))
            .await
            .unwrap();
        assert_eq!(call.await.unwrap().unwrap(), "fresh");
    }

    #[tokio::test]
    async fn shutdown_cancels_waiters() {
        let mut h = harness(Duration::from_secs(5));
        let call = spawn_request(&h.correlator, Channel::DataQuery, json!({}));
        next_request_id(&mut h.sent).await;

        h.shutdown.cancel();
        assert!(matches!(call.await.unwrap(), Err(CorrelationError::Cancelled)));
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_pending_id_rejected() {
        let mut h = harness(Duration::from_secs(5));
        let id = CorrelationId::new("fixed").unwrap();
        let request = RoutingRequest::with_id(id, Channel::DataQuery, &json!({})).unwrap();

        let correlator = Arc::clone(&h.correlator);
        let first_request = request.clone();
        let first = tokio::spawn(async move {
            correlator
                .send_and_await(&first_request, Channel::DataQuery, &CancellationToken::new())
                .await
        });
        next_request_id(&mut h.sent).await;

        let err = h
            .correlator
            .send_and_await(&request, Channel::DataQuery, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CorrelationError::Protocol(_)));

        h.inbound
            .send(response_frame("fixed", "#Data.Query", "one"))
            .await
            .unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "one");
    }

    #[tokio::test]
    async fn delivery_failure_surfaces_as_transport_error() {
        let mut sink = MockFrameSink::new();
        sink.expect_send()
            .times(1)
            .returning(|_| Ok(DeliveryReceipt::resolved(Err(TransportError::Socket("broken pipe".into())))));
        let (_inbound, inbound_rx) = mpsc::channel(1);
        let (correlator, _dispatcher) = Correlator::spawn(
            Arc::new(sink),
            inbound_rx,
            CorrelatorSettings {
                timeout: Duration::from_secs(5),
                late_grace: Duration::from_secs(1),
            },
            CancellationToken::new(),
        );

        let err = correlator
            .request(Channel::OrderCancel, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CorrelationError::Transport(TransportError::Socket(_))
        ));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_sink_rejects_before_waiting() {
        let mut sink = MockFrameSink::new();
        sink.expect_send()
            .returning(|_| Err(TransportError::Closed));
        let (_inbound, inbound_rx) = mpsc::channel(1);
        let (correlator, _dispatcher) = Correlator::spawn(
            Arc::new(sink),
            inbound_rx,
            CorrelatorSettings {
                timeout: Duration::from_secs(5),
                late_grace: Duration::from_secs(1),
            },
            CancellationToken::new(),
        );

        let err = correlator
            .request(Channel::DataQuery, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CorrelationError::Transport(TransportError::Closed)));
    }
}
