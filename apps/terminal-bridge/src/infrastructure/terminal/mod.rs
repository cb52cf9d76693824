//! Terminal Adapter
//!
//! WebSocket link to the trading terminal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  text frames  ┌────────────┐  mpsc  ┌──────────────┐
//! │   Terminal   │ ────────────► │   reader   │ ─────► │  dispatcher  │ ──► waiters
//! │  (WebSocket) │ ◄──────────── │   writer   │ ◄───── │  Correlator  │ ◄── requests
//! └──────────────┘               └────────────┘ queue  └──────────────┘
//! ```
//!
//! - `codec`: envelope encoding and inbound frame classification
//! - `transport`: socket ownership, reader and writer tasks, link status
//! - `correlator`: request/response demultiplexing, implements `TerminalPort`

pub mod codec;
pub mod correlator;
pub mod transport;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use codec::{CodecError, EnvelopeCodec, Frame};
pub use correlator::{Correlator, CorrelatorSettings};
pub use transport::{LinkState, LinkStatus, Transport};

use crate::application::ports::{FrameSink, TransportError};
use crate::infrastructure::config::TerminalSettings;

/// Open terminal link: socket plus correlator.
#[derive(Debug)]
pub struct TerminalConnection {
    transport: Arc<Transport>,
    correlator: Arc<Correlator>,
    dispatcher: JoinHandle<()>,
}

impl TerminalConnection {
    /// Connect to the terminal and start correlating.
    ///
    /// `shutdown` stops the reader and cancels in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] if the socket cannot be
    /// opened.
    pub async fn open(
        settings: &TerminalSettings,
        shutdown: CancellationToken,
    ) -> Result<Self, TransportError> {
        let (transport, inbound) = Transport::connect(settings, shutdown.clone()).await?;
        let transport = Arc::new(transport);
        let sink: Arc<dyn FrameSink> = Arc::clone(&transport) as Arc<dyn FrameSink>;
        let (correlator, dispatcher) = Correlator::spawn(
            sink,
            inbound,
            CorrelatorSettings::from(settings),
            shutdown,
        );
        Ok(Self {
            transport,
            correlator: Arc::new(correlator),
            dispatcher,
        })
    }

    /// Correlator for building a gateway.
    #[must_use]
    pub fn correlator(&self) -> Arc<Correlator> {
        Arc::clone(&self.correlator)
    }

    /// Socket status for health reporting.
    #[must_use]
    pub fn link(&self) -> Arc<LinkStatus> {
        self.transport.link()
    }

    /// Close the socket and wait for the dispatcher to fail any request
    /// still pending.
    pub async fn close(self) {
        self.transport.close().await;
        if let Err(e) = self.dispatcher.await {
            tracing::warn!(error = %e, "Correlator dispatcher did not stop cleanly");
        }
    }
}
