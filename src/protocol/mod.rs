//! HTTP protocol handler for one zone.
//!
//! # Send
//!
//! [`HttpProtocolHandler::send`] POSTs a composed message and returns the
//! response body. A first attempt that fails because the peer closed a
//! kept-alive connection is retried exactly once on a fresh connection;
//! every other failure is returned wrapped with the zone id and URL.
//!
//! # Pull mode
//!
//! ```text
//!            start()                 shutdown() / zone shut down /
//!   [Idle] ───────────> [Polling] ──  push expected ──────────> [Stopped]
//! ```
//!
//! The worker polls the zone's [`Dispatcher`](crate::zone::Dispatcher):
//!
//! | Outcome                     | Next delay        |
//! |-----------------------------|-------------------|
//! | not connected               | error delay       |
//! | `pull()` < 0 (sleeping)     | error delay       |
//! | `pull()` >= 0               | poll frequency    |
//! | ordinary failure (logged)   | poll frequency    |
//! | push expected               | worker stops      |

mod exchange;
mod poller;

pub use exchange::{user_agent, HttpExchange, ReqwestExchange, SIF_CONTENT_TYPE};
pub use poller::PollStats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::{MessagingMode, PollingConfig};
use crate::envelope::OutgoingMessage;
use crate::error::{Result, SifError};
use crate::transport::Transport;
use crate::zone::Zone;

struct Poller {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Zone-bound HTTP(S) protocol handler, in push or pull mode.
pub struct HttpProtocolHandler {
    zone: Arc<Zone>,
    url: Url,
    exchange: Arc<dyn HttpExchange>,
    polling: PollingConfig,
    poller: Mutex<Option<Poller>>,
    stats: Arc<PollStats>,
    transport: Option<Arc<dyn Transport>>,
    closed: AtomicBool,
}

impl HttpProtocolHandler {
    /// Bind a handler to `zone`.
    ///
    /// Fails with a configuration error unless the zone URL is http or https,
    /// and with a lifecycle error if the zone already has a handler.
    pub fn open(
        zone: Arc<Zone>,
        exchange: Arc<dyn HttpExchange>,
        polling: PollingConfig,
    ) -> Result<Self> {
        let url = Url::parse(zone.url())
            .map_err(|e| SifError::Config(format!("Invalid zone URL {}: {e}", zone.url())))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SifError::Config(format!(
                "Zone URL {} must use http or https",
                zone.url()
            )));
        }
        zone.bind_handler()?;

        tracing::debug!(zone_id = %zone.id(), url = %url, mode = %zone.mode(), "Protocol handler opened");

        Ok(Self {
            zone,
            url,
            exchange,
            polling,
            poller: Mutex::new(None),
            stats: Arc::new(PollStats::default()),
            transport: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Deregister the zone from `transport` when the handler closes.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The bound zone.
    pub fn zone(&self) -> &Arc<Zone> {
        &self.zone
    }

    /// Delivery mode of the bound zone.
    pub fn mode(&self) -> MessagingMode {
        self.zone.mode()
    }

    /// Zone URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Pull worker counters.
    pub fn stats(&self) -> &Arc<PollStats> {
        &self.stats
    }

    /// Send `message` to the zone and return the response body.
    pub async fn send(&self, message: &OutgoingMessage) -> Result<Bytes> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SifError::Lifecycle(format!(
                "Protocol handler for zone {} is closed",
                self.zone.id()
            )));
        }

        tracing::debug!(zone_id = %self.zone.id(), message_id = %message.message_id(), "Sending message");

        match self.exchange.post(&self.url, message, false).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_retryable() => {
                tracing::warn!(zone_id = %self.zone.id(), "Connection closed by zone, retrying once: {}", e);
                self.exchange
                    .post(&self.url, message, true)
                    .await
                    .map_err(|e| e.in_zone(self.zone.id(), self.url.as_str()))
            },
            Err(e) => Err(e.in_zone(self.zone.id(), self.url.as_str())),
        }
    }

    /// Start the pull worker. No-op if it is already running.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SifError::Lifecycle(format!(
                "Protocol handler for zone {} is closed",
                self.zone.id()
            )));
        }
        if self.zone.mode() == MessagingMode::Push {
            return Err(SifError::Config(format!(
                "Zone {} is configured for push delivery; polling cannot start",
                self.zone.id()
            )));
        }

        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|p| !p.task.is_finished()) {
            return Ok(());
        }

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(poller::run(
            Arc::clone(&self.zone),
            self.polling,
            Arc::clone(&self.stats),
            stopped,
        ));
        *slot = Some(Poller { stop, task });
        Ok(())
    }

    /// Whether the pull worker is running.
    pub fn is_active(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.task.is_finished())
    }

    /// Stop the pull worker. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            let _ = poller.stop.send(true);
            tracing::debug!(zone_id = %self.zone.id(), "Pull worker signalled to stop");
        }
    }

    /// Stop the worker, deregister the zone from its transport and release
    /// the zone. Safe to call repeatedly.
    pub fn close(&self) {
        self.shutdown();
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Some(transport) = &self.transport {
                transport.deactivate(self.zone.id());
            }
            self.zone.release_handler();
            tracing::info!(zone_id = %self.zone.id(), "Protocol handler closed");
        }
    }
}

impl Drop for HttpProtocolHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for HttpProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProtocolHandler")
            .field("zone", &self.zone.id())
            .field("url", &self.url.as_str())
            .field("mode", &self.zone.mode())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
