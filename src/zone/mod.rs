//! Zone context shared by the protocol handler, the pull worker and the
//! push listener.
//!
//! A [`Zone`] is owned by the agent and handed around as `Arc<Zone>`. Its
//! connection flags are atomics so the pull worker can observe them without
//! locking.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{MessagingMode, ZoneConfig};
use crate::error::{Result, SifError};
use crate::version::SifVersion;

/// Message routing collaborator.
///
/// The transport never interprets SIF messages; it moves bytes between the
/// zone and this trait.
pub trait Dispatcher: Send + Sync {
    /// Ask the zone for the next queued message and route it.
    ///
    /// Returns a negative value when the zone is sleeping and has nothing
    /// to deliver. Returns [`SifError::PushModeExpected`] when the zone
    /// rejects pulling.
    fn pull(&self) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>>;

    /// Route a message the zone pushed to the agent and return the
    /// acknowledgement to send back.
    fn dispatch(&self, message: Bytes) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>>;
}

/// Connection context for one zone.
pub struct Zone {
    config: ZoneConfig,
    agent_id: String,
    version: SifVersion,
    dispatcher: Arc<dyn Dispatcher>,
    connected: AtomicBool,
    shut_down: AtomicBool,
    handler_bound: AtomicBool,
}

impl Zone {
    /// Zone speaking the latest SIF version.
    pub fn new(
        config: ZoneConfig,
        agent_id: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            config,
            agent_id: agent_id.into(),
            version: SifVersion::LATEST,
            dispatcher,
            connected: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            handler_bound: AtomicBool::new(false),
        }
    }

    /// Set the SIF version the agent speaks to this zone.
    pub fn with_version(mut self, version: SifVersion) -> Self {
        self.version = version;
        self
    }

    /// Zone identifier.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Zone URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Delivery mode.
    pub fn mode(&self) -> MessagingMode {
        self.config.mode
    }

    /// Transport protocol name.
    pub fn protocol(&self) -> String {
        self.config.protocol()
    }

    /// Owning agent's id.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// SIF version in use.
    pub fn version(&self) -> SifVersion {
        self.version
    }

    /// Zone configuration.
    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// Message router.
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Whether the agent is registered with the zone.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record registration state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Whether the zone has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Mark the zone shut down. The pull worker exits at its next check.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::info!(zone_id = %self.id(), "Zone shut down");
        }
        self.set_connected(false);
    }

    /// Reserve the zone for one protocol handler.
    pub(crate) fn bind_handler(&self) -> Result<()> {
        if self.handler_bound.swap(true, Ordering::AcqRel) {
            return Err(SifError::Lifecycle(format!(
                "Zone {} already has an active protocol handler",
                self.id()
            )));
        }
        Ok(())
    }

    /// Release the reservation taken by [`bind_handler`](Self::bind_handler).
    pub(crate) fn release_handler(&self) {
        self.handler_bound.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.config.id)
            .field("url", &self.config.url)
            .field("mode", &self.config.mode)
            .field("version", &self.version)
            .field("connected", &self.is_connected())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
