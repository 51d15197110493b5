//! Transport layer for zone connections.
//!
//! A transport owns the per-protocol resources shared by every zone that
//! uses it: client settings for outgoing requests and, for push-mode zones,
//! the listener the zone posts to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            TransportManager              │
//! │   (one transport per protocol name)      │
//! └──────────────────┬──────────────────────┘
//!                    │ activate(zone)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  HttpTransport  │ │  HttpTransport  │
//! │     (http)      │ │    (https)      │
//! └────────┬────────┘ └────────┬────────┘
//!          └────────┬──────────┘
//!                   ▼
//!          HttpProtocolHandler (push | pull)
//! ```

mod http;
mod manager;

pub use http::HttpTransport;
pub use manager::{TransportFactory, TransportManager};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SifError};
use crate::protocol::HttpExchange;
use crate::zone::Zone;

/// Built-in transport protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// Plain HTTP (default)
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl TransportProtocol {
    /// Registry name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Whether requests are encrypted.
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Https)
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportProtocol {
    type Err = SifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(SifError::Config(format!("Unknown transport protocol: {s}"))),
        }
    }
}

/// Settings for one transport protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportProperties {
    /// Host the push listener binds to
    pub host: String,

    /// Port the push listener binds to (0 picks an ephemeral port)
    pub port: u16,

    /// Reuse connections across requests
    pub keep_alive: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TransportProperties {
    fn default() -> Self {
        Self::defaults_for("http")
    }
}

impl TransportProperties {
    /// Defaults for `protocol`.
    pub fn defaults_for(protocol: &str) -> Self {
        let port = if protocol.eq_ignore_ascii_case("https") {
            7081
        } else {
            7080
        };
        Self {
            host: "0.0.0.0".to_string(),
            port,
            keep_alive: true,
            timeout_secs: 30,
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Listener address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A transport protocol shared by the zones that use it.
pub trait Transport: Send + Sync {
    /// Protocol name.
    fn name(&self) -> &'static str;

    /// Settings in effect.
    fn properties(&self) -> &TransportProperties;

    /// Prepare the transport for `zone`.
    ///
    /// For push-mode zones this starts the listener (once) and registers the
    /// zone with it.
    fn activate<'a>(
        &'a self,
        zone: &'a Arc<Zone>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Forget `zone_id`.
    fn deactivate(&self, zone_id: &str);

    /// Client for requests sent on behalf of `agent_id`.
    fn exchange(&self, agent_id: &str) -> Result<Arc<dyn HttpExchange>>;

    /// Bound listener address, once a push zone has been activated.
    fn listen_addr(&self) -> Option<SocketAddr>;

    /// Release everything the transport holds.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
