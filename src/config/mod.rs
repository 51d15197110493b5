//! Agent configuration.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for `sif-agent`)

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{SharedRequestCache, DEFAULT_TTL_SECS};
use crate::error::{Result, SifError};
use crate::transport::TransportProperties;
use crate::version::SifVersion;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identity
    #[serde(default)]
    pub agent: AgentSection,

    /// Zones the agent connects to
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,

    /// Pull-mode timing
    #[serde(default)]
    pub polling: PollingConfig,

    /// Per-protocol transport overrides, keyed by protocol name
    #[serde(default)]
    pub transports: HashMap<String, TransportProperties>,

    /// Request cache backing store
    #[serde(default)]
    pub request_cache: RequestCacheConfig,
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| SifError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| SifError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("SIF_AGENT_ID") {
            config.agent.id = id;
        }
        if let Ok(url) = std::env::var("SIF_ZONE_URL") {
            config.zones.push(ZoneConfig::new("default", url));
        }

        if let Ok(freq) = std::env::var("SIF_POLL_FREQUENCY_MS") {
            if let Ok(freq) = freq.parse() {
                config.polling.frequency_ms = freq;
            }
        }
        if let Ok(keep_alive) = std::env::var("SIF_KEEP_ALIVE") {
            if let Ok(keep_alive) = keep_alive.parse::<bool>() {
                for protocol in ["http", "https"] {
                    config
                        .transports
                        .entry(protocol.to_string())
                        .or_insert_with(|| TransportProperties::defaults_for(protocol))
                        .keep_alive = keep_alive;
                }
            }
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let defaults = Self::default();

        let mut transports = self.transports;
        transports.extend(other.transports);

        Self {
            agent: AgentSection {
                id: if other.agent.id != defaults.agent.id {
                    other.agent.id
                } else {
                    self.agent.id
                },
                version: if other.agent.version != defaults.agent.version {
                    other.agent.version
                } else {
                    self.agent.version
                },
            },
            zones: if other.zones.is_empty() {
                self.zones
            } else {
                other.zones
            },
            polling: PollingConfig {
                frequency_ms: if other.polling.frequency_ms != defaults.polling.frequency_ms {
                    other.polling.frequency_ms
                } else {
                    self.polling.frequency_ms
                },
                error_delay_ms: if other.polling.error_delay_ms
                    != defaults.polling.error_delay_ms
                {
                    other.polling.error_delay_ms
                } else {
                    self.polling.error_delay_ms
                },
            },
            transports,
            request_cache: if other.request_cache != defaults.request_cache {
                other.request_cache
            } else {
                self.request_cache
            },
        }
    }

    /// Zone by id.
    pub fn zone(&self, id: &str) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.id == id)
    }
}

/// Agent identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    /// `SIF_SourceId` of the agent, also sent in the User-Agent header
    pub id: String,

    /// SIF version the agent speaks
    pub version: SifVersion,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            id: "SifAgent".to_string(),
            version: SifVersion::LATEST,
        }
    }
}

/// How the zone delivers messages to the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingMode {
    /// The agent polls the zone.
    #[default]
    Pull,
    /// The zone posts to the agent's listener.
    Push,
}

impl fmt::Display for MessagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "pull",
            Self::Push => "push",
        })
    }
}

impl FromStr for MessagingMode {
    type Err = SifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pull" => Ok(Self::Pull),
            "push" => Ok(Self::Push),
            _ => Err(SifError::Config(format!("Unknown messaging mode: {s}"))),
        }
    }
}

/// One zone connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone identifier
    pub id: String,

    /// Zone URL (http or https)
    pub url: String,

    /// Delivery mode
    #[serde(default)]
    pub mode: MessagingMode,

    /// Transport protocol name; defaults to the URL scheme
    #[serde(default)]
    pub protocol: Option<String>,
}

impl ZoneConfig {
    /// Pull-mode zone at `url`.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            mode: MessagingMode::default(),
            protocol: None,
        }
    }

    /// Set the delivery mode.
    pub fn with_mode(mut self, mode: MessagingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Transport protocol: explicit setting, else the URL scheme.
    pub fn protocol(&self) -> String {
        match &self.protocol {
            Some(p) => p.to_lowercase(),
            None => self
                .url
                .split_once("://")
                .map_or("http", |(scheme, _)| scheme)
                .to_lowercase(),
        }
    }
}

/// Pull-mode timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls that returned a message or an ordinary failure
    pub frequency_ms: u64,

    /// Delay after the zone reports sleeping or the connection is down
    pub error_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            frequency_ms: 30_000,
            error_delay_ms: 60_000,
        }
    }
}

impl PollingConfig {
    /// Normal inter-poll delay.
    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }

    /// Inter-poll delay after a sleep sentinel or disconnect.
    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
}

/// Request cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCacheConfig {
    /// Backing file; `None` keeps the cache in memory
    pub path: Option<PathBuf>,

    /// Entry time-to-live in seconds; `None` disables eviction
    pub ttl_secs: Option<u64>,
}

impl Default for RequestCacheConfig {
    fn default() -> Self {
        Self {
            path: dirs::cache_dir().map(|p| p.join("sif").join("requests.log")),
            ttl_secs: Some(DEFAULT_TTL_SECS), // 24 hours
        }
    }
}

impl RequestCacheConfig {
    /// Build the shared cache handle this configuration describes.
    pub fn build(&self) -> SharedRequestCache {
        let ttl = self.ttl_secs.map(Duration::from_secs);
        match &self.path {
            Some(path) => SharedRequestCache::file_backed(path.clone(), ttl),
            None => SharedRequestCache::in_memory(ttl),
        }
    }
}
