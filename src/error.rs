//! SIF agent error types.
//!
//! # Retryable vs fatal
//!
//! Exactly one failure shape is retryable: [`SifError::ConnectionClosed`],
//! raised when a pooled keep-alive connection was torn down by the peer
//! before the response arrived. [`SifError::is_retryable`] is the only
//! predicate the protocol handler consults before its single retry; every
//! other variant is surfaced to the caller.
//!
//! [`SifError::PushModeExpected`] is terminal for the pull worker: the zone
//! told the agent it is registered for push delivery, so polling stops.

use thiserror::Error;

/// SIF agent errors.
#[derive(Error, Debug)]
pub enum SifError {
    /// Invalid configuration (bad URL scheme, unknown protocol, invalid mode transition).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-retryable connection or I/O failure talking to a zone.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer closed a kept-alive connection; safe to retry once on a fresh one.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Failure encoding or decoding a message body.
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Operation not available under the active SIF version family.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Operation invoked after shutdown or before initialization.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The zone expects push delivery; pulling is rejected.
    #[error("Zone expects push delivery: {0}")]
    PushModeExpected(String),

    /// Failure attributed to a specific zone connection.
    #[error("Zone {zone_id} ({url}): {source}")]
    Zone {
        /// Zone identifier.
        zone_id: String,
        /// Zone URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: Box<SifError>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for SIF operations
pub type Result<T> = std::result::Result<T, SifError>;

impl SifError {
    /// Whether the failure is the stale keep-alive signature that earns one retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SifError::ConnectionClosed(_))
    }

    /// Whether the zone rejected a pull because the agent is registered for push.
    pub fn is_push_mode_expected(&self) -> bool {
        match self {
            SifError::PushModeExpected(_) => true,
            SifError::Zone { source, .. } => source.is_push_mode_expected(),
            _ => false,
        }
    }

    /// Attach zone identity to an error.
    pub fn in_zone(self, zone_id: &str, url: &str) -> Self {
        SifError::Zone {
            zone_id: zone_id.to_string(),
            url: url.to_string(),
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for SifError {
    fn from(err: reqwest::Error) -> Self {
        SifError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for SifError {
    fn from(err: toml::de::Error) -> Self {
        SifError::Config(err.to_string())
    }
}

impl From<url::ParseError> for SifError {
    fn from(err: url::ParseError) -> Self {
        SifError::Config(format!("Invalid URL: {err}"))
    }
}
