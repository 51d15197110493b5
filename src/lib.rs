//! # SIF ADK - Agent-Side Transport
//!
//! Transport for SIF agents: the envelope-wrapped, versioned XML-over-HTTP
//! messaging an agent exchanges with its zones, with broker-push delivery or
//! agent-initiated polling.
//!
//! ## Features
//!
//! - **HTTP push/pull**: one protocol handler per zone, a single retry on a
//!   stale keep-alive connection, and an autonomous pull worker
//! - **Envelope streaming**: large messages composed from an envelope and
//!   payload segments without materializing them, with an exact
//!   Content-Length known up front
//! - **Version-aware formatting**: primitive syntax per SIF version family and
//!   element ordering across schema generations that collapsed containers
//! - **Request cache**: correlates outstanding requests with the object type
//!   their responses must be read as
//!
//! ## Architecture
//!
//! ```text
//!                  TransportManager
//!                        │ activate(zone)
//!                        ▼
//!   OutgoingMessage ─> HttpProtocolHandler ──POST──> Zone (ZIS)
//!         │                    │
//!   EnvelopeStreamer       pull worker ──> Dispatcher::pull()
//!                              │
//!   push listener <──POST── Zone ──> Dispatcher::dispatch()
//! ```
//!
//! ### Version Families
//!
//! | Type     | Legacy (1.x)   | Current (2.x+)        |
//! |----------|----------------|-----------------------|
//! | date     | `20240105`     | `2024-01-05`          |
//! | time     | `13:45:00`     | `13:45:00`            |
//! | datetime | date only      | `2024-01-05T13:45:00Z`|
//! | boolean  | `Yes` / `No`   | `true` / `false`      |
//! | duration | unsupported    | `PT1H30M`             |
//!
//! ## Quick Start
//!
//! ### Sending a Message
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sif::{AgentConfig, OutgoingMessage, TransportManager, Zone, ZoneConfig};
//!
//! let config = AgentConfig::from_file("agent.toml")?;
//! let manager = TransportManager::from_config(&config);
//!
//! let zone = Arc::new(Zone::new(
//!     ZoneConfig::new("District", "http://zis.example.org/District"),
//!     &config.agent.id,
//!     dispatcher,
//! ));
//! let handler = manager.activate(&zone).await?;
//!
//! let message = OutgoingMessage::new(sif::new_message_id(), envelope)
//!     .with_payload(std::path::PathBuf::from("students.xml"));
//! let ack = handler.send(&message).await?;
//! ```
//!
//! ### Formatting
//!
//! ```rust,ignore
//! use sif::{formatter_for, SifVersion};
//!
//! let legacy = formatter_for(SifVersion::SIF15R1);
//! assert_eq!(legacy.to_bool_string(true), "Yes");
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: HTTP protocol handler and pull worker
//! - [`envelope`]: Envelope/payload streaming composer
//! - [`format`]: Version-aware formatter and element sorter
//! - [`cache`]: Request/response correlation cache
//! - [`transport`]: Transports, push listener and transport manager
//! - [`zone`]: Zone context and dispatcher seam
//! - [`schema`]: Schema element metadata
//! - [`version`]: SIF version tags
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod format;
pub mod protocol;
pub mod schema;
pub mod transport;
pub mod version;
pub mod zone;

// Re-exports for convenience
pub use cache::{RequestCache, RequestInfo, SharedRequestCache};
pub use config::{AgentConfig, MessagingMode, PollingConfig, ZoneConfig};
pub use envelope::{new_message_id, ByteSource, EnvelopeStreamer, OutgoingMessage, PayloadSource};
pub use error::{Result, SifError};
pub use format::{formatter_for, ElementSorter, SifDuration, SifFormatter};
pub use protocol::{HttpExchange, HttpProtocolHandler, PollStats, ReqwestExchange};
pub use schema::{Element, ElementDef, SchemaLookup, SchemaRegistry};
pub use transport::{HttpTransport, Transport, TransportManager, TransportProperties, TransportProtocol};
pub use version::{SifVersion, VersionFamily};
pub use zone::{Dispatcher, Zone};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SIF version of the in-memory object model.
///
/// Elements read under older versions are retagged to this version's
/// definitions.
pub const RUNTIME_VERSION: SifVersion = SifVersion::LATEST;
