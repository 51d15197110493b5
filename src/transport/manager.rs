//! Transport registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{HttpTransport, Transport, TransportProtocol, TransportProperties};
use crate::config::{AgentConfig, PollingConfig};
use crate::error::{Result, SifError};
use crate::protocol::HttpProtocolHandler;
use crate::zone::Zone;

/// Creates a transport from its settings.
pub type TransportFactory =
    Box<dyn Fn(TransportProperties) -> Result<Arc<dyn Transport>> + Send + Sync>;

#[derive(Default)]
struct Registry {
    transports: HashMap<String, Arc<dyn Transport>>,
    defaults: HashMap<String, TransportProperties>,
}

/// Owns one live transport per protocol name.
///
/// Transports are created on first use from registered factories and kept
/// until [`shutdown`](Self::shutdown).
pub struct TransportManager {
    factories: HashMap<String, TransportFactory>,
    overrides: HashMap<String, TransportProperties>,
    polling: PollingConfig,
    registry: Mutex<Registry>,
}

impl TransportManager {
    /// Empty manager; register factories before use.
    pub fn new(polling: PollingConfig) -> Self {
        Self {
            factories: HashMap::new(),
            overrides: HashMap::new(),
            polling,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Manager with the built-in `http` and `https` transports.
    pub fn with_defaults(polling: PollingConfig) -> Self {
        let mut manager = Self::new(polling);
        for protocol in [TransportProtocol::Http, TransportProtocol::Https] {
            manager.register(
                protocol.name(),
                Box::new(move |props: TransportProperties| {
                    Ok(Arc::new(HttpTransport::new(protocol, props)) as Arc<dyn Transport>)
                }),
            );
        }
        manager
    }

    /// Manager configured from `config`: built-in transports, polling timing
    /// and per-protocol overrides.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut manager = Self::with_defaults(config.polling);
        for (protocol, props) in &config.transports {
            manager = manager.with_properties(protocol, props.clone());
        }
        manager
    }

    /// Register (or replace) the factory for `protocol`.
    pub fn register(&mut self, protocol: &str, factory: TransportFactory) {
        self.factories.insert(protocol.to_lowercase(), factory);
    }

    /// Override the settings used when `protocol` is created.
    pub fn with_properties(mut self, protocol: &str, properties: TransportProperties) -> Self {
        self.overrides.insert(protocol.to_lowercase(), properties);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_known(&self, protocol: &str) -> Result<()> {
        if self.factories.contains_key(protocol) {
            Ok(())
        } else {
            Err(SifError::Transport(format!(
                "Unknown transport protocol: {protocol}"
            )))
        }
    }

    fn properties_locked(&self, registry: &mut Registry, protocol: &str) -> TransportProperties {
        registry
            .defaults
            .entry(protocol.to_string())
            .or_insert_with(|| {
                self.overrides
                    .get(protocol)
                    .cloned()
                    .unwrap_or_else(|| TransportProperties::defaults_for(protocol))
            })
            .clone()
    }

    /// Settings for `protocol`, computed once and cached.
    pub fn get_default_transport_properties(&self, protocol: &str) -> Result<TransportProperties> {
        let protocol = protocol.to_lowercase();
        self.check_known(&protocol)?;
        Ok(self.properties_locked(&mut self.lock(), &protocol))
    }

    /// The live transport for `protocol`, created on first use.
    pub fn get_transport(&self, protocol: &str) -> Result<Arc<dyn Transport>> {
        let protocol = protocol.to_lowercase();
        let factory = self.factories.get(&protocol).ok_or_else(|| {
            SifError::Transport(format!("Unknown transport protocol: {protocol}"))
        })?;

        let mut registry = self.lock();
        if let Some(transport) = registry.transports.get(&protocol) {
            return Ok(Arc::clone(transport));
        }

        let properties = self.properties_locked(&mut registry, &protocol);
        let transport = factory(properties)?;
        tracing::info!(protocol = %protocol, "Transport created");
        registry
            .transports
            .insert(protocol, Arc::clone(&transport));
        Ok(transport)
    }

    /// Activate the zone's transport and bind a protocol handler to the zone.
    pub async fn activate(&self, zone: &Arc<Zone>) -> Result<HttpProtocolHandler> {
        let transport = self.get_transport(&zone.protocol())?;
        transport.activate(zone).await?;

        let handler = transport.exchange(zone.agent_id()).and_then(|exchange| {
            HttpProtocolHandler::open(Arc::clone(zone), exchange, self.polling)
        });
        let handler = match handler {
            Ok(handler) => handler.with_transport(Arc::clone(&transport)),
            Err(e) => {
                transport.deactivate(zone.id());
                return Err(e);
            },
        };

        tracing::info!(zone_id = %zone.id(), transport = transport.name(), mode = %zone.mode(), "Zone activated");
        Ok(handler)
    }

    /// Number of live transports.
    pub fn transport_count(&self) -> usize {
        self.lock().transports.len()
    }

    /// Shut down and forget every live transport.
    ///
    /// Every transport is shut down even if one fails; the first failure is
    /// returned.
    pub async fn shutdown(&self) -> Result<()> {
        let transports: Vec<_> = self.lock().transports.drain().collect();

        let mut first_error = None;
        for (protocol, transport) in transports {
            if let Err(e) = transport.shutdown().await {
                tracing::warn!(protocol = %protocol, "Transport shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut protocols: Vec<_> = self.factories.keys().collect();
        protocols.sort();
        f.debug_struct("TransportManager")
            .field("protocols", &protocols)
            .field("live", &self.transport_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::config::{MessagingMode, ZoneConfig};
    use crate::zone::Dispatcher;

    struct Quiet;

    impl Dispatcher for Quiet {
        fn pull(&self) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>> {
            Box::pin(async { Ok(-1) })
        }

        fn dispatch(
            &self,
            message: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
            Box::pin(async move { Ok(message) })
        }
    }

    fn zone(id: &str, url: &str, mode: MessagingMode) -> Arc<Zone> {
        Arc::new(Zone::new(
            ZoneConfig::new(id, url).with_mode(mode),
            "Agent",
            Arc::new(Quiet),
        ))
    }

    fn counting_manager(created: &Arc<AtomicUsize>) -> TransportManager {
        let mut manager = TransportManager::new(PollingConfig::default());
        let created = Arc::clone(created);
        manager.register(
            "http",
            Box::new(move |props: TransportProperties| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(HttpTransport::new(TransportProtocol::Http, props)) as Arc<dyn Transport>)
            }),
        );
        manager
    }

    #[test]
    fn test_transport_created_once_case_insensitive() {
        let created = Arc::new(AtomicUsize::new(0));
        let manager = counting_manager(&created);

        let a = manager.get_transport("http").unwrap();
        let b = manager.get_transport("HTTP").unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.transport_count(), 1);
    }

    #[test]
    fn test_unknown_protocol_named_in_error() {
        let manager = TransportManager::with_defaults(PollingConfig::default());
        let err = manager.get_transport("smtp").err().unwrap();
        assert!(matches!(err, SifError::Transport(_)));
        assert!(err.to_string().contains("smtp"));
        assert!(manager.get_default_transport_properties("smtp").is_err());
    }

    #[test]
    fn test_default_properties_with_override() {
        let manager = TransportManager::with_defaults(PollingConfig::default()).with_properties(
            "HTTP",
            TransportProperties {
                port: 9000,
                ..TransportProperties::default()
            },
        );
        assert_eq!(manager.get_default_transport_properties("http").unwrap().port, 9000);
        assert_eq!(manager.get_default_transport_properties("https").unwrap().port, 7081);
        assert_eq!(manager.get_transport("http").unwrap().properties().port, 9000);
    }

    #[tokio::test]
    async fn test_activate_pull_zone() {
        let manager = TransportManager::with_defaults(PollingConfig::default());
        let zone = zone("Z1", "https://zis.example/Z1", MessagingMode::Pull);

        let handler = manager.activate(&zone).await.unwrap();
        assert_eq!(handler.mode(), MessagingMode::Pull);
        assert_eq!(handler.url().as_str(), "https://zis.example/Z1");
        assert!(manager.activate(&zone).await.is_err());

        drop(handler);
        assert!(manager.activate(&zone).await.is_ok());
    }

    #[tokio::test]
    async fn test_activate_push_zone_starts_listener() {
        let manager = TransportManager::with_defaults(PollingConfig::default()).with_properties(
            "http",
            TransportProperties {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..TransportProperties::default()
            },
        );
        let zone = zone("Z1", "http://zis.example/Z1", MessagingMode::Push);

        let handler = manager.activate(&zone).await.unwrap();
        assert!(handler.start().is_err());
        assert!(manager.get_transport("http").unwrap().listen_addr().is_some());

        manager.shutdown().await.unwrap();
        assert_eq!(manager.transport_count(), 0);
    }

    #[tokio::test]
    async fn test_closing_push_handler_deregisters_zone() {
        let transport = Arc::new(HttpTransport::localhost(0));
        let mut manager = TransportManager::new(PollingConfig::default());
        let shared = Arc::clone(&transport);
        manager.register(
            "http",
            Box::new(move |_props: TransportProperties| Ok(Arc::clone(&shared) as Arc<dyn Transport>)),
        );

        let a = manager
            .activate(&zone("A", "http://zis.example/A", MessagingMode::Push))
            .await
            .unwrap();
        let b = manager
            .activate(&zone("B", "http://zis.example/B", MessagingMode::Push))
            .await
            .unwrap();
        assert_eq!(transport.push_zone_count(), 2);

        a.close();
        a.close();
        assert_eq!(transport.push_zone_count(), 1);

        drop(b);
        assert_eq!(transport.push_zone_count(), 0);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_clears_transports() {
        let created = Arc::new(AtomicUsize::new(0));
        let manager = counting_manager(&created);
        manager.get_transport("http").unwrap();

        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();
        assert_eq!(manager.transport_count(), 0);

        manager.get_transport("http").unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
