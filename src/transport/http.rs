//! HTTP(S) transport.
//!
//! Outgoing requests go through a [`ReqwestExchange`]. Push-mode zones are
//! served by one axum listener per transport; the zone posts each message to
//! `/zones/<zone_id>` and receives the dispatcher's acknowledgement.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::{Transport, TransportProtocol, TransportProperties};
use crate::config::MessagingMode;
use crate::error::{Result, SifError};
use crate::protocol::{HttpExchange, ReqwestExchange, SIF_CONTENT_TYPE};
use crate::zone::Zone;

type ZoneTable = Arc<RwLock<HashMap<String, Arc<Zone>>>>;

struct Listener {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

/// HTTP or HTTPS transport.
pub struct HttpTransport {
    protocol: TransportProtocol,
    properties: TransportProperties,
    zones: ZoneTable,
    listener: Mutex<Option<Listener>>,
}

impl HttpTransport {
    /// Create a transport for `protocol`.
    pub fn new(protocol: TransportProtocol, properties: TransportProperties) -> Self {
        Self {
            protocol,
            properties,
            zones: Arc::new(RwLock::new(HashMap::new())),
            listener: Mutex::new(None),
        }
    }

    /// Plain HTTP with a listener on localhost:`port`.
    pub fn localhost(port: u16) -> Self {
        Self::new(
            TransportProtocol::Http,
            TransportProperties {
                host: "127.0.0.1".to_string(),
                port,
                ..TransportProperties::default()
            },
        )
    }

    /// Number of push zones registered with the listener.
    pub fn push_zone_count(&self) -> usize {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn ensure_listener(&self) -> Result<()> {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(|l| !l.task.is_finished()) {
            return Ok(());
        }

        let addr = self.properties.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| SifError::Transport(format!("Failed to bind push listener to {addr}: {e}")))?;
        let addr = listener.local_addr()?;
        tracing::info!("Push listener ({}) on {}", self.protocol, addr);

        let (stop, stopped) = oneshot::channel();
        let router = push_router(Arc::clone(&self.zones));
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
                .map_err(|e| SifError::Transport(format!("Push listener error: {e}")))
        });

        *slot = Some(Listener { addr, stop, task });
        Ok(())
    }
}

/// Router serving push deliveries for the zones in `zones`.
pub(crate) fn push_router(zones: ZoneTable) -> Router {
    Router::new()
        .route("/zones/:zone_id", post(receive))
        .with_state(zones)
        .layer(TraceLayer::new_for_http())
}

async fn receive(
    State(zones): State<ZoneTable>,
    Path(zone_id): Path<String>,
    body: Bytes,
) -> Response {
    let zone = zones
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&zone_id)
        .cloned();
    let Some(zone) = zone else {
        return (StatusCode::NOT_FOUND, format!("Unknown zone: {zone_id}")).into_response();
    };

    tracing::debug!(zone_id = %zone_id, bytes = body.len(), "Push delivery");
    match zone.dispatcher().dispatch(body).await {
        Ok(ack) => ([(header::CONTENT_TYPE, SIF_CONTENT_TYPE)], ack).into_response(),
        Err(e) => {
            tracing::warn!(zone_id = %zone_id, "Dispatch failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        self.protocol.name()
    }

    fn properties(&self) -> &TransportProperties {
        &self.properties
    }

    fn activate<'a>(
        &'a self,
        zone: &'a Arc<Zone>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if zone.mode() != MessagingMode::Push {
                return Ok(());
            }
            if self.protocol.is_secure() {
                return Err(SifError::Config(format!(
                    "Zone {}: push delivery over {} requires TLS termination, which this agent does not provide",
                    zone.id(),
                    self.protocol
                )));
            }

            self.ensure_listener().await?;
            self.zones
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(zone.id().to_string(), Arc::clone(zone));
            tracing::info!(zone_id = %zone.id(), "Registered for push delivery");
            Ok(())
        })
    }

    fn deactivate(&self, zone_id: &str) {
        if self
            .zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(zone_id)
            .is_some()
        {
            tracing::debug!(zone_id = %zone_id, "Unregistered from push delivery");
        }
    }

    fn exchange(&self, agent_id: &str) -> Result<Arc<dyn HttpExchange>> {
        Ok(Arc::new(ReqwestExchange::new(agent_id, &self.properties)?))
    }

    fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener
            .try_lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|l| l.addr))
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.zones
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();

            let listener = self.listener.lock().await.take();
            if let Some(listener) = listener {
                let _ = listener.stop.send(());
                match listener.task.await {
                    Ok(result) => result?,
                    Err(e) => {
                        return Err(SifError::Transport(format!("Push listener task failed: {e}")))
                    },
                }
                tracing::info!("Push listener ({}) stopped", self.protocol);
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("protocol", &self.protocol)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ZoneConfig;
    use crate::zone::Dispatcher;

    struct Echo;

    impl Dispatcher for Echo {
        fn pull(&self) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>> {
            Box::pin(async { Ok(0) })
        }

        fn dispatch(
            &self,
            message: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
            Box::pin(async move { Ok(message) })
        }
    }

    fn push_zone(id: &str) -> Arc<Zone> {
        Arc::new(Zone::new(
            ZoneConfig::new(id, "http://zis/Z").with_mode(MessagingMode::Push),
            "Agent",
            Arc::new(Echo),
        ))
    }

    #[test]
    fn test_http_transport_localhost() {
        let transport = HttpTransport::localhost(3000);
        assert_eq!(transport.properties().listen_addr(), "127.0.0.1:3000");
        assert_eq!(transport.name(), "http");
        assert!(transport.listen_addr().is_none());
    }

    #[tokio::test]
    async fn test_pull_zone_needs_no_listener() {
        let transport = HttpTransport::localhost(0);
        let zone = Arc::new(Zone::new(ZoneConfig::new("Z", "http://zis/Z"), "Agent", Arc::new(Echo)));
        transport.activate(&zone).await.unwrap();
        assert!(transport.listen_addr().is_none());
        assert_eq!(transport.push_zone_count(), 0);
    }

    #[tokio::test]
    async fn test_push_over_https_rejected() {
        let transport = HttpTransport::new(
            TransportProtocol::Https,
            TransportProperties::defaults_for("https"),
        );
        let err = transport.activate(&push_zone("Z")).await.unwrap_err();
        assert!(matches!(err, SifError::Config(_)));
    }

    #[tokio::test]
    async fn test_one_listener_for_many_zones() {
        let transport = HttpTransport::localhost(0);
        transport.activate(&push_zone("A")).await.unwrap();
        let addr = transport.listen_addr().unwrap();
        transport.activate(&push_zone("B")).await.unwrap();
        assert_eq!(transport.listen_addr(), Some(addr));
        assert_eq!(transport.push_zone_count(), 2);

        transport.deactivate("A");
        assert_eq!(transport.push_zone_count(), 1);

        transport.shutdown().await.unwrap();
        transport.shutdown().await.unwrap();
        assert!(transport.listen_addr().is_none());
        assert_eq!(transport.push_zone_count(), 0);
    }

    fn delivery(zone_id: &str) -> Request<Body> {
        Request::post(format!("/zones/{zone_id}"))
            .body(Body::from("<SIF_Event/>"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_router_dispatches_to_registered_zone() {
        let zones: ZoneTable = Arc::new(RwLock::new(HashMap::new()));
        zones.write().unwrap().insert("A".to_string(), push_zone("A"));

        let response = push_router(Arc::clone(&zones)).oneshot(delivery("A")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], SIF_CONTENT_TYPE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"<SIF_Event/>"));

        let response = push_router(zones).oneshot(delivery("B")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
