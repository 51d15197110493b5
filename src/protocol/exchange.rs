//! HTTP exchange: one POST of a composed message, one response body.

use std::error::Error as StdError;
use std::future::Future;
use std::io::{self, Read};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use tokio::sync::mpsc;
use url::Url;

use crate::envelope::{EnvelopeStreamer, OutgoingMessage, CHUNK_SIZE};
use crate::error::{Result, SifError};
use crate::transport::TransportProperties;

/// Content type of every SIF request.
pub const SIF_CONTENT_TYPE: &str = "application/xml;charset=\"utf-8\"";

/// Chunks buffered between the blocking reader and the request body.
const BODY_CHANNEL_DEPTH: usize = 4;

/// Seam between the protocol handler and the HTTP client.
pub trait HttpExchange: Send + Sync {
    /// POST `message` to `url` and return the response body.
    ///
    /// `fresh` asks for a connection that is not taken from the keep-alive
    /// pool. A peer tearing down a pooled connection must surface as
    /// [`SifError::ConnectionClosed`].
    fn post<'a>(
        &'a self,
        url: &'a Url,
        message: &'a OutgoingMessage,
        fresh: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + 'a>>;
}

/// `User-Agent` value for `agent_id`.
pub fn user_agent(agent_id: &str) -> String {
    format!("{agent_id} (Adk/{})", crate::VERSION)
}

/// [`HttpExchange`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestExchange {
    client: Client,
    user_agent: String,
    keep_alive: bool,
    timeout: Duration,
}

impl ReqwestExchange {
    /// Exchange for `agent_id` using the given transport settings.
    pub fn new(agent_id: &str, properties: &TransportProperties) -> Result<Self> {
        let user_agent = user_agent(agent_id);
        let timeout = properties.timeout();
        let client = build_client(&user_agent, timeout, properties.keep_alive)?;

        Ok(Self {
            client,
            user_agent,
            keep_alive: properties.keep_alive,
            timeout,
        })
    }
}

fn build_client(user_agent: &str, timeout: Duration, pooled: bool) -> Result<Client> {
    let mut builder = Client::builder().user_agent(user_agent).timeout(timeout);
    if !pooled {
        builder = builder.pool_max_idle_per_host(0);
    }
    builder
        .build()
        .map_err(|e| SifError::Config(format!("Failed to build HTTP client: {e}")))
}

impl HttpExchange for ReqwestExchange {
    fn post<'a>(
        &'a self,
        url: &'a Url,
        message: &'a OutgoingMessage,
        fresh: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + 'a>> {
        Box::pin(async move {
            let client = if fresh {
                build_client(&self.user_agent, self.timeout, false)?
            } else {
                self.client.clone()
            };

            let streamer = message.streamer()?;
            let length = streamer.length();

            let mut request = client
                .post(url.clone())
                .header(CONTENT_TYPE, SIF_CONTENT_TYPE)
                .header(CONTENT_LENGTH, length)
                .body(streaming_body(streamer));
            if !self.keep_alive || fresh {
                request = request.header(CONNECTION, "close");
            }

            let response = request.send().await.map_err(classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(SifError::Transport(format!("HTTP {status} from {url}")));
            }
            response.bytes().await.map_err(classify)
        })
    }
}

/// Stream the composed message without buffering it.
///
/// The streamer is a blocking reader, so it runs on the blocking pool and
/// hands chunks to the request through a bounded channel.
fn streaming_body(mut streamer: EnvelopeStreamer) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(BODY_CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let chunk = match streamer.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                break;
            }
        }
        streamer.close();
    });

    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    reqwest::Body::wrap_stream(chunks)
}

/// Map a client failure into the error taxonomy.
fn classify(err: reqwest::Error) -> SifError {
    match failure_kind(&err) {
        Some(io::ErrorKind::InvalidData) => {
            SifError::Messaging(format!("Failed to compose message body: {err}"))
        },
        Some(_) => SifError::ConnectionClosed(err.to_string()),
        None if err.is_timeout() => SifError::Transport(format!("Timed out: {err}")),
        None => SifError::Transport(err.to_string()),
    }
}

/// Walk the source chain for a stale-connection or body-composition failure.
fn failure_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                kind @ (io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::InvalidData) => return Some(kind),
                _ => {},
            }
        }
        // hyper reports a pooled connection dropped mid-exchange this way.
        if e.to_string().contains("connection closed") {
            return Some(io::ErrorKind::ConnectionReset);
        }
        current = e.source();
    }
    None
}
