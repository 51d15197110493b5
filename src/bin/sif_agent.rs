//! SIF agent CLI binary.
//!
//! Drives the agent-side transport from the command line.
//!
//! # Commands
//!
//! - `send` - Compose an envelope with payload files and POST it to a zone
//! - `poll` - Run the pull worker against a zone until Ctrl-C
//! - `format` - Render a value in a SIF version's wire syntax

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sif::{
    config::{AgentConfig, MessagingMode, ZoneConfig},
    format::formatter_for,
    new_message_id,
    protocol::HttpExchange,
    transport::TransportManager,
    Dispatcher, OutgoingMessage, SifError, SifVersion, Zone, VERSION,
};
use url::Url;

#[derive(Parser)]
#[command(name = "sif-agent")]
#[command(version = VERSION)]
#[command(about = "SIF agent transport - push/pull messaging with SIF zones", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Agent config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a message and POST it to a zone
    Send {
        /// Zone URL
        #[arg(long)]
        zone_url: String,

        /// Zone identifier
        #[arg(long, default_value = "default")]
        zone_id: String,

        /// Envelope file
        #[arg(short, long)]
        envelope: PathBuf,

        /// Payload files spliced in at the placeholder, in order
        #[arg(short, long)]
        payload: Vec<PathBuf>,

        /// Placeholder element in the envelope
        #[arg(long, default_value = sif::envelope::DEFAULT_PLACEHOLDER)]
        placeholder: String,

        /// Drop the placeholder's own markup
        #[arg(long)]
        replace: bool,

        /// SIF_MsgId of the message (default: generated)
        #[arg(long)]
        message_id: Option<String>,

        /// Remember the request's object type in the request cache
        #[arg(long)]
        object_type: Option<String>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Poll a zone until interrupted
    Poll {
        /// Zone URL (default: first configured zone)
        #[arg(long)]
        zone_url: Option<String>,

        /// Zone identifier
        #[arg(long, default_value = "default")]
        zone_id: String,

        /// Poll frequency in milliseconds
        #[arg(long)]
        frequency_ms: Option<u64>,

        /// Delay after a sleeping zone or failure, in milliseconds
        #[arg(long)]
        error_delay_ms: Option<u64>,
    },

    /// Render an ISO value in the syntax of a SIF version
    Format {
        /// Target SIF version (e.g. 1.5r1, 2.0)
        #[arg(short, long)]
        version: String,

        /// Value kind: date, time, datetime, boolean, duration
        kind: String,

        /// Value in ISO syntax
        value: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Send {
            zone_url,
            zone_id,
            envelope,
            payload,
            placeholder,
            replace,
            message_id,
            object_type,
            output,
        } => {
            let config = load_config(cli.config)?;
            let message_id = message_id.unwrap_or_else(new_message_id);
            let mut message = OutgoingMessage::new(message_id, std::fs::read(envelope)?)
                .with_placeholder(placeholder, replace);
            for path in payload {
                message = message.with_payload(path);
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cmd_send(
                config,
                ZoneConfig::new(zone_id, zone_url),
                message,
                object_type,
                output,
            ))
        },

        Commands::Poll {
            zone_url,
            zone_id,
            frequency_ms,
            error_delay_ms,
        } => {
            let mut config = load_config(cli.config)?;
            if let Some(ms) = frequency_ms {
                config.polling.frequency_ms = ms;
            }
            if let Some(ms) = error_delay_ms {
                config.polling.error_delay_ms = ms;
            }
            let zone = match zone_url {
                Some(url) => ZoneConfig::new(zone_id, url),
                None => config
                    .zones
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("No zone URL given and none configured"))?,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cmd_poll(config, zone.with_mode(MessagingMode::Pull)))
        },

        Commands::Format {
            version,
            kind,
            value,
        } => cmd_format(&version, &kind, &value),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AgentConfig> {
    let file = match path {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    Ok(file.merge(AgentConfig::from_env()))
}

async fn cmd_send(
    config: AgentConfig,
    zone: ZoneConfig,
    message: OutgoingMessage,
    object_type: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let manager = TransportManager::from_config(&config);
    let zone = connect(&config, &manager, zone)?;
    let handler = manager.activate(&zone).await?;

    let cache = config.request_cache.build();
    if let Some(object_type) = &object_type {
        let info = cache
            .get()?
            .store_request_info(message.message_id(), object_type, None, zone.id())?;
        tracing::info!(message_id = %info.message_id, object_type = %info.object_type, "Request cached");
    }

    let response = handler.send(&message).await?;
    write_output(output, &response)?;

    handler.close();
    cache.close();
    manager.shutdown().await?;
    Ok(())
}

async fn cmd_poll(config: AgentConfig, zone: ZoneConfig) -> anyhow::Result<()> {
    let manager = TransportManager::from_config(&config);
    let zone = connect(&config, &manager, zone)?;
    let handler = manager.activate(&zone).await?;

    handler.start()?;
    tracing::info!(zone_id = %zone.id(), "Polling; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    handler.shutdown();
    let stats = handler.stats();
    tracing::info!(
        attempts = stats.attempts(),
        messages = stats.messages(),
        sleeps = stats.sleeps(),
        failures = stats.failures(),
        "Pull worker finished"
    );
    handler.close();
    manager.shutdown().await?;
    Ok(())
}

/// Build the zone context with a dispatcher that pulls through the zone's transport.
fn connect(
    config: &AgentConfig,
    manager: &TransportManager,
    zone: ZoneConfig,
) -> anyhow::Result<Arc<Zone>> {
    let transport = manager.get_transport(&zone.protocol())?;
    let dispatcher = LoggingDispatcher {
        exchange: transport.exchange(&config.agent.id)?,
        url: Url::parse(&zone.url)?,
        agent_id: config.agent.id.clone(),
        version: config.agent.version,
    };
    let zone = Zone::new(zone, &config.agent.id, Arc::new(dispatcher)).with_version(config.agent.version);
    zone.set_connected(true);
    Ok(Arc::new(zone))
}

fn cmd_format(version: &str, kind: &str, value: &str) -> anyhow::Result<()> {
    let target = formatter_for(version.parse()?);
    let iso = formatter_for(SifVersion::LATEST);

    let rendered = match kind {
        "date" => target.to_date_string(iso.to_date(value)?),
        "time" => target.to_time_string(iso.to_time(value)?),
        "datetime" => target.to_datetime_string(iso.to_datetime(value)?.fixed_offset()),
        "boolean" | "bool" => target.to_bool_string(iso.to_bool(value)?).to_string(),
        "duration" => target.to_duration_string(&iso.to_duration(value)?)?,
        other => anyhow::bail!("Unknown kind: {other}. Use: date, time, datetime, boolean, duration"),
    };
    println!("{rendered}");
    Ok(())
}

fn write_output(output: Option<PathBuf>, content: &[u8]) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{}", String::from_utf8_lossy(content));
    }
    Ok(())
}

/// Pulls with `SIF_GetMessage` and logs whatever the zone returns.
struct LoggingDispatcher {
    exchange: Arc<dyn HttpExchange>,
    url: Url,
    agent_id: String,
    version: SifVersion,
}

impl LoggingDispatcher {
    fn get_message(&self) -> OutgoingMessage {
        let message_id = new_message_id();
        let timestamp = formatter_for(self.version).to_datetime_string(Utc::now().fixed_offset());
        let envelope = format!(
            "<SIF_Message xmlns=\"{}\" Version=\"{}\"><SIF_SystemControl><SIF_Header>\
             <SIF_MsgId>{}</SIF_MsgId><SIF_Timestamp>{}</SIF_Timestamp><SIF_SourceId>{}</SIF_SourceId>\
             </SIF_Header><SIF_SystemControlData><SIF_GetMessage/></SIF_SystemControlData>\
             </SIF_SystemControl></SIF_Message>",
            self.version.family().xmlns(),
            self.version,
            message_id,
            timestamp,
            self.agent_id,
        );
        OutgoingMessage::new(message_id, envelope)
    }
}

impl Dispatcher for LoggingDispatcher {
    fn pull(&self) -> Pin<Box<dyn Future<Output = sif::Result<i32>> + Send + '_>> {
        Box::pin(async move {
            let message = self.get_message();
            let response = self.exchange.post(&self.url, &message, false).await?;
            let text = String::from_utf8_lossy(&response);

            // SIF_Status code 9: no messages queued.
            if text.contains("<SIF_Code>9</SIF_Code>") {
                return Ok(-1);
            }
            if text.contains("<SIF_Error>") {
                if text.contains("push mode") {
                    return Err(SifError::PushModeExpected(text.into_owned()));
                }
                return Err(SifError::Messaging(text.into_owned()));
            }
            tracing::info!(bytes = response.len(), "Pulled message:\n{}", text);
            Ok(1)
        })
    }

    fn dispatch(&self, message: Bytes) -> Pin<Box<dyn Future<Output = sif::Result<Bytes>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(bytes = message.len(), "Delivered message:\n{}", String::from_utf8_lossy(&message));
            Ok(Bytes::from_static(b"<SIF_Ack/>"))
        })
    }
}
