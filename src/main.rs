//! CLI for PulseHub
//!
//! Subcommands:
//! - `server`: run the WebSocket server and the stale connection sweep
//! - `client`: connect with a token, subscribe, publish once and print what
//!   comes back (useful for smoke tests)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pulsehub::auth::{Policy, TokenVerifier};
use pulsehub::broker::Broker;
use pulsehub::config::{Settings, load_config_from};
use pulsehub::persistence::SledStore;
use pulsehub::supervisor::Supervisor;
use pulsehub::transport::{Gateway, WsTransport, start_websocket_server};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pulsehub")]
enum Command {
    /// Start the WebSocket server
    Server {
        /// Configuration file to load instead of `config/default`
        #[arg(long)]
        config: Option<String>,
    },
    /// Run the smoke-test client (connect, subscribe, publish, read)
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Signed token presented during the handshake
        #[arg(long)]
        token: String,
        /// Topic to subscribe and publish to
        #[arg(long, default_value = "public:chat")]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    match Command::parse() {
        Command::Server { config } => {
            let settings = match load_config_from(config.as_deref()) {
                Ok(settings) => settings,
                Err(e) => {
                    pulsehub::utils::logging::init("info");
                    error!("Failed to load configuration: {}", e);
                    return;
                }
            };
            pulsehub::utils::logging::init(&settings.logging.level);
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {}", e);
            }
        }
        Command::Client { url, token, topic } => {
            pulsehub::utils::logging::init("info");
            if let Err(e) = run_client(&url, &token, &topic).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let transport = Arc::new(WsTransport::new());
    let mut broker = Broker::new(
        Policy::new(settings.auth.private_permission.clone()),
        transport.clone(),
    );

    if settings.persistence.enabled {
        let (ttl, cap) = settings.persistence.limits();
        let store = SledStore::open(&settings.persistence.path, ttl, cap)?;
        info!(path = %settings.persistence.path, "message archive enabled");
        broker = broker.with_store(Arc::new(store));
    }
    if settings.auth.jwt_secret == "change-me" {
        warn!("auth.jwt_secret is still the default; set PULSEHUB_AUTH__JWT_SECRET");
    }

    let supervisor = Supervisor::new(
        Arc::new(broker),
        settings.broker.stale_timeout(),
        settings.broker.sweep_interval(),
    );
    tokio::spawn(supervisor.clone().run());

    let gateway = Gateway::new(
        supervisor,
        transport,
        TokenVerifier::new(&settings.auth.jwt_secret),
        settings.broker.max_connections,
    );

    tokio::select! {
        result = start_websocket_server(addr, gateway) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, token: &str, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let mut url = url::Url::parse(url)?;
    url.query_pairs_mut().append_pair("token", token);
    let (mut ws_stream, _response) = connect_async(url.as_str()).await?;

    let subscribe = json!({ "type": "subscribe", "topic": topic, "messageId": "smoke-sub" });
    ws_stream
        .send(WsMessage::Text(subscribe.to_string().into()))
        .await?;

    let publish = json!({
        "type": "publish",
        "topic": topic,
        "payload": "Hello from pulsehub client",
        "messageId": "smoke-pub",
    });
    ws_stream
        .send(WsMessage::Text(publish.to_string().into()))
        .await?;

    // Subscribe ack, our own message and the publish ack.
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(5), ws_stream.next()).await {
            Ok(Some(Ok(WsMessage::Text(incoming)))) => info!("Incoming: {incoming}"),
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) | Err(_) => break,
        }
    }

    ws_stream.close(None).await?;
    Ok(())
}
