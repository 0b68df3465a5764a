//! Relay server binary
//!
//! Run with: screen-relay [--bind ADDR] [--max-connections N] ...
//!
//! Producers connect to `ws://HOST:PORT/ws` and send `STREAMER:<name>`,
//! viewers connect to the same endpoint and send `CLIENT`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use screen_relay::{Error, RelayServer, Result, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "screen-relay", version, about = "Relay screen streams from producers to viewers")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// WebSocket endpoint path
    #[arg(long, env = "RELAY_WS_PATH", default_value = "/ws")]
    ws_path: String,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "RELAY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Outbound queue length per connection
    #[arg(long, env = "RELAY_SEND_QUEUE", default_value_t = 256)]
    send_queue: usize,

    /// Socket write timeout in milliseconds
    #[arg(long, env = "RELAY_SEND_TIMEOUT_MS", default_value_t = 5_000)]
    send_timeout_ms: u64,

    /// Identification timeout in milliseconds (0 = wait forever)
    #[arg(long, env = "RELAY_IDENTIFY_TIMEOUT_MS", default_value_t = 0)]
    identify_timeout_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "RELAY_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let bind: SocketAddr = self
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {:?}: {}", self.bind, e)))?;

        if self.send_timeout_ms == 0 {
            return Err(Error::Config("send timeout must be greater than zero".into()));
        }

        let identify_timeout =
            (self.identify_timeout_ms > 0).then(|| Duration::from_millis(self.identify_timeout_ms));

        Ok(ServerConfig::with_addr(bind)
            .ws_path(self.ws_path)
            .max_connections(self.max_connections)
            .send_queue_capacity(self.send_queue)
            .send_timeout(Duration::from_millis(self.send_timeout_ms))
            .identify_timeout(identify_timeout))
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("screen_relay=info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let server = RelayServer::new(args.into_config()?);
    let config = server.config();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        identify_timeout_ms = config.identify_timeout.map(|t| t.as_millis() as u64),
        "Starting screen relay"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let stats = server.hub().stats().snapshot();
    tracing::info!(
        connections = stats.connections_accepted,
        frames = stats.frames_relayed,
        "Relay stopped"
    );

    Ok(())
}
