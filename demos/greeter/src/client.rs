//! Greeter client.
//!
//! Connects with a handshake query, sends a few greetings and prints the
//! replies.

mod protocol;

use clap::Parser;
use protocol::{Greeting, Rejected, Reply};
use std::path::PathBuf;
use std::time::Duration;
use tether_client::{BasicQuery, SendError, Socket, SocketConfig, WebSocketTransport};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "tether greeter demo client")]
struct Args {
    /// Server address.
    #[arg(long, default_value = "ws://localhost:8001/", env = "GREETER_URL")]
    url: String,
    /// Client id sent in the handshake.
    #[arg(long, default_value = "client-1")]
    id: String,
    /// Display name sent in the handshake.
    #[arg(long, default_value = "anonymous")]
    name: String,
    /// Number of greetings to send.
    #[arg(long, default_value_t = 3)]
    count: u32,
    /// Socket config (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("greeter_client=info".parse()?)
                .add_directive("tether_client=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SocketConfig::load(path)?,
        None => SocketConfig::default(),
    };

    let socket = Socket::with_config(args.url.as_str(), WebSocketTransport::new(), config);

    let (tx, mut replies) = mpsc::unbounded_channel();
    socket.on(move |reply: Reply| {
        let _ = tx.send(reply);
    });
    socket.on(|rejected: Rejected| {
        tracing::warn!("Server rejected a frame: {}", rejected.reason);
    });
    socket.on_message_error(|e| tracing::warn!("Receive failed: {}", e));
    socket.on_ping_error(|e| tracing::warn!("Server did not answer ping: {}", e));

    let query = BasicQuery::new(args.id.parse()?).with("name", args.name.as_str());
    socket.connect(&query).await?;

    for i in 1..=args.count {
        let greeting = Greeting {
            text: format!("greeting #{i}"),
        };
        socket.send(
            &greeting,
            Some(Box::new(move |result: Result<(), SendError>| {
                if let Err(e) = result {
                    tracing::warn!("Greeting #{} not sent: {}", i, e);
                }
            })),
        );
    }

    for _ in 0..args.count {
        match tokio::time::timeout(Duration::from_secs(5), replies.recv()).await {
            Ok(Some(reply)) => tracing::info!("[{}] {}", reply.seq, reply.text),
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("Timed out waiting for a reply");
                break;
            }
        }
    }

    socket.disconnect().await;
    Ok(())
}
