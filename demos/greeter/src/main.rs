//! Greeter server.
//!
//! Answers every `greeting` envelope with a `reply` envelope addressed to
//! the name the client sent in its handshake query.
//!
//! Run the server, then a client:
//!   cargo run --bin greeter-server -- --port 8001
//!   cargo run --bin greeter-client -- --url ws://localhost:8001/ --name Ken

mod protocol;
mod server;

use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "tether greeter demo server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8001, env = "GREETER_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("greeter_server=info".parse()?))
        .init();

    let args = Args::parse();
    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();

    tracing::info!("Starting greeter on {}", addr);
    server::run(addr).await
}
