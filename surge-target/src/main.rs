use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use surge_target::config::DEFAULT_ADDRESS;
use surge_target::{Server, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "surge-target", about = "Reference transaction-validation service")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: SocketAddr,

    /// Extra latency added to every validate call, e.g. "50ms"
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    latency: Duration,

    /// Answer every Nth validate call with a 500
    #[arg(long)]
    failure_every: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();

    let args = Args::parse();

    let config = ServerConfig {
        address: args.address,
        latency: args.latency,
        failure_every: args.failure_every,
    };

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    // Print "Listening on <addr>" once the server signals it is bound.
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            println!("Listening on {}", addr);
        }
    });

    Server::new(config).run(ready_tx).await?;
    Ok(())
}
