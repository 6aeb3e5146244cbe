use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use syncpad::config::AppConfig;
use syncpad::registry::Registry;
use syncpad::{health, logging, relay};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay: accepts editor connections and fans out operations.
    Serve {
        /// Port to listen on for editor connections. Defaults to `SYNCPAD_PORT` or 8080.
        #[arg(long, env = "SYNCPAD_PORT")]
        port: Option<u16>,
        /// Address to bind to. Defaults to `SYNCPAD_BIND` or 0.0.0.0.
        #[arg(long, env = "SYNCPAD_BIND")]
        bind: Option<IpAddr>,
        /// Health endpoint port; one above `port` if unset.
        #[arg(long)]
        health_port: Option<u16>,
        /// Log at debug level regardless of `SYNCPAD_LOG`.
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind, health_port, debug } => {
            let config = AppConfig::from_env().with_overrides(port, bind, debug);
            logging::initialize(&config.log_level);

            let addr = SocketAddr::new(config.bind, config.port);
            let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
            info!(%addr, "relay listening");

            let health_addr = SocketAddr::new(config.bind, health_port.unwrap_or(config.port + 1));
            let health_listener = TcpListener::bind(health_addr)
                .await
                .with_context(|| format!("failed to bind health listener on {health_addr}"))?;
            info!(%health_addr, "health endpoint listening");

            let registry = Arc::new(Registry::new());
            let cors_origin: Arc<str> = Arc::from(config.cors_origin.as_str());

            let health_registry = Arc::clone(&registry);
            tokio::spawn(async move {
                health::serve(health_listener, health_registry, cors_origin).await;
            });

            accept_loop(listener, registry).await
        }
    }
}

async fn accept_loop(listener: TcpListener, registry: Arc<Registry>) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted.context("failed to accept connection")?;
                info!(%addr, "connection accepted");
                let registry = Arc::clone(&registry);
                tokio::spawn(relay::handle_connection(stream, registry));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down on ctrl-c");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
