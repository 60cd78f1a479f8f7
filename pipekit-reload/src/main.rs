//! Standalone live-reload server.
//!
//! Editors and other tools trigger reloads with `GET /changed?files=...`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use pipekit_reload::config::DEFAULT_PORT;
use pipekit_reload::{start, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "pipekit-reload", version)]
#[command(about = "Live-reload server for pipekit projects")]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    let config = ServerConfig::new()
        .with_bind_address(&cli.bind)
        .with_port(cli.port);
    let mut server = start(&config)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;

    tokio::select! {
        joined = &mut server.task => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!(clients = server.handle.clients(), "shutting down");
            server.task.abort();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_is_parsed_by_clap() {
        let cli = Cli::try_parse_from(["pipekit-reload", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, Level::DEBUG);
        assert_eq!(cli.port, DEFAULT_PORT);

        assert!(Cli::try_parse_from(["pipekit-reload", "--log-level", "loud"]).is_err());
    }
}
