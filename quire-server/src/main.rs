//! quire-server: realtime gateway and REST endpoint in one process.
//!
//! Configured through `QUIRE_*` environment variables; see
//! `quire_collab::config` for the full list. `RUST_LOG` controls verbosity.

use std::process::ExitCode;

use log::{error, info};
use quire_collab::{ServerConfig, SyncServer};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    info!(
        "Starting quire-server (realtime {}, REST {})",
        config.bind_addr, config.http_addr
    );

    let server = match SyncServer::open(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {e}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    ExitCode::SUCCESS
}
