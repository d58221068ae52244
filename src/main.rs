//! Gateway entry point.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                   GATEWAY                     │
//!                    │                                               │
//!   Browser SPA      │  ┌────────┐   ┌─────────┐   ┌────────────┐   │
//!   ─────────────────┼─▶│  http  │──▶│  auth   │──▶│  session   │   │
//!                    │  │ server │   │ flows   │   │   store    │   │
//!                    │  └───┬────┘   └─────────┘   └────────────┘   │
//!                    │      │                                       │
//!                    │      ▼                                       │
//!                    │  ┌────────┐   ┌─────────┐                    │     Compute
//!                    │  │ proxy  │──▶│ ledger  │                    │──▶  service
//!                    │  └────────┘   └─────────┘                    │    (/api/*)
//!                    │                                               │
//!                    │  config · security · observability · lifecycle│
//!                    └──────────────────────────────────────────────┘
//! ```

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mining_gateway::lifecycle::Shutdown;
use mining_gateway::{config, observability, HttpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mining_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mining-gateway v0.1.0 starting");

    // Every configuration problem is reported in one pass
    let config = match config::loader::load_from_env() {
        Ok(config) => config,
        Err(config::ConfigError::Validation(errors)) => {
            for error in &errors {
                tracing::error!(%error, "Configuration error");
            }
            return Err("configuration invalid, refusing to start".into());
        }
    };

    tracing::info!(
        bind_address = %config.server.bind_address,
        environment = ?config.server.environment,
        upstream = %config.upstream.base_url,
        ledger = %config.ledger.path.display(),
        "Configuration loaded"
    );

    if let Some(raw) = &config.server.metrics_address {
        match raw.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %raw, "Failed to parse metrics address"),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).await?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
