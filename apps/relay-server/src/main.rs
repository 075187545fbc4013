//! Sotto Relay Server
//!
//! Binary entry point: configuration, logging, the background expiry
//! sweep and the axum listener.

use tracing::info;

use relay_server::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_server=debug".parse()?)
                .add_directive("session_registry=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("Starting Sotto Relay Server");

    let config = Config::from_env()?;
    let state = AppState::new(config.clone());

    // Periodic sweep: bounded memory even for sessions nobody touches again
    let registry = state.registry.clone();
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_expired();
            if evicted > 0 {
                info!(evicted, "swept expired sessions");
            }
        }
    });

    let app = relay_server::app(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
