//! Research server.
//!
//! Axum HTTP surface over the research pipeline: a streaming `/research`
//! endpoint plus supporting search/ingest/source/verify/worker routes.

mod config;
mod routes;
mod state;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
                format!("{level},research=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = Config::from_env()?;
    config.log_masked();

    let port = config.port;
    let state = AppState::build(config).await?;
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "research server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
