//! Binary entrypoint for the reqgraph HTTP server.
//!
//! Configuration comes from `REQGRAPH_*` environment variables (see
//! [`reqgraph_server::config`]); log filtering from `RUST_LOG`.

use tracing_subscriber::EnvFilter;

use reqgraph_server::config::ServerConfig;
use reqgraph_server::router::build_router;
use reqgraph_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    let state = AppState::new(&config)?;
    let app = build_router(state);

    let addr = config.addr();
    tracing::info!(
        %addr,
        db = %config.db_path.display(),
        workers = config.workers,
        "reqgraph server starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
