use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hivekv::server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hivekv=info")),
        )
        .init();

    let config = ServerConfig::new(std::env::args()).context("failed to parse arguments")?;
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    info!(address = %server.local_addr()?, "listening");
    server.run().await;

    Ok(())
}
