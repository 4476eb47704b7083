use drainwatch::config::Config;
use drainwatch::host;
use drainwatch::server::{create_metrics, wait_for_signal};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        base_url = %config.base_url,
        "Starting drainwatch"
    );

    let metrics = create_metrics()?;
    let listener = TcpListener::bind(config.bind_addr).await?;

    host::run(&config, listener, metrics, wait_for_signal()).await?;

    info!("drainwatch shut down gracefully");
    Ok(())
}
