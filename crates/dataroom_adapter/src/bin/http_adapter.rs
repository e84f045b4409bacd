#![forbid(unsafe_code)]

use dataroom_adapter::{http, AdapterConfig, AdapterRuntime, StoreLocation};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdapterConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_target(false)
        .init();

    let store = match &config.store {
        StoreLocation::InMemory => "in-memory".to_string(),
        StoreLocation::Sqlite(path) => path.display().to_string(),
    };
    let runtime = AdapterRuntime::from_config(&config)?.into_shared();
    let app = http::router(runtime, &config.api_prefix);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        store = %store,
        page = config.page.as_str(),
        api_prefix = %config.api_prefix,
        "dataroom_http listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("dataroom_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
}
