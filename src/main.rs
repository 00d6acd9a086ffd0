use smslog::app::{build_app, shutdown_on};
use smslog::config::AppConfig;
use smslog::telemetry::init_tracing;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    let app = build_app(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, path = %config.server.webhook_path, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(signal::ctrl_c()))
        .await?;
    Ok(())
}
