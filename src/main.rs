use std::env;
use std::sync::Arc;

use qissy::logging::init_logger;
use qissy::server::{AppState, build_router};
use qissy::{PortalClient, PortalConfig};

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger(env::var("QISSY_VERBOSE").is_ok());

    let config = PortalConfig::load("config.json")?;
    let client = PortalClient::new(config)?.with_span(tracing::info_span!("portal"));
    let app = build_router(Arc::new(AppState::new(client)));

    let port = env::var("QISSY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "qissy listening");

    axum::serve(listener, app).await?;
    Ok(())
}
