mod config;
mod error;
mod signaling;

pub use config::*;
pub use error::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

/// Router with the relay websocket mounted at `config.ws_path`.
pub fn router(service: RelayService, config: &RelayConfig) -> Router {
    Router::new()
        .route(&config.ws_path, get(ws_handler))
        .with_state(service)
}

/// Bind `config.bind` and relay until the server fails.
pub async fn serve(config: RelayConfig) -> Result<(), RelayError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| RelayError::Bind {
            addr: config.bind,
            source,
        })?;
    serve_listener(listener, RelayService::new(), &config).await
}

pub async fn serve_listener(
    listener: TcpListener,
    service: RelayService,
    config: &RelayConfig,
) -> Result<(), RelayError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Signaling relay listening on ws://{}{}", addr, config.ws_path);
    }
    axum::serve(listener, router(service, config)).await?;
    Ok(())
}
