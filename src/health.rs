use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tracing::info;

/// Tiny liveness server so container platforms see the bot as healthy while
/// long polling runs in the foreground.
pub async fn serve(port: u16) -> Result<()> {
    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/health", get(|| async { "OK" }));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind health server on port {}", port))?;
    info!("health server listening on port {}", port);
    axum::serve(listener, app)
        .await
        .context("health server stopped")?;
    Ok(())
}
