use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tracing::info;

/// Trivial liveness endpoint so the hosting platform's HTTP probe keeps the
/// process awake. Runs on its own task; a hung Telegram or rate-API call
/// never blocks it.
pub async fn serve(port: u16) -> Result<()> {
    let app = Router::new().route("/", get(alive));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind health endpoint on port {}", port))?;

    info!("Health endpoint listening on port {}", port);

    axum::serve(listener, app)
        .await
        .context("Health server terminated")?;

    Ok(())
}

async fn alive() -> &'static str {
    "Rate bot is alive!"
}
