use axum::Router;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Binds `addr` and serves `router` until the token is cancelled. One
/// accept loop per channel instance.
pub async fn serve(
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    token: CancellationToken,
) -> Result<(), anyhow::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(server = name, %addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!(server = name, "stopped");
    Ok(())
}
