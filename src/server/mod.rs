//! Protocol surface lifecycle.

mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway::Gateway;

pub use router::build_router;

/// Bind the transport, serve until `shutdown` fires, then run the drain
/// path: new admissions are rejected, in-flight calls finish or abort, and
/// every session is closed before this returns.
pub async fn run_server(
    gateway: Arc<Gateway>,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    crate::metrics::register_metrics();
    gateway.start().await;

    let app = router::build_router(Arc::clone(&gateway));
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local = listener.local_addr().context("listener has no local addr")?;
    info!(addr = %local, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    gateway.stop().await;
    Ok(())
}
