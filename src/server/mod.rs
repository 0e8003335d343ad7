/// HTTP API for anchoring status, audit trail and record mutations.
///
/// The server shares the store with the reconciler. When the ledger client
/// failed to initialize, the server still runs; ledger-backed endpoints
/// answer 503 instead.
pub mod error;
pub mod middleware;
pub mod records;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AnchorError;
use crate::ledger::Ledger;
use crate::state::Store;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// `None` when the ledger client could not be initialized.
    pub ledger: Option<Arc<dyn Ledger>>,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::ledger_routes())
        .merge(records::record_routes())
        .with_state(Arc::new(state))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` flips to `true`.
pub async fn serve(
    state: AppState,
    addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AnchorError::Io)?;

    tracing::info!("ledger-anchor API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(AnchorError::Io)?;

    Ok(())
}
