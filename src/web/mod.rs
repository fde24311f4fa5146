//! The web shell: an axum server speaking HTML fragments to HTMX.
//!
//! ```text
//! GET  /                       full page (selector, form, previous result)
//! POST /upload-and-correct/    multipart upload → result fragment
//! GET  /last-result            previous result fragment
//! GET  /last-result/download   previous transcription as texto_extraido.txt
//! GET  /health                 JSON liveness + available profiles
//! ```

pub mod routes;
pub mod state;
pub mod templates;

use crate::error::CorrectorError;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

pub use routes::router;
pub use state::AppState;

/// Bind `addr` and serve until Ctrl+C / SIGTERM.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), CorrectorError> {
    let server_err = |source| CorrectorError::Server {
        addr: addr.to_string(),
        source,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(server_err)?;
    info!("Essay corrector listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(server_err)?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, shutting down..."),
        _ = terminate => warn!("Received terminate signal, shutting down..."),
    }
}
