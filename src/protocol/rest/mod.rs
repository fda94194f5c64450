//! HTTP API Module
//!
//! Serves the statement protocol under `/v1`. Wrong verbs on known paths are
//! answered with 405 by the method router; unknown paths with 404.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::{HttpConfig, QueryConfig};
use crate::protocol::Handler;

use self::handlers::{admin, statement, UriBase};

/// Creates the Axum router
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    };

    let uri_base = UriBase::new(config.public_url.as_deref(), &config.bind_address());

    let mut app = Router::new()
        .route("/v1/statement", post(statement::submit_statement))
        .route("/v1/status/:id", get(statement::statement_status))
        .route("/v1/status/:id/:token", get(statement::statement_page))
        .route("/v1/cancel/:id", delete(statement::cancel_statement))
        .route("/v1/empty", get(admin::empty))
        .route("/v1/info", get(admin::info))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(uri_base))
        .layer(Extension(handler));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM to trigger graceful shutdown.
/// On shutdown: stops accepting connections, stops the result reaper, and
/// cancels every in-flight statement via `handler.shutdown()`.
pub async fn start_http_server(
    handler: Arc<Handler>,
    http: &HttpConfig,
    query: &QueryConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(handler.clone(), http);

    // Cancellation channel for the result reaper
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    if let Some(period) = query.reaper_interval() {
        let reaper_handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        reaper_handler.reap_finished();
                    }
                    _ = shutdown_rx.changed() => {
                        info!("result_reaper_stopped");
                        break;
                    }
                }
            }
        });
    }

    let addr: SocketAddr = http.bind_address().parse()?;

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(address = %addr, "http_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal reaper to stop
    let _ = shutdown_tx.send(true);

    handler.shutdown().await;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => info!("received_sigint"),
                    _ = sigterm.recv() => info!("received_sigterm"),
                }
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                ctrl_c.await;
                info!("received_sigint");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received_sigint");
    }
}
