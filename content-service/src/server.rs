//! HTTP server with graceful shutdown

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    api,
    cache::TypeMapCache,
    config::{Config, StorageBackend},
    domain::PostTypeService,
    error::Result,
    repository::memory::{MemoryRepository, MemoryStore},
};

/// Request bodies above this size are rejected
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Build the API router on the configured storage backend
pub async fn build_router(config: &Config) -> Result<Router> {
    let cache = Arc::new(TypeMapCache::new());

    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            let store = MemoryStore::new();
            Ok(api::router(PostTypeService::new(
                Arc::new(MemoryRepository::new(store.clone())),
                Arc::new(store),
                cache,
            )))
        }
        #[cfg(feature = "database")]
        StorageBackend::Postgres => {
            use crate::repository::postgres::{PgRepository, PgTransactionManager};

            let database = config.database.as_ref().ok_or_else(|| {
                crate::error::Error::Internal(
                    "storage.backend = \"postgres\" requires a [database] section".to_string(),
                )
            })?;
            let pool = crate::database::create_pool(database).await?;
            Ok(api::router(PostTypeService::new(
                Arc::new(PgRepository::new()),
                Arc::new(PgTransactionManager::new(pool)),
                cache,
            )))
        }
        #[cfg(not(feature = "database"))]
        StorageBackend::Postgres => Err(crate::error::Error::Internal(
            "the postgres backend requires the `database` feature".to_string(),
        )),
    }
}

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Wrap the router in the middleware stack
    ///
    /// Layers apply bottom-up: panic recovery is innermost.
    pub fn with_middleware(&self, app: Router) -> Router {
        app.layer(TimeoutLayer::with_status_code(
            http::StatusCode::REQUEST_TIMEOUT,
            self.config.service.timeout(),
        ))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CatchPanicLayer::new())
    }

    /// Run the server with the given router
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!(
            backend = %self.config.storage.backend,
            timeout_secs = self.config.service.timeout_secs,
            "Starting {} on {}",
            self.config.service.name,
            addr
        );

        let app = self.with_middleware(app);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}
