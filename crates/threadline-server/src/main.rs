//! Threadline service entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use threadline_conversation::generation::EchoGenerator;
use threadline_core::clock::SystemClock;
use threadline_core::ids::RandomIds;
use threadline_core::repository::{DomainRepository, OutboxStore};
use threadline_server::bus::RedisPublisher;
use threadline_server::config::{AppConfig, StoreBackend};
use threadline_server::error::AppError;
use threadline_server::routes;
use threadline_server::runtime::{Runtime, RuntimeDeps};
use threadline_server::telemetry;
use threadline_store::{MemoryDomainRepository, PgDomainRepository};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Threadline service");

    let (repository, outbox_store): (Arc<dyn DomainRepository>, Arc<dyn OutboxStore>) =
        match &config.store {
            StoreBackend::Postgres {
                url,
                max_connections,
            } => {
                let pool = PgPoolOptions::new()
                    .max_connections(*max_connections)
                    .connect(url)
                    .await?;
                let store = Arc::new(PgDomainRepository::new(pool));
                store.ensure_schema().await?;
                let repository: Arc<dyn DomainRepository> = store.clone();
                let outbox_store: Arc<dyn OutboxStore> = store;
                (repository, outbox_store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store; state is lost on restart");
                let store = Arc::new(MemoryDomainRepository::new());
                let repository: Arc<dyn DomainRepository> = store.clone();
                let outbox_store: Arc<dyn OutboxStore> = store;
                (repository, outbox_store)
            }
        };

    let mut publisher = RedisPublisher::connect(&config.redis_url)?;
    if config.require_subscribers {
        publisher = publisher.require_receivers([
            config.topics.outbox.clone(),
            config.topics.domain_changes.clone(),
        ]);
    }

    let runtime = Runtime::start(
        &config,
        RuntimeDeps {
            repository,
            outbox_store,
            publisher: Arc::new(publisher),
            generator: Arc::new(EchoGenerator),
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
        },
    );

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::router(runtime.state())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
