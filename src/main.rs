use actix::prelude::*;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_service::actors::{CoordinatorActor, GetHealthMonitor, Shutdown};
use order_service::api::{self, AppState};
use order_service::config::Settings;
use order_service::domain::order::OrderService;
use order_service::messaging::{EventPublisher, InMemoryPublisher, RedpandaClient};
use order_service::metrics::Metrics;
use order_service::outbox::OutboxRelay;
use order_service::store::{InMemoryOrderStore, OrderStore, PgOrderStore};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting Order Service");

    let settings = Settings::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Store ===
    let store: Arc<dyn OrderStore> = match settings.database.url {
        Some(ref url) => {
            tracing::info!("Connecting to Postgres...");
            let pg = PgOrderStore::connect(url, settings.database.max_connections).await?;
            pg.migrate().await?;
            tracing::info!("✅ Postgres ready, migrations applied");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo inventory");
            Arc::new(InMemoryOrderStore::with_demo_inventory())
        }
    };

    // === 3. Publisher (with circuit breaker when a broker is configured) ===
    let publisher: Arc<dyn EventPublisher> = match settings.broker.brokers {
        Some(ref brokers) => Arc::new(RedpandaClient::new(
            brokers,
            settings.broker.message_timeout_ms,
            metrics.clone(),
        )?),
        None => {
            tracing::warn!("KAFKA_BROKERS not set, events are published in-process");
            Arc::new(InMemoryPublisher::new())
        }
    };

    // === 4. Service, relay and background actors ===
    let service = Arc::new(OrderService::new(store.clone(), metrics.clone()));
    let relay = Arc::new(OutboxRelay::new(
        store,
        publisher,
        metrics.clone(),
        settings.relay_config(),
    ));

    tracing::info!("Starting coordinator actor with supervision");
    let coordinator = CoordinatorActor::new(
        service.clone(),
        relay,
        metrics.clone(),
        settings.coordinator_settings(),
    )
    .start();
    let health_monitor = coordinator.send(GetHealthMonitor).await?;

    // === 5. HTTP ===
    let state = web::Data::new(AppState::new(service, health_monitor));
    let metrics_data = web::Data::new(metrics);
    let bind = settings.bind_address();
    tracing::info!(host = %bind.0, port = bind.1, "🌐 HTTP server listening");

    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics_data.clone())
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await;

    // === 6. Graceful shutdown ===
    tracing::info!("🛑 HTTP server stopped, shutting down actors");
    match coordinator.send(Shutdown).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Coordinator shutdown failed"),
        Err(e) => tracing::error!(error = %e, "Coordinator unreachable during shutdown"),
    }

    server_result?;
    tracing::info!("👋 Order Service stopped");
    Ok(())
}
