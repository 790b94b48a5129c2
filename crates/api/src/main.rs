//! API server entry point.

use std::sync::Arc;

use api::shutdown::{self, ShutdownTrigger};
use api::{AppState, Config, DynCartStore, DynGateway};
use cart::{InMemoryCartStore, RedisCartStore};
use checkout::ScriptedGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, OrderStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DB_MAX_CONNECTIONS: u32 = 10;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Stops in-flight settlement loops once a signal arrives, then lets axum
/// drain the remaining requests.
async fn shutdown_and_notify(trigger: ShutdownTrigger) {
    shutdown_signal().await;
    trigger.trigger();
}

async fn serve<S>(
    config: &Config,
    store: S,
    carts: DynCartStore,
    gateway: DynGateway,
    metrics_handle: PrometheusHandle,
) where
    S: OrderStore + Clone + 'static,
{
    let (trigger, shutdown) = shutdown::channel();
    let state = Arc::new(AppState::new(config, store, carts, gateway, shutdown));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_and_notify(trigger))
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Cart store and payment gateway
    let carts: DynCartStore = match &config.redis_url {
        Some(url) => {
            tracing::info!("using Redis cart store");
            Arc::new(
                RedisCartStore::connect(url)
                    .await
                    .expect("failed to connect to Redis"),
            )
        }
        None => {
            tracing::warn!("REDIS_URL not set, carts are kept in memory");
            Arc::new(InMemoryCartStore::new())
        }
    };
    tracing::warn!(base_url = %config.gateway_base_url, "using sandbox payment gateway");
    let gateway: DynGateway = Arc::new(ScriptedGateway::new(config.gateway_base_url.clone()));

    // 4. Order store, then serve until shutdown
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, DB_MAX_CONNECTIONS)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(&config, store.clone(), carts, gateway, metrics_handle).await;
            store.close().await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders and catalog are kept in memory");
            serve(&config, InMemoryStore::new(), carts, gateway, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
