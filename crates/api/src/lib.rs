//! HTTP API server with observability for the storefront checkout core.
//!
//! Provides REST endpoints for the cart, order commit, payment and review,
//! with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, DynCartStore, DynGateway};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(routes::cart::view::<S>))
        .route("/cart/items", post(routes::cart::add::<S>))
        .route(
            "/cart/items/{item_id}",
            put(routes::cart::update::<S>).delete(routes::cart::remove::<S>),
        )
        .route("/orders/preview", post(routes::orders::preview::<S>))
        .route(
            "/orders",
            post(routes::orders::commit::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route("/orders/{id}/settle", post(routes::orders::settle::<S>))
        .route("/orders/{id}/review", post(routes::orders::review::<S>))
        .route("/orders/{id}/close", post(routes::orders::close::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
