//! Local HTTP shell for payment-link checkout.
//!
//! Exposes the payment session and the return-flow reconciler over REST,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use draft_store::{DraftStore, FileDraftStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{HttpOrderBackend, HttpPaymentGateway, OrderBackend, PaymentGateway};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;
use routes::checkout::AppState;

/// State backed by the HTTP clients and the file draft store.
pub type DefaultState = AppState<HttpPaymentGateway, HttpOrderBackend, FileDraftStore>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G, O, D>(state: Arc<AppState<G, O, D>>, metrics_handle: PrometheusHandle) -> Router
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::start::<G, O, D>))
        .route("/checkout", get(routes::checkout::status::<G, O, D>))
        .route("/checkout/pay", post(routes::checkout::pay::<G, O, D>))
        .route("/checkout/cancel", post(routes::checkout::cancel::<G, O, D>))
        .route("/checkout/return", get(routes::checkout::return_flow::<G, O, D>))
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

/// Creates application state from the given collaborators.
pub fn create_state<G, O, D>(
    gateway: G,
    orders: O,
    drafts: D,
    config: &Config,
) -> Arc<AppState<G, O, D>>
where
    G: PaymentGateway + Clone,
    O: OrderBackend + Clone,
    D: DraftStore + Clone,
{
    Arc::new(AppState::new(gateway, orders, drafts, config.session_config()))
}

/// Creates the default state: HTTP clients for the gateway and order backend
/// and a draft file at `config.draft_path`.
pub fn create_default_state(config: &Config) -> Result<Arc<DefaultState>, ApiError> {
    let timeout = Duration::from_secs(config.query_timeout_secs.max(1));
    let gateway = HttpPaymentGateway::new(config.gateway_url.as_str(), timeout)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let orders = HttpOrderBackend::new(config.order_backend_url.as_str(), timeout)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let drafts = FileDraftStore::new(config.draft_path.clone());
    Ok(create_state(gateway, orders, drafts, config))
}
