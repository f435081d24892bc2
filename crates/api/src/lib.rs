//! HTTP API server with observability for the inventory and order engine.
//!
//! Provides REST endpoints for checkout, order lifecycle, payments and stock
//! adjustments, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use audit::{AuditDispatcher, TracingAuditSink};
use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CatalogService, CheckoutOrchestrator, InMemoryCatalog, InMemoryPaymentProvider, PaymentError,
    PaymentRegistry, PaymentService,
};
use domain::{InventoryLedger, OrderStateMachine};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{Store, TransactionCoordinator};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Payment providers this binary ships with. `PAYMENT_PROVIDERS` picks which
/// of them are enabled.
pub const BUILTIN_PAYMENT_PROVIDERS: [&str; 2] = ["card", "wallet"];

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub ledger: InventoryLedger<S>,
    pub orders: OrderStateMachine<S>,
    pub checkout: CheckoutOrchestrator<S>,
    pub payments: PaymentService<S>,
}

/// External systems the engine talks to.
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogService>,
    pub payments: PaymentRegistry,
    pub audit: AuditDispatcher,
}

/// Wires the engine services over one store.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
    collaborators: Collaborators,
) -> Arc<AppState<S>> {
    let coordinator = TransactionCoordinator::with_retry(store, config.retry_config());
    let Collaborators {
        catalog,
        payments,
        audit,
    } = collaborators;

    let orders = OrderStateMachine::new(coordinator.clone(), audit.clone())
        .with_restock_policy(config.restock_policy());

    Arc::new(AppState {
        ledger: InventoryLedger::new(coordinator.clone(), audit.clone()),
        checkout: CheckoutOrchestrator::new(coordinator, catalog, config.pricing_policy(), audit),
        payments: PaymentService::new(payments, orders.clone()),
        orders,
    })
}

/// State built with the in-process collaborators, plus handles to them so
/// callers can seed the catalog or drive payments.
pub struct DefaultState<S> {
    pub state: Arc<AppState<S>>,
    pub catalog: InMemoryCatalog,
    pub providers: Vec<InMemoryPaymentProvider>,
    /// Finishes once `state` and everything cloned from it are dropped and
    /// the queued audit records are written.
    pub audit_worker: JoinHandle<()>,
}

/// Creates the application state with the in-memory catalog, the built-in
/// payment providers and a tracing audit sink.
///
/// Must be called inside a Tokio runtime; the audit worker is spawned here.
/// Fails if `PAYMENT_PROVIDERS` names a provider that is not built in.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
) -> Result<DefaultState<S>, PaymentError> {
    let catalog = InMemoryCatalog::new();
    let providers: Vec<_> = BUILTIN_PAYMENT_PROVIDERS
        .into_iter()
        .map(InMemoryPaymentProvider::new)
        .collect();

    let registry = providers
        .iter()
        .fold(PaymentRegistry::builder(), |builder, provider| {
            builder.register(Arc::new(provider.clone()))
        })
        .enable_all(config.payment_providers.iter().cloned())
        .build()?;

    let (audit, audit_worker) =
        AuditDispatcher::spawn(Arc::new(TracingAuditSink), config.audit_buffer);

    let state = create_state(
        store,
        config,
        Collaborators {
            catalog: Arc::new(catalog.clone()),
            payments: registry,
            audit,
        },
    );

    Ok(DefaultState {
        state,
        catalog,
        providers,
        audit_worker,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route("/orders/{id}/transition", post(routes::orders::transition::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/payments/{provider}",
            post(routes::payments::initiate::<S>),
        )
        .route(
            "/orders/{id}/payments/{provider}/confirm",
            post(routes::payments::confirm::<S>),
        )
        .route(
            "/orders/{id}/payments/{provider}/refund",
            post(routes::payments::refund::<S>),
        )
        .route(
            "/inventory/availability",
            post(routes::inventory::availability::<S>),
        )
        .route("/inventory/{product_id}", get(routes::inventory::get::<S>))
        .route(
            "/inventory/{product_id}/restock",
            post(routes::inventory::restock::<S>),
        )
        .route(
            "/inventory/{product_id}/remove",
            post(routes::inventory::remove::<S>),
        )
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
