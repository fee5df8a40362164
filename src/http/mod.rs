//! JSON API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::provider::PaymentProvider;
use crate::services::{
    Notifier, OrderAdminService, OrderService, PaymentService, RefundService, WebhookService,
};

pub mod actor;
pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub admin: OrderAdminService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookService,
    pub providers: Arc<HashMap<String, Arc<dyn PaymentProvider>>>,
    pub base_url: String,
}

impl AppState {
    pub fn new(db: PgPool, provider: Arc<dyn PaymentProvider>, notifier: Arc<dyn Notifier>, base_url: impl Into<String>) -> Self {
        let mut providers: HashMap<String, Arc<dyn PaymentProvider>> = HashMap::new();
        providers.insert(provider.name().to_string(), provider.clone());
        Self {
            orders: OrderService::new(db.clone(), notifier.clone()),
            admin: OrderAdminService::new(db.clone()),
            payments: PaymentService::new(db.clone(), provider.clone(), notifier),
            refunds: RefundService::new(db.clone(), provider),
            webhooks: WebhookService::new(db),
            providers: Arc::new(providers),
            base_url: base_url.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/checkout", post(handlers::checkout))
        .route("/api/v1/orders/:id", get(handlers::get_order))
        .route("/api/v1/orders/:id/pay", post(handlers::pay_order))
        .route("/api/v1/admin/orders/:id", get(handlers::admin_order))
        .route("/api/v1/admin/orders/:id/:action", post(handlers::admin_action))
        .route("/webhooks/:provider", post(handlers::webhook))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}
