// Shared fixtures for the database-backed tests. Every test skips when DATABASE_URL is unset.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use storefront_engine::domain::value_objects::{IdempotencyKey, OrderOwner};
use storefront_engine::provider::{
    CreatePaymentRequest, CreatePaymentResponse, MockMode, MockProvider, PaymentProvider, ProviderError,
    RefundRequest, RefundResponse, WebhookEvent,
};
use storefront_engine::services::{
    CreateOrderRequest, LogNotifier, OrderAdminService, OrderService, PayOrderRequest, PaymentService,
    RefundService, WebhookService,
};

static TRACING: Once = Once::new();

pub fn setup_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
            .with_test_writer()
            .try_init();
    });
}

pub async fn test_pool() -> Option<PgPool> {
    setup_tracing();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(20).connect(&url).await.expect("connect to test database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    Some(pool)
}

pub struct Harness {
    pub pool: PgPool,
    pub provider: Arc<MockProvider>,
    pub orders: OrderService,
    pub admin: OrderAdminService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookService,
}

impl Harness {
    pub fn new(pool: &PgPool, mode: MockMode) -> Self {
        Self::with_provider(pool, Arc::new(MockProvider::new("mock", "whsec_test", mode)))
    }

    pub fn with_provider(pool: &PgPool, provider: Arc<MockProvider>) -> Self {
        let dyn_provider: Arc<dyn PaymentProvider> = provider.clone();
        Self::build(pool, provider, dyn_provider)
    }

    fn build(pool: &PgPool, provider: Arc<MockProvider>, dyn_provider: Arc<dyn PaymentProvider>) -> Self {
        let notifier = Arc::new(LogNotifier);
        Self {
            pool: pool.clone(),
            provider,
            orders: OrderService::new(pool.clone(), notifier.clone()),
            admin: OrderAdminService::new(pool.clone()),
            payments: PaymentService::new(pool.clone(), dyn_provider.clone(), notifier),
            refunds: RefundService::new(pool.clone(), dyn_provider),
            webhooks: WebhookService::new(pool.clone()),
        }
    }

    /// Services wired to an arbitrary provider; `provider` stays the signing mock.
    pub fn with_dyn_provider(pool: &PgPool, dyn_provider: Arc<dyn PaymentProvider>) -> Self {
        Self::build(pool, Arc::new(MockProvider::new("mock", "whsec_test", MockMode::Succeeded)), dyn_provider)
    }
}

/// Active product with one variant.
pub async fn seed_variant(pool: &PgPool, price_cents: i64, currency: &str, stock: i32) -> Uuid {
    let product_id = Uuid::now_v7();
    let variant_id = Uuid::now_v7();
    sqlx::query("INSERT INTO products (id, name, status) VALUES ($1, $2, 'active')")
        .bind(product_id).bind(format!("Product {}", &product_id.simple().to_string()[..8]))
        .execute(pool).await.expect("insert product");
    sqlx::query("INSERT INTO product_variants (id, product_id, sku, price_cents, currency, stock) VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(variant_id).bind(product_id).bind(format!("SKU-{}", variant_id.simple())).bind(price_cents).bind(currency).bind(stock)
        .execute(pool).await.expect("insert variant");
    variant_id
}

pub async fn seed_cart(pool: &PgPool, user_id: Option<Uuid>, lines: &[(Uuid, i32)]) -> Uuid {
    let cart_id = Uuid::now_v7();
    sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2)").bind(cart_id).bind(user_id).execute(pool).await.expect("insert cart");
    for (variant_id, qty) in lines {
        sqlx::query("INSERT INTO cart_items (id, cart_id, variant_id, quantity) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::now_v7()).bind(cart_id).bind(variant_id).bind(qty)
            .execute(pool).await.expect("insert cart item");
    }
    cart_id
}

pub async fn stock_of(pool: &PgPool, variant_id: Uuid) -> i32 {
    storefront_engine::db::stock::current_stock(pool, variant_id).await.unwrap().expect("variant exists")
}

pub fn checkout_request(cart_id: Uuid, user_id: Uuid) -> CreateOrderRequest {
    CreateOrderRequest {
        cart_id,
        owner: OrderOwner::User(user_id),
        contact_email: Some("buyer@shop.test".into()),
        idempotency_key: None,
        shipping_cents: 0,
        tax_cents: 0,
        discount_cents: 0,
        shipping_address: serde_json::json!({"line1": "1 Main St", "city": "Springfield"}),
        billing_address: None,
    }
}

/// A `created` order owned by `user_id` with a total of `total_cents` (one variant, qty 1).
pub async fn created_order(h: &Harness, user_id: Uuid, total_cents: i64) -> Uuid {
    let variant = seed_variant(&h.pool, total_cents, "EUR", 10).await;
    let cart = seed_cart(&h.pool, Some(user_id), &[(variant, 1)]).await;
    h.orders.create_from_cart(checkout_request(cart, user_id)).await.expect("create order").order_id
}

pub fn pay_request(order_id: Uuid, user_id: Uuid, key: &str) -> PayOrderRequest {
    PayOrderRequest {
        order_id,
        actor_user_id: Some(user_id),
        idempotency_key: IdempotencyKey::new(key).unwrap(),
        return_url: "http://shop.test/return".into(),
        cancel_url: "http://shop.test/cancel".into(),
    }
}

/// A `paid` order, settled synchronously.
pub async fn paid_order(pool: &PgPool, user_id: Uuid, total_cents: i64) -> Uuid {
    let h = Harness::new(pool, MockMode::Succeeded);
    let order_id = created_order(&h, user_id, total_cents).await;
    h.payments.pay_order(pay_request(order_id, user_id, "pay-1")).await.expect("pay order");
    order_id
}

pub fn webhook_event(event_id: &str, event_type: &str, payment_ref: Option<&str>, refund_ref: Option<&str>, amount_cents: i64) -> WebhookEvent {
    WebhookEvent {
        event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        payment_ref: payment_ref.map(str::to_string),
        refund_ref: refund_ref.map(str::to_string),
        amount_cents,
        currency: "EUR".into(),
    }
}

/// Provider whose create/refund calls fail at the transport level.
pub struct UnreachableProvider;

#[async_trait]
impl PaymentProvider for UnreachableProvider {
    fn name(&self) -> &str { "mock" }

    async fn create_payment(&self, _req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ProviderError> {
        Err(ProviderError::Transport("connection reset by peer".into()))
    }

    async fn refund_payment(&self, _req: RefundRequest) -> Result<RefundResponse, ProviderError> {
        Err(ProviderError::Transport("connection reset by peer".into()))
    }

    fn verify_and_parse_webhook(&self, _headers: &HeaderMap, _body: &[u8]) -> Result<WebhookEvent, ProviderError> {
        Err(ProviderError::InvalidSignature)
    }
}
