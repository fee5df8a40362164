//! Order creation from a cart, and the owner-facing order view.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::notify::{self, Notifier};
use crate::db::orders::NewOrder;
use crate::db::{carts, orders, retry_transient, stock, unique_to_none};
use crate::domain::aggregates::{Order, OrderItem, OrderTotals, PricedCart, StockLine};
use crate::domain::value_objects::{convert, IdempotencyKey, OrderOwner};
use crate::error::{CommerceError, Result};

#[derive(Clone, Debug)]
pub struct CreateOrderRequest {
    pub cart_id: Uuid,
    pub owner: OrderOwner,
    pub contact_email: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreateOrderResult {
    pub order_id: Uuid,
    pub total_cents: i64,
    pub currency: String,
    pub idempotent: bool,
}

impl CreateOrderResult {
    fn from_order(o: &Order, idempotent: bool) -> Self {
        Self { order_id: o.id, total_cents: o.total_cents, currency: o.currency.clone(), idempotent }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayTotal {
    pub currency: String,
    pub amount_cents: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub display_total: Option<DisplayTotal>,
}

enum Checkout {
    Created(Order),
    /// Same actor and key already produced an order.
    Replayed(Order),
    /// Unique violation on `(actor_key, idempotency_key)` from a different cart.
    LostRace,
}

#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self { pool, notifier }
    }

    /// Turns the cart into an order in one transaction: price snapshot, stock deduction,
    /// order and items, cart cleared. A repeated idempotency key for the same actor returns the
    /// order created first.
    #[instrument(skip(self, req), fields(cart_id = %req.cart_id))]
    pub async fn create_from_cart(&self, req: CreateOrderRequest) -> Result<CreateOrderResult> {
        if let OrderOwner::Guest(email) = &req.owner {
            if email.is_empty() {
                return Err(CommerceError::Validation("guest email is required".into()));
            }
        }
        let actor_key = req.owner.actor_key();

        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = orders::find_by_idempotency(&self.pool, &actor_key, key.as_str()).await? {
                info!(order_id = %existing.id, "order creation replayed");
                return Ok(CreateOrderResult::from_order(&existing, true));
            }
        }

        let order = match retry_transient(|| self.create_once(&req, &actor_key)).await? {
            Checkout::Created(order) => order,
            Checkout::Replayed(existing) => {
                info!(order_id = %existing.id, "order creation replayed after waiting on the cart");
                return Ok(CreateOrderResult::from_order(&existing, true));
            }
            Checkout::LostRace => {
                let key = req.idempotency_key.as_ref().map(|k| k.as_str()).unwrap_or_default();
                let existing = orders::find_by_idempotency(&self.pool, &actor_key, key).await?
                    .ok_or_else(|| CommerceError::Internal("idempotent order vanished".into()))?;
                return Ok(CreateOrderResult::from_order(&existing, true));
            }
        };

        info!(order_id = %order.id, total = order.total_cents, currency = %order.currency, "order created");
        self.send_confirmation(&order).await;
        Ok(CreateOrderResult::from_order(&order, false))
    }

    async fn create_once(&self, req: &CreateOrderRequest, actor_key: &str) -> Result<Checkout> {
        let mut tx = self.pool.begin().await?;
        let cart = carts::lock_cart(&mut tx, req.cart_id).await?.ok_or(CommerceError::CartEmpty)?;
        if let Some(cart_owner) = cart.user_id {
            if req.owner.user_id() != Some(cart_owner) {
                return Err(CommerceError::Forbidden);
            }
        }
        // a same-key checkout may have committed while we waited for the cart lock
        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = orders::find_by_idempotency(&mut *tx, actor_key, key.as_str()).await? {
                tx.commit().await?;
                return Ok(Checkout::Replayed(existing));
            }
        }

        let lines = carts::load_lines(&mut tx, cart.id).await?;
        let priced = PricedCart::from_lines(&lines)?;
        let totals = OrderTotals {
            subtotal_cents: priced.subtotal_cents,
            shipping_cents: req.shipping_cents,
            tax_cents: req.tax_cents,
            discount_cents: req.discount_cents,
        };
        let total_cents = totals.total_cents()?;

        let stock_lines: Vec<StockLine> = priced.items.iter()
            .map(|i| StockLine { variant_id: i.variant_id, quantity: i.quantity })
            .collect();
        stock::deduct_stock_in_tx(&mut tx, &stock_lines).await?;

        let new = NewOrder {
            id: Uuid::now_v7(),
            user_id: req.owner.user_id(),
            guest_email: req.owner.guest_email().map(str::to_string),
            contact_email: req.contact_email.clone().or_else(|| req.owner.guest_email().map(str::to_string)),
            actor_key: actor_key.to_string(),
            idempotency_key: req.idempotency_key.as_ref().map(|k| k.as_str().to_string()),
            cart_id: Some(cart.id),
            currency: priced.currency.clone(),
            subtotal_cents: totals.subtotal_cents,
            shipping_cents: totals.shipping_cents,
            tax_cents: totals.tax_cents,
            discount_cents: totals.discount_cents,
            total_cents,
            shipping_address: req.shipping_address.clone(),
            billing_address: req.billing_address.clone(),
        };
        let Some(order) = unique_to_none(orders::insert_order(&mut tx, &new).await)? else {
            return Ok(Checkout::LostRace);
        };
        orders::insert_items(&mut tx, order.id, &priced.items).await?;
        carts::clear_cart(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(Checkout::Created(order))
    }

    async fn send_confirmation(&self, order: &Order) {
        let Some(to) = order.contact_email.as_deref() else {
            warn!(order_id = %order.id, "order has no contact email, skipping confirmation");
            return;
        };
        match orders::list_items(&self.pool, order.id).await {
            Ok(items) => notify::spawn_enqueue(self.notifier.clone(), notify::order_confirmation(order, &items, to)),
            Err(e) => warn!(order_id = %order.id, error = %e, "could not load items for confirmation email"),
        }
    }

    /// Owner view. Missing orders and foreign orders are indistinguishable to the caller.
    pub async fn view_for_owner(&self, order_id: Uuid, actor_user_id: Option<Uuid>, display: Option<(String, Decimal)>) -> Result<OrderView> {
        let order = orders::get_order(&self.pool, order_id).await?
            .ok_or(CommerceError::OrderNotFound)
            .map_err(CommerceError::conceal_existence)?;
        order.authorize(actor_user_id)?;
        let items = orders::list_items(&self.pool, order.id).await?;
        let display_total = display.and_then(|(currency, rate)| {
            convert(order.total_cents, rate).map(|amount_cents| DisplayTotal { currency: currency.to_uppercase(), amount_cents })
        });
        Ok(OrderView { order, items, display_total })
    }
}
