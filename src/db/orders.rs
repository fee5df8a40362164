use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::domain::aggregates::{ItemSnapshot, Order, OrderItem, OrderStatus};
use crate::domain::events::{NewOrderEvent, OrderEvent};
use crate::error::Result;

/// Insert payload for a fresh order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub contact_email: Option<String>,
    pub actor_key: String,
    pub idempotency_key: Option<String>,
    pub cart_id: Option<Uuid>,
    pub currency: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
}

pub async fn get_order<'e>(db: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(db).await?)
}

/// Exclusive row lock held until the surrounding transaction ends.
pub async fn lock_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut *conn).await?)
}

pub async fn find_by_idempotency<'e>(db: impl PgExecutor<'e>, actor_key: &str, key: &str) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE actor_key = $1 AND idempotency_key = $2")
        .bind(actor_key).bind(key).fetch_optional(db).await?)
}

/// Plain insert; a unique violation on `(actor_key, idempotency_key)` surfaces as a
/// database error for the caller to classify.
pub async fn insert_order(conn: &mut PgConnection, o: &NewOrder) -> std::result::Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, user_id, guest_email, contact_email, actor_key, idempotency_key, cart_id, status, currency, \
            subtotal_cents, shipping_cents, tax_cents, discount_cents, total_cents, refunded_cents, shipping_address, billing_address, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'created', $8, $9, $10, $11, $12, $13, 0, $14, $15, NOW(), NOW()) RETURNING *")
        .bind(o.id).bind(o.user_id).bind(&o.guest_email).bind(&o.contact_email).bind(&o.actor_key).bind(&o.idempotency_key)
        .bind(o.cart_id).bind(&o.currency).bind(o.subtotal_cents).bind(o.shipping_cents).bind(o.tax_cents)
        .bind(o.discount_cents).bind(o.total_cents).bind(&o.shipping_address).bind(&o.billing_address)
        .fetch_one(&mut *conn).await
}

pub async fn insert_items(conn: &mut PgConnection, order_id: Uuid, items: &[ItemSnapshot]) -> Result<()> {
    for it in items {
        sqlx::query("INSERT INTO order_items (id, order_id, variant_id, product_name, sku, unit_price_cents, currency, quantity, line_total_cents, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())")
            .bind(Uuid::now_v7()).bind(order_id).bind(it.variant_id).bind(&it.product_name).bind(&it.sku)
            .bind(it.unit_price_cents).bind(&it.currency).bind(it.quantity).bind(it.line_total_cents)
            .execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn list_items<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Vec<OrderItem>> {
    Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id).fetch_all(db).await?)
}

/// Optimistic guard: moves the order only if it is still in `from`. Returns whether a row moved.
pub async fn update_status_guarded(conn: &mut PgConnection, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool> {
    let res = sqlx::query("UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2")
        .bind(id).bind(from.as_str()).bind(to.as_str()).execute(&mut *conn).await?;
    Ok(res.rows_affected() == 1)
}

/// `created -> paid`; a no-op when the order already moved on.
pub async fn mark_paid_if_created(conn: &mut PgConnection, id: Uuid, paid_at: DateTime<Utc>) -> Result<bool> {
    let res = sqlx::query("UPDATE orders SET status = 'paid', paid_at = $2, updated_at = NOW() WHERE id = $1 AND status = 'created'")
        .bind(id).bind(paid_at).execute(&mut *conn).await?;
    Ok(res.rows_affected() == 1)
}

/// Writes refund totals computed under the order lock, guarded on the refunded amount read.
pub async fn apply_refund_totals(
    conn: &mut PgConnection, id: Uuid, expected_refunded: i64, refunded_cents: i64, status: OrderStatus, refunded_at: Option<DateTime<Utc>>,
) -> Result<bool> {
    let res = sqlx::query("UPDATE orders SET refunded_cents = $3, status = $4, refunded_at = COALESCE($5, refunded_at), updated_at = NOW() \
                           WHERE id = $1 AND refunded_cents = $2 AND $3 <= total_cents")
        .bind(id).bind(expected_refunded).bind(refunded_cents).bind(status.as_str()).bind(refunded_at)
        .execute(&mut *conn).await?;
    Ok(res.rows_affected() == 1)
}

pub async fn insert_event(conn: &mut PgConnection, ev: &NewOrderEvent) -> Result<()> {
    sqlx::query("INSERT INTO order_events (id, order_id, actor_user_id, action, from_status, to_status, note, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())")
        .bind(Uuid::now_v7()).bind(ev.order_id).bind(ev.actor_user_id).bind(ev.action).bind(ev.from_status).bind(ev.to_status).bind(&ev.note)
        .execute(&mut *conn).await?;
    Ok(())
}

pub async fn list_events<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Vec<OrderEvent>> {
    Ok(sqlx::query_as::<_, OrderEvent>("SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id).fetch_all(db).await?)
}
