//! Payment and refund rows.

use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::domain::aggregates::{Payment, PaymentStatus, Refund};
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Clone, Debug)]
pub struct NewRefund {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub reason: Option<String>,
}

pub async fn find_payment_by_key<'e>(db: impl PgExecutor<'e>, order_id: Uuid, key: &str) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 AND idempotency_key = $2")
        .bind(order_id).bind(key).fetch_optional(db).await?)
}

/// Inserts an `initiated` payment. `None` means a row for the same key already exists.
pub async fn insert_payment(conn: &mut PgConnection, p: &NewPayment) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (id, order_id, provider, status, amount_cents, currency, idempotency_key, created_at, updated_at) \
         VALUES ($1, $2, $3, 'initiated', $4, $5, $6, NOW(), NOW()) \
         ON CONFLICT (order_id, idempotency_key) DO NOTHING RETURNING *")
        .bind(Uuid::now_v7()).bind(p.order_id).bind(&p.provider).bind(p.amount_cents).bind(&p.currency).bind(&p.idempotency_key)
        .fetch_optional(&mut *conn).await?)
}

pub async fn get_payment<'e>(db: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(db).await?)
}

pub async fn lock_payment(conn: &mut PgConnection, id: Uuid) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut *conn).await?)
}

pub async fn find_payment_by_ref<'e>(db: impl PgExecutor<'e>, provider: &str, provider_ref: &str) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE provider = $1 AND provider_ref = $2")
        .bind(provider).bind(provider_ref).fetch_optional(db).await?)
}

pub async fn latest_succeeded_payment<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 AND status = 'succeeded' ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(order_id).fetch_optional(db).await?)
}

pub async fn list_payments<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Vec<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id).fetch_all(db).await?)
}

/// Records an outcome. A `None` provider ref keeps the stored one.
pub async fn set_payment_status(
    conn: &mut PgConnection, id: Uuid, status: PaymentStatus, provider_ref: Option<&str>, error_message: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE payments SET status = $2, provider_ref = COALESCE($3, provider_ref), error_message = $4, updated_at = NOW() WHERE id = $1")
        .bind(id).bind(status.as_str()).bind(provider_ref).bind(error_message)
        .execute(&mut *conn).await?;
    Ok(())
}

pub async fn find_refund_by_key<'e>(db: impl PgExecutor<'e>, payment_id: Uuid, key: &str) -> Result<Option<Refund>> {
    Ok(sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE payment_id = $1 AND idempotency_key = $2")
        .bind(payment_id).bind(key).fetch_optional(db).await?)
}

pub async fn insert_refund(conn: &mut PgConnection, r: &NewRefund) -> Result<Option<Refund>> {
    Ok(sqlx::query_as::<_, Refund>(
        "INSERT INTO refunds (id, order_id, payment_id, provider, status, amount_cents, currency, idempotency_key, reason, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'initiated', $5, $6, $7, $8, NOW(), NOW()) \
         ON CONFLICT (payment_id, idempotency_key) DO NOTHING RETURNING *")
        .bind(Uuid::now_v7()).bind(r.order_id).bind(r.payment_id).bind(&r.provider).bind(r.amount_cents)
        .bind(&r.currency).bind(&r.idempotency_key).bind(&r.reason)
        .fetch_optional(&mut *conn).await?)
}

pub async fn lock_refund(conn: &mut PgConnection, id: Uuid) -> Result<Option<Refund>> {
    Ok(sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut *conn).await?)
}

pub async fn find_refund_by_ref<'e>(db: impl PgExecutor<'e>, provider: &str, provider_ref: &str) -> Result<Option<Refund>> {
    Ok(sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE provider = $1 AND provider_ref = $2")
        .bind(provider).bind(provider_ref).fetch_optional(db).await?)
}

pub async fn list_refunds<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Vec<Refund>> {
    Ok(sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id).fetch_all(db).await?)
}

/// Money already promised to the provider but not yet settled.
pub async fn pending_refund_total<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds WHERE order_id = $1 AND status = 'initiated'")
        .bind(order_id).fetch_one(db).await?;
    Ok(row.0)
}

pub async fn set_refund_status(
    conn: &mut PgConnection, id: Uuid, status: PaymentStatus, provider_ref: Option<&str>, error_message: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE refunds SET status = $2, provider_ref = COALESCE($3, provider_ref), error_message = $4, updated_at = NOW() WHERE id = $1")
        .bind(id).bind(status.as_str()).bind(provider_ref).bind(error_message)
        .execute(&mut *conn).await?;
    Ok(())
}
