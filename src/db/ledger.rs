//! Append-only financial ledger.

use sqlx::{PgConnection, PgExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::domain::events::{net_settled, FinancialEntry, NewFinancialEntry};
use crate::error::Result;

/// Inserts the entry unless one already exists for `(ref_type, ref_id, event)`.
/// Returns `true` when a new row was written.
pub async fn ensure_entry(conn: &mut PgConnection, e: &NewFinancialEntry) -> Result<bool> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM financial_entries WHERE ref_type = $1 AND ref_id = $2 AND event = $3")
        .bind(e.ref_type.as_str()).bind(e.ref_id).bind(e.event.as_str()).fetch_optional(&mut *conn).await?;
    if existing.is_some() {
        debug!(ref_id = %e.ref_id, event = e.event.as_str(), "ledger entry already present");
        return Ok(false);
    }
    let res = sqlx::query("INSERT INTO financial_entries (id, order_id, event, amount_cents, currency, ref_type, ref_id, created_at) \
                           VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) ON CONFLICT (ref_type, ref_id, event) DO NOTHING")
        .bind(Uuid::now_v7()).bind(e.order_id).bind(e.event.as_str()).bind(e.amount_cents).bind(&e.currency)
        .bind(e.ref_type.as_str()).bind(e.ref_id)
        .execute(&mut *conn).await?;
    Ok(res.rows_affected() == 1)
}

pub async fn list_for_order<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<Vec<FinancialEntry>> {
    Ok(sqlx::query_as::<_, FinancialEntry>("SELECT * FROM financial_entries WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id).fetch_all(db).await?)
}

pub async fn net_for_order<'e>(db: impl PgExecutor<'e>, order_id: Uuid) -> Result<i64> {
    Ok(net_settled(&list_for_order(db, order_id).await?))
}
