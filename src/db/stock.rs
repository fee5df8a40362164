//! Row-locked stock deduction.

use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::retry_transient;
use crate::domain::aggregates::product::{normalize_lines, shortfalls};
use crate::domain::aggregates::{StockLine, VariantStock};
use crate::error::{CommerceError, OutOfStockItem, Result};

/// Deducts stock for every line inside the caller's transaction. Either every line is
/// deducted or none is; all shortfalls are reported together.
#[instrument(skip(conn, lines), fields(lines = lines.len()))]
pub async fn deduct_stock_in_tx(conn: &mut PgConnection, lines: &[StockLine]) -> Result<()> {
    let want = normalize_lines(lines);
    if want.is_empty() { return Ok(()); }
    let ids: Vec<Uuid> = want.iter().map(|l| l.variant_id).collect();

    // ORDER BY id keeps lock acquisition deterministic across concurrent checkouts
    let locked = sqlx::query_as::<_, VariantStock>("SELECT id, stock FROM product_variants WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&ids).fetch_all(&mut *conn).await?;

    let short = shortfalls(&want, &locked);
    if !short.is_empty() {
        return Err(CommerceError::OutOfStock { items: short });
    }

    for line in &want {
        let res = sqlx::query("UPDATE product_variants SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2")
            .bind(line.variant_id).bind(line.quantity).execute(&mut *conn).await?;
        if res.rows_affected() != 1 {
            let available = locked.iter().find(|v| v.id == line.variant_id).map_or(0, |v| v.stock);
            return Err(CommerceError::OutOfStock {
                items: vec![OutOfStockItem { variant_id: line.variant_id, requested: line.quantity, available }],
            });
        }
        debug!(variant_id = %line.variant_id, qty = line.quantity, "stock deducted");
    }
    Ok(())
}

/// Standalone deduction in its own transaction, retried on transient lock errors.
pub async fn deduct_stock(pool: &PgPool, lines: &[StockLine]) -> Result<()> {
    retry_transient(|| async move {
        let mut tx = pool.begin().await?;
        deduct_stock_in_tx(&mut tx, lines).await?;
        tx.commit().await?;
        Ok(())
    }).await
}

pub async fn current_stock(pool: &PgPool, variant_id: Uuid) -> Result<Option<i32>> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT stock FROM product_variants WHERE id = $1")
        .bind(variant_id).fetch_optional(pool).await?;
    Ok(row.map(|r| r.0))
}
