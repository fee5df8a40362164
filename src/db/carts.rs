use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::CartLine;
use crate::error::Result;

#[derive(Clone, Copy, Debug, sqlx::FromRow)]
pub struct CartHeader {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
}

/// Locks the cart row so two checkouts of the same cart serialize.
pub async fn lock_cart(conn: &mut PgConnection, cart_id: Uuid) -> Result<Option<CartHeader>> {
    Ok(sqlx::query_as::<_, CartHeader>("SELECT id, user_id FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id).fetch_optional(&mut *conn).await?)
}

/// Cart lines joined with live variant and product data; unresolved joins come back as NULLs.
pub async fn load_lines(conn: &mut PgConnection, cart_id: Uuid) -> Result<Vec<CartLine>> {
    Ok(sqlx::query_as::<_, CartLine>(
        "SELECT ci.variant_id, ci.quantity, p.name AS product_name, p.status AS product_status, \
                v.sku, v.price_cents, v.currency \
         FROM cart_items ci \
         LEFT JOIN product_variants v ON v.id = ci.variant_id \
         LEFT JOIN products p ON p.id = v.product_id \
         WHERE ci.cart_id = $1 ORDER BY ci.created_at, ci.variant_id")
        .bind(cart_id).fetch_all(&mut *conn).await?)
}

pub async fn clear_cart(conn: &mut PgConnection, cart_id: Uuid) -> Result<u64> {
    let res = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(&mut *conn).await?;
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1").bind(cart_id).execute(&mut *conn).await?;
    Ok(res.rows_affected())
}
