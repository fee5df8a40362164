//! Raw webhook deliveries; `(provider, event_id)` is the dedup key.

use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::Result;

#[derive(Clone, Debug, serde::Serialize, sqlx::FromRow)]
pub struct ProviderEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub process_error: Option<String>,
}

/// Records a delivery. Returns the row id when the event still needs processing, `None`
/// when it was already processed. Re-deliveries of unprocessed events return the row again.
pub async fn record_event(
    conn: &mut PgConnection, provider: &str, event_id: &str, event_type: &str, payload: &serde_json::Value,
) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "INSERT INTO provider_events (id, provider, event_id, event_type, payload, received_at) VALUES ($1, $2, $3, $4, $5, NOW()) \
         ON CONFLICT (provider, event_id) DO UPDATE SET received_at = EXCLUDED.received_at \
         WHERE provider_events.processed_at IS NULL RETURNING id")
        .bind(Uuid::now_v7()).bind(provider).bind(event_id).bind(event_type).bind(payload)
        .fetch_optional(&mut *conn).await?;
    Ok(row.map(|r| r.0))
}

pub async fn mark_processed(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE provider_events SET processed_at = NOW(), process_error = NULL WHERE id = $1").bind(id).execute(&mut *conn).await?;
    Ok(())
}

/// Stores the apply error outside the failed transaction; the row stays unprocessed.
pub async fn record_failure<'e>(
    db: impl PgExecutor<'e>, provider: &str, event_id: &str, event_type: &str, payload: &serde_json::Value, error: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO provider_events (id, provider, event_id, event_type, payload, received_at, process_error) VALUES ($1, $2, $3, $4, $5, NOW(), $6) \
         ON CONFLICT (provider, event_id) DO UPDATE SET process_error = EXCLUDED.process_error WHERE provider_events.processed_at IS NULL")
        .bind(Uuid::now_v7()).bind(provider).bind(event_id).bind(event_type).bind(payload).bind(error)
        .execute(db).await?;
    Ok(())
}

pub async fn get_event<'e>(db: impl PgExecutor<'e>, provider: &str, event_id: &str) -> Result<Option<ProviderEvent>> {
    Ok(sqlx::query_as::<_, ProviderEvent>("SELECT * FROM provider_events WHERE provider = $1 AND event_id = $2")
        .bind(provider).bind(event_id).fetch_optional(db).await?)
}
