use chrono::Duration;
use log::debug;
use lokapay_common::TxId;
use sqlx::SqliteConnection;

use crate::traits::PaymentEngineError;

/// Records an inbound callback event key. `INSERT OR IGNORE` against the UNIQUE key makes this
/// the persistent replay filter: `true` means the key is new, `false` means this event has been
/// seen before (possibly in an earlier process lifetime).
pub async fn record_event(
    event_key: &str,
    tx_id: &TxId,
    gateway: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentEngineError> {
    let result = sqlx::query("INSERT OR IGNORE INTO callback_events (event_key, tx_id, gateway) VALUES ($1, $2, $3)")
        .bind(event_key)
        .bind(tx_id.as_str())
        .bind(gateway)
        .execute(conn)
        .await?;
    let is_new = result.rows_affected() > 0;
    if !is_new {
        debug!("🗃️ Callback event {event_key} has been seen before");
    }
    Ok(is_new)
}

/// Deletes dedupe rows older than the retention window. Providers stop retrying callbacks long
/// before the window lapses, so purged keys can no longer be replayed.
pub async fn purge_older_than(retention: Duration, conn: &mut SqliteConnection) -> Result<u64, PaymentEngineError> {
    let result = sqlx::query(
        format!(
            "DELETE FROM callback_events WHERE (unixepoch(CURRENT_TIMESTAMP) - unixepoch(received_at)) > {}",
            retention.num_seconds()
        )
        .as_str(),
    )
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
