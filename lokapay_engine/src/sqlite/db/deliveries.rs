use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewDelivery, WebhookDelivery},
    traits::PaymentEngineError,
};

pub async fn insert_delivery(
    delivery: NewDelivery,
    conn: &mut SqliteConnection,
) -> Result<WebhookDelivery, PaymentEngineError> {
    let delivery = sqlx::query_as(
        r#"
            INSERT INTO webhook_deliveries (
                event_id,
                event_type,
                payload,
                target_url,
                max_attempts
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(delivery.event_id)
    .bind(delivery.event_type)
    .bind(delivery.payload)
    .bind(delivery.target_url)
    .bind(delivery.max_attempts)
    .fetch_one(conn)
    .await?;
    Ok(delivery)
}

pub async fn fetch_delivery(id: i64, conn: &mut SqliteConnection) -> Result<Option<WebhookDelivery>, sqlx::Error> {
    let delivery =
        sqlx::query_as("SELECT * FROM webhook_deliveries WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(delivery)
}

pub async fn fetch_for_event(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
    let deliveries = sqlx::query_as("SELECT * FROM webhook_deliveries WHERE event_id = $1 ORDER BY id ASC")
        .bind(event_id)
        .fetch_all(conn)
        .await?;
    Ok(deliveries)
}

/// The retry sweep's work list: pending rows whose retry time has passed and that still have
/// attempts left.
pub async fn fetch_due(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
    let deliveries = sqlx::query_as(
        r#"
            SELECT * FROM webhook_deliveries
            WHERE status = 'pending'
                AND next_retry_at IS NOT NULL
                AND unixepoch(next_retry_at) <= unixepoch($1)
                AND attempt_count < max_attempts
            ORDER BY next_retry_at ASC;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(deliveries)
}

/// Every update below carries the `(status = 'pending', attempt_count = <observed>)` guard.
/// Two writers processing the same attempt concurrently resolve to a single winner; the loser
/// sees `None` and discards its bookkeeping.
pub async fn mark_delivered(
    id: i64,
    observed_attempts: i64,
    http_status: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE webhook_deliveries SET
                status = 'delivered',
                attempt_count = $1,
                last_status = $2,
                last_error = NULL,
                next_retry_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'pending' AND attempt_count = $4
            RETURNING *;
        "#,
    )
    .bind(observed_attempts + 1)
    .bind(http_status)
    .bind(id)
    .bind(observed_attempts)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Result of mark_delivered for #{id}: {updated:?}");
    Ok(updated)
}

pub async fn mark_retrying(
    id: i64,
    observed_attempts: i64,
    http_status: Option<i64>,
    error: &str,
    next_retry_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE webhook_deliveries SET
                attempt_count = $1,
                last_status = $2,
                last_error = $3,
                next_retry_at = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5 AND status = 'pending' AND attempt_count = $6
            RETURNING *;
        "#,
    )
    .bind(observed_attempts + 1)
    .bind(http_status)
    .bind(error)
    .bind(next_retry_at)
    .bind(id)
    .bind(observed_attempts)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

pub async fn mark_failed(
    id: i64,
    observed_attempts: i64,
    http_status: Option<i64>,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE webhook_deliveries SET
                status = 'failed',
                attempt_count = $1,
                last_status = $2,
                last_error = $3,
                next_retry_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND status = 'pending' AND attempt_count = $5
            RETURNING *;
        "#,
    )
    .bind(observed_attempts + 1)
    .bind(http_status)
    .bind(error)
    .bind(id)
    .bind(observed_attempts)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Permanently fails a delivery without recording an attempt. Used when the target endpoint has
/// been removed from configuration or disabled after the row was created.
pub async fn mark_abandoned(
    id: i64,
    observed_attempts: i64,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
    let updated = sqlx::query_as(
        r#"
            UPDATE webhook_deliveries SET
                status = 'failed',
                last_error = $1,
                next_retry_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'pending' AND attempt_count = $3
            RETURNING *;
        "#,
    )
    .bind(error)
    .bind(id)
    .bind(observed_attempts)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}
