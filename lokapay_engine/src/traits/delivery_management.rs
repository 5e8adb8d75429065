use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewDelivery, WebhookDelivery},
    traits::PaymentEngineError,
};

/// Webhook delivery bookkeeping for payment-engine backends.
///
/// Every `mark_*` method is guarded on `(status = 'pending', attempt_count = <observed>)`.
/// When the retry sweep races an immediate first attempt for the same row, exactly one of the
/// two bookkeeping writes lands; the loser gets `None` back and drops its result on the floor.
#[allow(async_fn_in_trait)]
pub trait DeliveryManagement: Clone {
    /// Creates a delivery row in `pending` state with zero attempts.
    async fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery, PaymentEngineError>;

    /// Fetches a single delivery row by id.
    async fn fetch_delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, PaymentEngineError>;

    /// Fetches all delivery rows for an emitted event, oldest first.
    async fn fetch_deliveries_for_event(&self, event_id: &str) -> Result<Vec<WebhookDelivery>, PaymentEngineError>;

    /// Fetches pending deliveries whose `next_retry_at` has passed and whose attempt count is
    /// below the max, i.e. the retry sweep's work list.
    async fn fetch_due_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>, PaymentEngineError>;

    /// Records a successful attempt: `pending → delivered`, attempt count bumped, HTTP status
    /// stored. `observed_attempts` is the attempt count read before the attempt was made.
    async fn mark_delivered(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: i64,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError>;

    /// Records a failed attempt that will be retried: attempt count bumped, error and next retry
    /// time stored, status stays `pending`.
    async fn mark_retrying(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: Option<i64>,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError>;

    /// Records a terminally failed delivery: `pending → failed`, `next_retry_at` cleared so the
    /// sweep never picks the row up again.
    async fn mark_failed(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: Option<i64>,
        error: &str,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError>;

    /// Permanently fails a delivery without counting an attempt, for rows whose target endpoint
    /// has disappeared from configuration.
    async fn mark_abandoned(
        &self,
        id: i64,
        observed_attempts: i64,
        error: &str,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
}
