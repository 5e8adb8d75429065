//! The webhook dispatcher.
//!
//! [`WebhookDispatcher::emit`] fans an event out to every enabled subscriber endpoint: one
//! [`WebhookDelivery`] row per endpoint, followed by an immediate delivery attempt. Failed
//! attempts are rescheduled on the configured backoff table and picked up later by
//! [`WebhookDispatcher::process_due_retries`], which the server runs from a background worker.
//!
//! Payloads are signed with the symmetric scheme (hex HMAC-SHA256 over `{ts}.{body}`) under the
//! endpoint's shared secret, so subscribers can authenticate deliveries the same way we
//! authenticate kiospay callbacks. Subscribers are expected to dedupe on the event id; a retried
//! delivery carries the same id and payload as the original attempt.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use payment_gateways::signing::sign_payload;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db_types::{NewDelivery, WebhookDelivery},
    lpe_api::dispatch_objects::{DispatcherConfig, SubscriberEndpoint},
    traits::{DeliveryManagement, PaymentEngineError},
};

pub const SIGNATURE_HEADER: &str = "x-lokapay-signature";
pub const TIMESTAMP_HEADER: &str = "x-lokapay-timestamp";
pub const EVENT_HEADER: &str = "x-lokapay-event";

pub struct WebhookDispatcher<B> {
    db: B,
    config: DispatcherConfig,
    client: reqwest::Client,
}

impl<B: std::fmt::Debug> std::fmt::Debug for WebhookDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookDispatcher ({:?}, {} endpoints)", self.db, self.config.endpoints.len())
    }
}

impl<B> WebhookDispatcher<B>
where B: DeliveryManagement
{
    pub fn new(db: B, config: DispatcherConfig) -> Self {
        // The attempt timeout is applied per request so that client construction stays
        // infallible.
        Self { db, config, client: reqwest::Client::new() }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Fetches a single delivery row, for audits.
    pub async fn delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        self.db.fetch_delivery(id).await
    }

    /// Fetches the delivery trail of an emitted event, oldest row first.
    pub async fn deliveries_for_event(&self, event_id: &str) -> Result<Vec<WebhookDelivery>, PaymentEngineError> {
        self.db.fetch_deliveries_for_event(event_id).await
    }

    /// Emits an event to every enabled endpoint subscribed to `event_type`.
    ///
    /// A delivery row is created per endpoint before the first attempt is made, so an event is
    /// never lost between emission and delivery. Returns the rows as they stand after the
    /// immediate attempt; an event nobody subscribes to returns an empty list.
    pub async fn emit(&self, event_type: &str, data: Value) -> Result<Vec<WebhookDelivery>, PaymentEngineError> {
        let event_id = Uuid::new_v4().to_string();
        let payload = event_payload(event_type, &event_id, Utc::now(), &data)?;
        let endpoints = self.config.endpoints_for_event(event_type);
        if endpoints.is_empty() {
            debug!("📬️ No endpoints are subscribed to {event_type}. Event {event_id} has nowhere to go.");
            return Ok(Vec::new());
        }
        let mut deliveries = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let row = NewDelivery::new(
                event_id.clone(),
                event_type.to_string(),
                payload.clone(),
                endpoint.url.clone(),
                self.config.policy.max_attempts,
            );
            let row = self.db.insert_delivery(row).await?;
            let row = self.attempt_delivery(row, endpoint).await?;
            deliveries.push(row);
        }
        info!("📬️ Event {event_id} ({event_type}) dispatched to {} endpoint(s).", deliveries.len());
        Ok(deliveries)
    }

    /// One pass of the retry sweep: re-attempts every pending delivery whose `next_retry_at` has
    /// passed. A row whose endpoint has disappeared from (or been disabled in) the configuration
    /// is failed permanently. Returns the number of rows handled.
    ///
    /// Per-row errors are logged and do not stop the sweep.
    pub async fn process_due_retries(&self, now: DateTime<Utc>) -> Result<usize, PaymentEngineError> {
        let due = self.db.fetch_due_deliveries(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!("📬️ Retry sweep found {} due deliveries.", due.len());
        let mut handled = 0;
        for row in due {
            let result = match self.config.endpoint_for_url(&row.target_url) {
                Some(endpoint) if endpoint.enabled => self.attempt_delivery(row, endpoint).await.map(|_| ()),
                _ => self.abandon(row).await,
            };
            match result {
                Ok(()) => handled += 1,
                Err(e) => warn!("📬️ Retry sweep could not process a delivery. {e}"),
            }
        }
        Ok(handled)
    }

    /// Makes one delivery attempt and records its outcome against the row.
    ///
    /// The bookkeeping update is guarded on the attempt count observed before the attempt; when
    /// a concurrent writer got there first, its result stands and this attempt's is discarded.
    async fn attempt_delivery(
        &self,
        row: WebhookDelivery,
        endpoint: &SubscriberEndpoint,
    ) -> Result<WebhookDelivery, PaymentEngineError> {
        let observed = row.attempt_count;
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(endpoint.secret.reveal(), timestamp, &row.payload);
        debug!("📬️ Delivering event {} to {} (attempt {}).", row.event_id, row.target_url, observed + 1);
        let response = self
            .client
            .post(&row.target_url)
            .timeout(self.config.timeout)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(EVENT_HEADER, &row.event_id)
            .body(row.payload.clone())
            .send()
            .await;
        let updated = match response {
            Ok(resp) if resp.status().is_success() => {
                let status = i64::from(resp.status().as_u16());
                info!("📬️ Event {} delivered to {} (HTTP {status}).", row.event_id, row.target_url);
                self.db.mark_delivered(row.id, observed, status).await?
            },
            Ok(resp) => {
                let status = i64::from(resp.status().as_u16());
                self.record_failed_attempt(&row, observed, Some(status), &format!("endpoint answered HTTP {status}"))
                    .await?
            },
            Err(e) => self.record_failed_attempt(&row, observed, None, &format!("request failed: {e}")).await?,
        };
        match updated {
            Some(row) => Ok(row),
            None => {
                debug!("📬️ Delivery {} was recorded by a concurrent attempt. Keeping that result.", row.id);
                self.db.fetch_delivery(row.id).await?.ok_or(PaymentEngineError::DeliveryNotFound(row.id))
            },
        }
    }

    /// Failure bookkeeping: retire the row once the attempt budget is spent, otherwise put it
    /// back on the schedule.
    async fn record_failed_attempt(
        &self,
        row: &WebhookDelivery,
        observed: i64,
        http_status: Option<i64>,
        error: &str,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let attempts_made = observed + 1;
        if attempts_made >= row.max_attempts {
            warn!(
                "📬️ Event {} to {} failed permanently after {attempts_made} attempt(s). {error}",
                row.event_id, row.target_url
            );
            self.db.mark_failed(row.id, observed, http_status, error).await
        } else {
            let next_retry_at = Utc::now() + self.config.policy.delay_for(attempts_made);
            debug!(
                "📬️ Event {} to {} failed attempt {attempts_made} ({error}). Retrying after {next_retry_at}.",
                row.event_id, row.target_url
            );
            self.db.mark_retrying(row.id, observed, http_status, error, next_retry_at).await
        }
    }

    async fn abandon(&self, row: WebhookDelivery) -> Result<(), PaymentEngineError> {
        warn!(
            "📬️ Endpoint {} is no longer configured. Abandoning delivery {} for event {}.",
            row.target_url, row.id, row.event_id
        );
        self.db.mark_abandoned(row.id, row.attempt_count, "endpoint is no longer configured").await?;
        Ok(())
    }
}

/// The canonical webhook payload. Subscribers dedupe on `event_id`; the timestamp is the moment
/// of emission, not of any particular delivery attempt.
fn event_payload(
    event_type: &str,
    event_id: &str,
    timestamp: DateTime<Utc>,
    data: &Value,
) -> Result<String, PaymentEngineError> {
    let payload = json!({
        "event": event_type,
        "event_id": event_id,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        "data": data,
    });
    serde_json::to_string(&payload).map_err(|e| PaymentEngineError::PayloadSerialization(e.to_string()))
}
