use std::fmt::Debug;

use chrono::Duration;
use log::*;
use lokapay_common::{Rupiah, TxId};
use payment_gateways::{CallbackStatus, CanonicalCallbackEvent};

use crate::{
    db_types::{CustomerBalance, NewTransaction, Transaction, TransactionStatus},
    events::{EventProducers, PaymentClosedEvent, PaymentSettledEvent},
    lpe_api::TransactionFilter,
    traits::{PaymentEngineError, TransactionManagement},
};

/// The result of feeding one callback event (or polled status) through the reconciler.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The transaction settled and the customer account was credited.
    Settled(Transaction),
    /// The transaction closed without payment (failed, expired or cancelled).
    Closed(Transaction),
    /// A replayed event, or a transaction that already reached a terminal state. Nothing changed.
    Duplicate,
    /// A `pending` status report. Informational only; nothing changed.
    Informational,
    /// No transaction with this id exists. Logged and ignored.
    Unknown(TxId),
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Settled(_) | ReconcileOutcome::Closed(_))
    }
}

/// `ReconcilerApi` is the primary API for the transaction lifecycle. It records new
/// transactions, and it is the sole writer of terminal transaction state: every callback event
/// and every polled provider status funnels through the same conditional-transition path here.
///
/// On each applied transition the corresponding event hook fires, so that the server can bridge
/// settlement into outbound `payment.*` webhooks.
pub struct ReconcilerApi<B> {
    db: B,
    producers: EventProducers,
    amount_tolerance: Rupiah,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, amount_tolerance: Rupiah::from(0) }
    }

    /// Sets the paid-amount mismatch tolerance. A reported paid amount further than this from
    /// the recorded amount logs a warning; it never blocks crediting.
    pub fn with_amount_tolerance(mut self, tolerance: Rupiah) -> Self {
        self.amount_tolerance = tolerance;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> ReconcilerApi<B>
where B: TransactionManagement
{
    /// Records a freshly created payment. Idempotent on `tx_id`; returns the stored record and
    /// whether it was newly inserted.
    pub async fn record_new_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<(Transaction, bool), PaymentEngineError> {
        let (transaction, inserted) = self.db.insert_transaction(transaction).await?;
        if inserted {
            info!("🔄️ New {} transaction [{}] recorded for {}", transaction.gateway, transaction.tx_id, transaction.amount);
        } else {
            debug!("🔄️ Transaction [{}] already existed; returning the stored record", transaction.tx_id);
        }
        Ok((transaction, inserted))
    }

    pub async fn fetch_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, PaymentEngineError> {
        self.db.fetch_transaction(tx_id).await
    }

    /// Like [`Self::fetch_transaction`], but a missing record is a
    /// [`PaymentEngineError::TransactionNotFound`] error.
    pub async fn require_transaction(&self, tx_id: &TxId) -> Result<Transaction, PaymentEngineError> {
        self.db.fetch_transaction(tx_id).await?.ok_or_else(|| PaymentEngineError::TransactionNotFound(tx_id.clone()))
    }

    pub async fn search_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, PaymentEngineError> {
        self.db.search_transactions(filter).await
    }

    pub async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Option<CustomerBalance>, PaymentEngineError> {
        self.db.fetch_customer_balance(customer_id).await
    }

    /// Applies a canonical callback event from the given gateway.
    ///
    /// The event key is recorded first: a key that has been seen before short-circuits to
    /// [`ReconcileOutcome::Duplicate`] without touching the transaction. The status transition
    /// itself is an atomic conditional update, so even two *distinct* events racing for the same
    /// transaction settle it exactly once.
    pub async fn process_event(
        &self,
        gateway: &str,
        event: CanonicalCallbackEvent,
    ) -> Result<ReconcileOutcome, PaymentEngineError> {
        let is_new = self.db.record_callback_event(&event.event_key, &event.tx_id, gateway).await?;
        if !is_new {
            info!("🔄️ Ignoring replayed {gateway} event {} for [{}]", event.event_key, event.tx_id);
            return Ok(ReconcileOutcome::Duplicate);
        }
        let Some(transaction) = self.db.fetch_transaction(&event.tx_id).await? else {
            warn!("🔄️ Received a {gateway} event for unknown transaction [{}]. Ignoring it.", event.tx_id);
            return Ok(ReconcileOutcome::Unknown(event.tx_id));
        };
        if transaction.status.is_terminal() {
            info!(
                "🔄️ Transaction [{}] is already {}. The {gateway} event changes nothing.",
                transaction.tx_id, transaction.status
            );
            return Ok(ReconcileOutcome::Duplicate);
        }
        if let Some(paid) = event.paid_amount {
            let diff = paid.abs_diff(transaction.amount);
            if diff > self.amount_tolerance {
                warn!(
                    "🔄️ Paid amount {paid} differs from recorded amount {} on [{}] by {diff}. Crediting the recorded \
                     amount regardless.",
                    transaction.amount, transaction.tx_id
                );
            }
        }
        self.apply_transition(&transaction, event.status, event.paid_amount, event.paid_at, event.provider_ref).await
    }

    /// Reconciles a provider status obtained by polling (`check_status`). Shares the transition
    /// path with [`Self::process_event`], minus the event-key bookkeeping: a poll result is not
    /// a provider event and has no replay identity.
    pub async fn reconcile_status(
        &self,
        tx_id: &TxId,
        status: CallbackStatus,
    ) -> Result<ReconcileOutcome, PaymentEngineError> {
        let Some(transaction) = self.db.fetch_transaction(tx_id).await? else {
            return Ok(ReconcileOutcome::Unknown(tx_id.clone()));
        };
        if transaction.status.is_terminal() {
            debug!("🔄️ Poll result for [{}] arrived after it reached {}", transaction.tx_id, transaction.status);
            return Ok(ReconcileOutcome::Duplicate);
        }
        self.apply_transition(&transaction, status, None, None, None).await
    }

    /// Cancels a pending transaction locally (after the provider-side cancel succeeded).
    /// Returns `None` when the transaction was no longer `pending`.
    pub async fn cancel_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, PaymentEngineError> {
        let cancelled = self.db.close_transaction(tx_id, TransactionStatus::Cancelled).await?;
        if let Some(transaction) = &cancelled {
            info!("🔄️ Transaction [{}] cancelled", transaction.tx_id);
            self.call_payment_closed_hook(transaction).await;
        }
        Ok(cancelled)
    }

    /// Records a provider reference that only became known after creation.
    pub async fn update_provider_ref(&self, tx_id: &TxId, provider_ref: &str) -> Result<(), PaymentEngineError> {
        self.db.update_provider_ref(tx_id, provider_ref).await
    }

    /// Purges callback-event dedupe rows older than the retention window.
    pub async fn purge_old_callback_events(&self, retention: Duration) -> Result<u64, PaymentEngineError> {
        self.db.purge_callback_events(retention).await
    }

    async fn apply_transition(
        &self,
        transaction: &Transaction,
        status: CallbackStatus,
        paid_amount: Option<Rupiah>,
        paid_at: Option<chrono::DateTime<chrono::Utc>>,
        provider_ref: Option<String>,
    ) -> Result<ReconcileOutcome, PaymentEngineError> {
        let tx_id = &transaction.tx_id;
        match status {
            CallbackStatus::Pending => {
                debug!("🔄️ Transaction [{tx_id}] is still pending at the provider");
                Ok(ReconcileOutcome::Informational)
            },
            CallbackStatus::Success => {
                match self.db.settle_transaction(tx_id, paid_amount, paid_at, provider_ref).await? {
                    Some(settled) => {
                        info!("🔄️ Transaction [{tx_id}] settled. {} credited to {}", settled.amount, settled.customer_id);
                        self.call_payment_settled_hook(&settled).await;
                        Ok(ReconcileOutcome::Settled(settled))
                    },
                    None => {
                        info!("🔄️ Transaction [{tx_id}] was settled by a concurrent event. No-op.");
                        Ok(ReconcileOutcome::Duplicate)
                    },
                }
            },
            CallbackStatus::Failed | CallbackStatus::Expired | CallbackStatus::Cancelled => {
                let new_status = TransactionStatus::from(status);
                match self.db.close_transaction(tx_id, new_status).await? {
                    Some(closed) => {
                        info!("🔄️ Transaction [{tx_id}] closed as {new_status}");
                        self.call_payment_closed_hook(&closed).await;
                        Ok(ReconcileOutcome::Closed(closed))
                    },
                    None => {
                        info!("🔄️ Transaction [{tx_id}] already left pending before this event. No-op.");
                        Ok(ReconcileOutcome::Duplicate)
                    },
                }
            },
        }
    }

    async fn call_payment_settled_hook(&self, transaction: &Transaction) {
        for emitter in &self.producers.settled_producer {
            debug!("🔄️ Notifying payment settled hook subscribers");
            let event = PaymentSettledEvent::new(transaction.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_payment_closed_hook(&self, transaction: &Transaction) {
        for emitter in &self.producers.closed_producer {
            debug!("🔄️ Notifying payment closed hook subscribers");
            let event = PaymentClosedEvent::new(transaction.clone());
            emitter.publish_event(event).await;
        }
    }
}
