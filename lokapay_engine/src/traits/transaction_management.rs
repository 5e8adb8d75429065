use chrono::{DateTime, Duration, Utc};
use lokapay_common::{Rupiah, TxId};
use thiserror::Error;

use crate::{
    db_types::{CustomerBalance, NewTransaction, Transaction, TransactionStatus},
    lpe_api::TransactionFilter,
};

/// Transaction lifecycle behaviour for payment-engine backends.
///
/// The settlement methods (`settle_transaction`, `close_transaction`) are the sole writers of
/// terminal transaction state. Both apply the transition with a conditional update: the flip
/// only happens if the row is still `pending`, so concurrent callbacks for one transaction
/// resolve to exactly one applied transition with no read-then-write race.
#[allow(async_fn_in_trait)]
pub trait TransactionManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new transaction. The call is idempotent on `tx_id`.
    ///
    /// Returns the stored record and `true` if the row was inserted, or the existing record and
    /// `false` if a transaction with this `tx_id` was already present.
    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<(Transaction, bool), PaymentEngineError>;

    /// Fetches a transaction by its merchant-side id.
    async fn fetch_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, PaymentEngineError>;

    /// Fetches transactions matching the filter, most recent first.
    async fn search_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, PaymentEngineError>;

    /// Updates the provider reference on a transaction, e.g. when a status poll reveals an id
    /// the create call did not return. Leaves an existing reference untouched.
    async fn update_provider_ref(&self, tx_id: &TxId, provider_ref: &str) -> Result<(), PaymentEngineError>;

    /// Records an inbound callback event key. Returns `true` if the key was new, `false` if this
    /// exact event was seen before (a replay).
    async fn record_callback_event(
        &self,
        event_key: &str,
        tx_id: &TxId,
        gateway: &str,
    ) -> Result<bool, PaymentEngineError>;

    /// Settles a transaction: `pending → success`, and credits the customer's account balance
    /// with the *recorded* transaction amount, in one atomic database transaction.
    ///
    /// Returns the updated record, or `None` if the transaction was not `pending` (in which case
    /// nothing was written and no credit was applied).
    async fn settle_transaction(
        &self,
        tx_id: &TxId,
        paid_amount: Option<Rupiah>,
        paid_at: Option<DateTime<Utc>>,
        provider_ref: Option<String>,
    ) -> Result<Option<Transaction>, PaymentEngineError>;

    /// Closes a transaction without crediting: `pending → failed | expired | cancelled`.
    ///
    /// Returns the updated record, or `None` if the transaction was not `pending`.
    /// Passing `Pending` or `Success` as the new status is a [`PaymentEngineError::InvalidTransition`].
    async fn close_transaction(
        &self,
        tx_id: &TxId,
        new_status: TransactionStatus,
    ) -> Result<Option<Transaction>, PaymentEngineError>;

    /// Fetches the account balance for a customer. `None` if the customer has never been credited.
    async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Option<CustomerBalance>, PaymentEngineError>;

    /// Deletes callback-event dedupe rows older than the retention window.
    /// Returns the number of rows purged.
    async fn purge_callback_events(&self, retention: Duration) -> Result<u64, PaymentEngineError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentEngineError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentEngineError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(TxId),
    #[error("This event has already been processed: {0}")]
    DuplicateEvent(String),
    #[error("The amount is not valid here. {0}")]
    BadAmount(String),
    #[error("Illegal status transition. {0}")]
    InvalidTransition(String),
    #[error("The requested delivery record (id {0}) does not exist")]
    DeliveryNotFound(i64),
    #[error("Could not serialize the event payload. {0}")]
    PayloadSerialization(String),
}

impl From<sqlx::Error> for PaymentEngineError {
    fn from(e: sqlx::Error) -> Self {
        PaymentEngineError::DatabaseError(e.to_string())
    }
}
