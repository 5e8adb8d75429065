//! `SqliteDatabase` is a concrete implementation of a Lokapay payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use lokapay_common::{Rupiah, TxId};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use super::db::{accounts, callback_events, db_url, deliveries, new_pool, transactions};
use crate::{
    db_types::{CustomerBalance, NewDelivery, NewTransaction, Transaction, TransactionStatus, WebhookDelivery},
    lpe_api::TransactionFilter,
    traits::{DeliveryManagement, PaymentEngineError, TransactionManagement},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object with a connection pool of size `max_connections`,
    /// using the URL from the `LKP_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database file when it does not exist yet. A no-op otherwise.
    pub async fn create_database_if_missing(url: &str) -> Result<(), PaymentEngineError> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            info!("🗃️ Database {url} does not exist yet. Creating it.");
            Sqlite::create_database(url).await.map_err(|e| PaymentEngineError::DatabaseError(e.to_string()))?;
        }
        Ok(())
    }

    /// Applies any embedded migrations that have not run against this database yet.
    pub async fn run_migrations(&self) -> Result<(), PaymentEngineError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentEngineError::DatabaseError(e.to_string()))?;
        debug!("🗃️ Migrations are up to date");
        Ok(())
    }
}

impl TransactionManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<(Transaction, bool), PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let (transaction, inserted) = transactions::idempotent_insert(transaction, &mut conn).await?;
        Ok((transaction, inserted))
    }

    async fn fetch_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::fetch_by_tx_id(tx_id, &mut conn).await?;
        Ok(transaction)
    }

    async fn search_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let transactions = transactions::search(filter, &mut conn).await?;
        Ok(transactions)
    }

    async fn update_provider_ref(&self, tx_id: &TxId, provider_ref: &str) -> Result<(), PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        transactions::set_provider_ref(tx_id, provider_ref, &mut conn).await
    }

    async fn record_callback_event(
        &self,
        event_key: &str,
        tx_id: &TxId,
        gateway: &str,
    ) -> Result<bool, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        callback_events::record_event(event_key, tx_id, gateway, &mut conn).await
    }

    /// Settles a transaction and credits the customer's balance in a single atomic database
    /// transaction. If the conditional status flip does not land (the row was no longer
    /// `pending`), the whole transaction is rolled back and no credit is applied.
    async fn settle_transaction(
        &self,
        tx_id: &TxId,
        paid_amount: Option<Rupiah>,
        paid_at: Option<DateTime<Utc>>,
        provider_ref: Option<String>,
    ) -> Result<Option<Transaction>, PaymentEngineError> {
        let mut tx = self.pool.begin().await?;
        let settled = transactions::settle(tx_id, paid_amount, paid_at, provider_ref.as_deref(), &mut tx).await?;
        if let Some(transaction) = &settled {
            // The credit is always the amount recorded at creation, not the reported paid amount.
            accounts::credit_balance(&transaction.customer_id, transaction.amount, &mut tx).await?;
            debug!("🗃️ Transaction [{tx_id}] settled and customer {} credited", transaction.customer_id);
        }
        tx.commit().await?;
        Ok(settled)
    }

    async fn close_transaction(
        &self,
        tx_id: &TxId,
        new_status: TransactionStatus,
    ) -> Result<Option<Transaction>, PaymentEngineError> {
        if matches!(new_status, TransactionStatus::Pending | TransactionStatus::Success) {
            return Err(PaymentEngineError::InvalidTransition(format!(
                "close_transaction cannot move [{tx_id}] to {new_status}"
            )));
        }
        let mut conn = self.pool.acquire().await?;
        let closed = transactions::close(tx_id, new_status, &mut conn).await?;
        if closed.is_some() {
            debug!("🗃️ Transaction [{tx_id}] closed as {new_status}");
        }
        Ok(closed)
    }

    async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Option<CustomerBalance>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let balance = accounts::fetch_balance(customer_id, &mut conn).await?;
        Ok(balance)
    }

    async fn purge_callback_events(&self, retention: Duration) -> Result<u64, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let purged = callback_events::purge_older_than(retention, &mut conn).await?;
        if purged > 0 {
            info!("🗃️ Purged {purged} old callback event records");
        }
        Ok(purged)
    }

    async fn close(&mut self) -> Result<(), PaymentEngineError> {
        self.pool.close().await;
        Ok(())
    }
}

impl DeliveryManagement for SqliteDatabase {
    async fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = deliveries::insert_delivery(delivery, &mut conn).await?;
        debug!("🗃️ Delivery #{} created for event {}", delivery.id, delivery.event_id);
        Ok(delivery)
    }

    async fn fetch_delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = deliveries::fetch_delivery(id, &mut conn).await?;
        Ok(delivery)
    }

    async fn fetch_deliveries_for_event(&self, event_id: &str) -> Result<Vec<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let result = deliveries::fetch_for_event(event_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_due_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        let result = deliveries::fetch_due(now, &mut conn).await?;
        Ok(result)
    }

    async fn mark_delivered(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: i64,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        deliveries::mark_delivered(id, observed_attempts, http_status, &mut conn).await
    }

    async fn mark_retrying(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: Option<i64>,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        deliveries::mark_retrying(id, observed_attempts, http_status, error, next_retry_at, &mut conn).await
    }

    async fn mark_failed(
        &self,
        id: i64,
        observed_attempts: i64,
        http_status: Option<i64>,
        error: &str,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        deliveries::mark_failed(id, observed_attempts, http_status, error, &mut conn).await
    }

    async fn mark_abandoned(
        &self,
        id: i64,
        observed_attempts: i64,
        error: &str,
    ) -> Result<Option<WebhookDelivery>, PaymentEngineError> {
        let mut conn = self.pool.acquire().await?;
        deliveries::mark_abandoned(id, observed_attempts, error, &mut conn).await
    }
}
