use chrono::{DateTime, Duration, Utc};
use lokapay_common::{Rupiah, TxId};
use lokapay_engine::{
    db_types::{CustomerBalance, NewDelivery, NewTransaction, Transaction, TransactionStatus, WebhookDelivery},
    traits::{DeliveryManagement, PaymentEngineError, TransactionManagement},
    TransactionFilter,
};
use mockall::mock;

mock! {
    pub PaymentManager {}
    impl Clone for PaymentManager {
        fn clone(&self) -> Self;
    }
    impl TransactionManagement for PaymentManager {
        fn url(&self) -> &str;
        async fn insert_transaction(&self, transaction: NewTransaction) -> Result<(Transaction, bool), PaymentEngineError>;
        async fn fetch_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, PaymentEngineError>;
        async fn search_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, PaymentEngineError>;
        async fn update_provider_ref(&self, tx_id: &TxId, provider_ref: &str) -> Result<(), PaymentEngineError>;
        async fn record_callback_event(&self, event_key: &str, tx_id: &TxId, gateway: &str) -> Result<bool, PaymentEngineError>;
        async fn settle_transaction(&self, tx_id: &TxId, paid_amount: Option<Rupiah>, paid_at: Option<DateTime<Utc>>, provider_ref: Option<String>) -> Result<Option<Transaction>, PaymentEngineError>;
        async fn close_transaction(&self, tx_id: &TxId, new_status: TransactionStatus) -> Result<Option<Transaction>, PaymentEngineError>;
        async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Option<CustomerBalance>, PaymentEngineError>;
        async fn purge_callback_events(&self, retention: Duration) -> Result<u64, PaymentEngineError>;
    }
}

mock! {
    pub DeliveryManager {}
    impl Clone for DeliveryManager {
        fn clone(&self) -> Self;
    }
    impl DeliveryManagement for DeliveryManager {
        async fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery, PaymentEngineError>;
        async fn fetch_delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
        async fn fetch_deliveries_for_event(&self, event_id: &str) -> Result<Vec<WebhookDelivery>, PaymentEngineError>;
        async fn fetch_due_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>, PaymentEngineError>;
        async fn mark_delivered(&self, id: i64, observed_attempts: i64, http_status: i64) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
        async fn mark_retrying(&self, id: i64, observed_attempts: i64, http_status: Option<i64>, error: &str, next_retry_at: DateTime<Utc>) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
        async fn mark_failed(&self, id: i64, observed_attempts: i64, http_status: Option<i64>, error: &str) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
        async fn mark_abandoned(&self, id: i64, observed_attempts: i64, error: &str) -> Result<Option<WebhookDelivery>, PaymentEngineError>;
    }
}
