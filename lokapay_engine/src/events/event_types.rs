use serde::{Deserialize, Serialize};

use crate::db_types::{Transaction, TransactionStatus};

/// Fired when a transaction settles (`pending → success`), after the account has been credited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettledEvent {
    pub transaction: Transaction,
}

impl PaymentSettledEvent {
    pub fn new(transaction: Transaction) -> Self {
        Self { transaction }
    }
}

/// Fired when a transaction closes without payment (`pending → failed | expired | cancelled`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentClosedEvent {
    pub transaction: Transaction,
    pub status: TransactionStatus,
}

impl PaymentClosedEvent {
    pub fn new(transaction: Transaction) -> Self {
        let status = transaction.status;
        Self { transaction, status }
    }
}

#[derive(Debug, Clone)]
pub enum EventType {
    PaymentSettled(PaymentSettledEvent),
    PaymentClosed(PaymentClosedEvent),
}

/// The outbound webhook event type announced for a terminal transaction status.
/// `Pending` has no webhook; it is not a transition.
pub fn webhook_event_type(status: TransactionStatus) -> Option<&'static str> {
    match status {
        TransactionStatus::Success => Some("payment.completed"),
        TransactionStatus::Failed => Some("payment.failed"),
        TransactionStatus::Expired => Some("payment.expired"),
        TransactionStatus::Cancelled => Some("payment.cancelled"),
        TransactionStatus::Pending => None,
    }
}
