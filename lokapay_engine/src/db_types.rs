use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use lokapay_common::{MethodKind, Rupiah, TxId};
use payment_gateways::CallbackStatus;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------  TransactionStatus  ---------------------------------------------------------

/// The lifecycle state of a payment transaction.
///
/// Every transaction starts as `Pending` and moves to exactly one of the terminal states,
/// exactly once. The transition is enforced at the storage layer with a conditional update,
/// so replayed or racing callbacks can never flip a transaction twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Payment created; no terminal callback has been applied yet.
    Pending,
    /// The customer paid and the account has been credited.
    Success,
    /// The provider reported a failed payment.
    Failed,
    /// The payment window lapsed before the customer paid.
    Expired,
    /// Cancelled by the customer, an admin, or the provider.
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Expired => write!(f, "expired"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid transaction status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for TransactionStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            TransactionStatus::Pending
        })
    }
}

impl From<CallbackStatus> for TransactionStatus {
    fn from(value: CallbackStatus) -> Self {
        match value {
            CallbackStatus::Pending => Self::Pending,
            CallbackStatus::Success => Self::Success,
            CallbackStatus::Failed => Self::Failed,
            CallbackStatus::Expired => Self::Expired,
            CallbackStatus::Cancelled => Self::Cancelled,
        }
    }
}

//--------------------------------------     Transaction     ---------------------------------------------------------

/// A payment transaction as stored in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub tx_id: TxId,
    pub customer_id: String,
    pub amount: Rupiah,
    pub method: MethodKind,
    /// Code of the gateway the payment was created against ("snap", "kiospay", "manual").
    pub gateway: String,
    /// The provider-assigned transaction reference, when the provider issued one.
    pub provider_ref: Option<String>,
    pub status: TransactionStatus,
    pub paid_amount: Option<Rupiah>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction {} ({} via {}, {}, {})",
            self.tx_id, self.amount, self.gateway, self.method, self.status
        )
    }
}

//--------------------------------------   NewTransaction    ---------------------------------------------------------

/// A transaction record as it is first persisted, before the database assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// The merchant-side transaction id. Unique; inserts are idempotent on this key.
    pub tx_id: TxId,
    pub customer_id: String,
    pub amount: Rupiah,
    pub method: MethodKind,
    pub gateway: String,
    pub provider_ref: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewTransaction {
    pub fn new(tx_id: TxId, customer_id: String, amount: Rupiah, method: MethodKind, gateway: String) -> Self {
        Self { tx_id, customer_id, amount, method, gateway, provider_ref: None, expires_at: None }
    }

    pub fn with_provider_ref<S: Into<String>>(mut self, provider_ref: S) -> Self {
        self.provider_ref = Some(provider_ref.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

//--------------------------------------   CustomerBalance   ---------------------------------------------------------

/// The running balance for a customer, credited on every successful settlement.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CustomerBalance {
    pub customer_id: String,
    pub balance: Rupiah,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    CallbackEvent    ---------------------------------------------------------

/// An inbound callback dedupe record. The UNIQUE `event_key` makes reconciliation idempotent
/// across process restarts; rows are purged by the retention job after they can no longer be
/// replayed by a provider.
#[derive(Debug, Clone, FromRow)]
pub struct CallbackEvent {
    pub id: i64,
    pub event_key: String,
    pub tx_id: TxId,
    pub gateway: String,
    pub received_at: DateTime<Utc>,
}

//--------------------------------------    DeliveryStatus   ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Awaiting a first attempt or a scheduled retry.
    Pending,
    /// The subscriber acknowledged the event with a 2xx response.
    Delivered,
    /// All attempts are exhausted, or the endpoint was removed from configuration.
    Failed,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for DeliveryStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid delivery status: {value}. But this conversion cannot fail. Defaulting to Pending");
            DeliveryStatus::Pending
        })
    }
}

//--------------------------------------   WebhookDelivery   ---------------------------------------------------------

/// One webhook delivery, i.e. one (event, subscriber endpoint) pair.
///
/// The row is created when the event is emitted and is only ever mutated by delivery attempts.
/// `payload` is a snapshot of the signed body; re-emitting an event creates new rows rather
/// than touching old ones.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: i64,
    /// The UUID shared by every delivery row of the same emitted event.
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
    pub target_url: String,
    pub status: DeliveryStatus,
    pub attempt_count: i64,
    pub max_attempts: i64,
    /// HTTP status of the most recent attempt, if a response was received at all.
    pub last_status: Option<i64>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Display for WebhookDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Delivery #{} of {} ({}) to {}: {} after {}/{} attempts",
            self.id, self.event_id, self.event_type, self.target_url, self.status, self.attempt_count, self.max_attempts
        )
    }
}

//--------------------------------------     NewDelivery     ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
    pub target_url: String,
    pub max_attempts: i64,
}

impl NewDelivery {
    pub fn new(event_id: String, event_type: String, payload: String, target_url: String, max_attempts: i64) -> Self {
        Self { event_id, event_type, payload, target_url, max_attempts }
    }
}
