use std::fmt::Display;

use chrono::{DateTime, Utc};
use lokapay_engine::{
    db_types::{Transaction, TransactionStatus, WebhookDelivery},
    TransactionFilter,
};
use payment_gateways::{CallbackStatus, PaymentRequest, PaymentResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /api/payments`: a payment request, optionally pinned to a specific gateway
/// instead of the configured active one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentParams {
    #[serde(flatten)]
    pub request: PaymentRequest,
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreatedResponse {
    pub gateway: String,
    pub transaction: Transaction,
    pub payment: PaymentResult,
}

/// Answer of the live status refresh: what the provider said, and the local record after the
/// answer has been reconciled into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRefreshResponse {
    pub provider_status: CallbackStatus,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventParams {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventResponse {
    pub event: String,
    pub deliveries: Vec<WebhookDelivery>,
}

/// Optional `?gateway=` override on the method listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayQuery {
    pub gateway: Option<String>,
}

/// Query parameters of the transaction listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub customer_id: Option<String>,
    pub gateway: Option<String>,
    pub status: Option<TransactionStatus>,
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl From<TransactionQuery> for TransactionFilter {
    fn from(q: TransactionQuery) -> Self {
        TransactionFilter { customer_id: q.customer_id, gateway: q.gateway, status: q.status, after: q.after, limit: q.limit }
    }
}
