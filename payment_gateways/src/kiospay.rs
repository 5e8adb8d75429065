//! Adapter for the KiosPay aggregator, which fronts hosted checkout pages and e-wallet rails.
//!
//! Outbound calls authenticate with a bearer API key. Inbound callbacks carry an HMAC-SHA256
//! signature over `{timestamp}.{body}` in `x-kiospay-signature` plus the unix timestamp in
//! `x-kiospay-timestamp`; freshness is checked before the MAC.

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use lokapay_common::Rupiah;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::KiospayConfig,
    data_objects::{
        Acknowledgement,
        CallbackStatus,
        CanonicalCallbackEvent,
        InboundCallback,
        LineItem,
        MethodKind,
        MethodSelection,
        PaymentInstructions,
        PaymentRequest,
        PaymentResult,
        Wallet,
    },
    errors::GatewayError,
    gateway::PaymentGateway,
    signing,
};

pub const KIOSPAY_CODE: &str = "kiospay";

pub const SIGNATURE_HEADER: &str = "x-kiospay-signature";
pub const TIMESTAMP_HEADER: &str = "x-kiospay-timestamp";

const METHODS: &[MethodKind] = &[MethodKind::Checkout, MethodKind::EWallet];

/// The aggregator's channel code for each e-wallet brand.
pub fn wallet_channel(wallet: Wallet) -> &'static str {
    match wallet {
        Wallet::Ovo => "OVO",
        Wallet::Dana => "DANA",
        Wallet::Gopay => "GOPAY",
        Wallet::Shopeepay => "SHOPEEPAY",
        Wallet::Linkaja => "LINKAJA",
    }
}

/// Maps the aggregator's transaction status strings onto the canonical status.
pub fn transaction_status(status: &str) -> Result<CallbackStatus, GatewayError> {
    match status.to_ascii_uppercase().as_str() {
        "PAID" => Ok(CallbackStatus::Success),
        "PENDING" => Ok(CallbackStatus::Pending),
        "EXPIRED" => Ok(CallbackStatus::Expired),
        "FAILED" => Ok(CallbackStatus::Failed),
        "CANCELLED" => Ok(CallbackStatus::Cancelled),
        other => Err(GatewayError::Protocol(format!("unknown transaction status '{other}'"))),
    }
}

#[derive(Debug)]
pub struct KiospayGateway {
    config: KiospayConfig,
    tolerance: Duration,
    client: Arc<Client>,
}

impl KiospayGateway {
    /// Builds the adapter. Both the API key and the callback secret must be configured; an
    /// adapter that cannot verify callbacks is worse than no adapter.
    pub fn new(config: KiospayConfig, tolerance: i64, timeout: StdDuration) -> Result<Self, GatewayError> {
        config.api_key()?;
        config.callback_secret()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("could not construct HTTP client: {e}")))?;
        Ok(Self { config, tolerance: Duration::seconds(tolerance), client: Arc::new(client) })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        debug!("🌐️ {method} {url}");
        let mut builder = self.client.request(method, &url).bearer_auth(self.config.api_key()?);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(GatewayError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(GatewayError::from_transport)?;
        if status.is_server_error() {
            return Err(GatewayError::GatewayUnavailable(format!("{url} answered {status}")));
        }
        let envelope: KiospayEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Protocol(format!("unexpected response from {url}: {e}")))?;
        if !status.is_success() || !envelope.success {
            let message = envelope.message.unwrap_or_else(|| format!("request declined with status {status}"));
            return Err(GatewayError::UpstreamRejected { status: status.as_u16(), message });
        }
        envelope.data.ok_or_else(|| GatewayError::Protocol(format!("successful response from {url} carried no data")))
    }
}

#[async_trait]
impl PaymentGateway for KiospayGateway {
    fn code(&self) -> &'static str {
        KIOSPAY_CODE
    }

    fn available_methods(&self) -> &[MethodKind] {
        METHODS
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResult, GatewayError> {
        let (channel, wants_redirect) = match request.method {
            MethodSelection::Checkout => ("CHECKOUT".to_string(), true),
            MethodSelection::Ewallet { wallet } => (wallet_channel(wallet).to_string(), false),
            other => return Err(GatewayError::UnsupportedMethod(other.kind(), KIOSPAY_CODE.into())),
        };
        let expires_at = Utc::now() + request.expires_in.unwrap_or_else(|| Duration::minutes(180));
        let body = CreateTransaction {
            merchant_ref: request.tx_id.as_str().to_string(),
            amount: request.amount.value(),
            payment_channel: channel,
            customer_name: request.customer.name.clone(),
            customer_email: request.customer.email.clone(),
            customer_phone: request.customer.phone.clone(),
            return_url: request.redirect_url.clone(),
            expired_time: expires_at.timestamp(),
            order_items: request.items.clone(),
        };
        let body = serde_json::to_value(&body).map_err(|e| GatewayError::Protocol(e.to_string()))?;
        let data: Transaction = self.request(Method::POST, "/v1/transactions", Some(&body)).await?;
        let instructions = if wants_redirect {
            let url = data
                .checkout_url
                .clone()
                .ok_or_else(|| GatewayError::Protocol("checkout transaction carried no checkout_url".into()))?;
            PaymentInstructions::Redirect { url }
        } else {
            let deeplink = data
                .deeplink
                .clone()
                .ok_or_else(|| GatewayError::Protocol("e-wallet transaction carried no deeplink".into()))?;
            PaymentInstructions::Ewallet { deeplink }
        };
        info!("🌐️ KiosPay invoice {} created for {}", data.invoice_id, request.tx_id);
        let expires_at = data.expired_time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)).unwrap_or(expires_at);
        Ok(PaymentResult {
            provider_ref: Some(data.invoice_id.clone()),
            instructions,
            expires_at,
            raw: serde_json::to_value(&data).unwrap_or(Value::Null),
        })
    }

    async fn check_status(
        &self,
        _request: &PaymentRequest,
        provider_ref: Option<&str>,
    ) -> Result<CallbackStatus, GatewayError> {
        let invoice_id = provider_ref
            .ok_or_else(|| GatewayError::Validation("a KiosPay invoice id is required to poll status".into()))?;
        let data: Transaction = self.request(Method::GET, &format!("/v1/transactions/{invoice_id}"), None).await?;
        transaction_status(&data.status)
    }

    async fn cancel(&self, _request: &PaymentRequest, provider_ref: Option<&str>) -> Result<(), GatewayError> {
        let invoice_id = provider_ref
            .ok_or_else(|| GatewayError::Validation("a KiosPay invoice id is required to cancel".into()))?;
        let _: Transaction =
            self.request(Method::POST, &format!("/v1/transactions/{invoice_id}/cancel"), None).await?;
        info!("🌐️ KiosPay invoice {invoice_id} cancelled");
        Ok(())
    }

    fn verify_callback(&self, callback: &InboundCallback) -> Result<(), GatewayError> {
        let timestamp = callback
            .header(TIMESTAMP_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid(format!("{TIMESTAMP_HEADER} header is missing")))?;
        let parsed = signing::parse_unix_timestamp(timestamp)?;
        signing::check_freshness(parsed, self.tolerance)?;
        let signature = callback
            .header(SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid(format!("{SIGNATURE_HEADER} header is missing")))?;
        let body = std::str::from_utf8(callback.body())
            .map_err(|_| GatewayError::SignatureInvalid("callback body is not valid UTF-8".into()))?;
        signing::verify_payload(self.config.callback_secret()?, parsed.timestamp(), body, signature)?;
        Ok(())
    }

    fn parse_callback(&self, callback: &InboundCallback) -> Result<CanonicalCallbackEvent, GatewayError> {
        let notification: KiospayNotification = serde_json::from_slice(callback.body())
            .map_err(|e| GatewayError::Protocol(format!("unparseable callback: {e}")))?;
        let status = transaction_status(&notification.status)?;
        let paid_at = match &notification.paid_at {
            Some(ts) => Some(signing::parse_rfc3339_timestamp(ts).map_err(GatewayError::from)?),
            None => None,
        };
        let event_key = match &notification.callback_id {
            Some(id) => format!("kiospay:{id}"),
            None => format!("kiospay:{}:{}", notification.invoice_id, notification.status.to_ascii_uppercase()),
        };
        Ok(CanonicalCallbackEvent {
            tx_id: notification.merchant_ref.clone().into(),
            provider_ref: Some(notification.invoice_id.clone()),
            status,
            paid_amount: notification.amount.map(Rupiah::new),
            channel: notification.channel.clone(),
            reference: notification.reference.clone(),
            paid_at,
            event_key,
            raw: serde_json::from_slice(callback.body()).unwrap_or(Value::Null),
        })
    }

    fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::Text("OK")
    }

    fn matches_callback(&self, callback: &InboundCallback) -> bool {
        if callback.header(SIGNATURE_HEADER).is_some() {
            return true;
        }
        callback
            .json()
            .map(|body| body.get("merchant_ref").is_some() && body.get("invoice_id").is_some())
            .unwrap_or(false)
    }
}

//--------------------------------------   Wire types     ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct KiospayEnvelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
struct CreateTransaction {
    merchant_ref: String,
    amount: i64,
    payment_channel: String,
    customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<String>,
    customer_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<String>,
    expired_time: i64,
    order_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transaction {
    invoice_id: String,
    #[serde(default)]
    merchant_ref: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    deeplink: Option<String>,
    #[serde(default)]
    expired_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct KiospayNotification {
    #[serde(default)]
    callback_id: Option<String>,
    invoice_id: String,
    merchant_ref: String,
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}
