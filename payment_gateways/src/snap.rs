//! Adapter for the BI-SNAP bank gateway, which fronts virtual-account and QRIS rails.
//!
//! Every outbound call is signed with our RSA key over the canonical request string (see
//! [`crate::signing`]), and every inbound payment notification is authenticated with the
//! gateway's published RSA key before a byte of it is trusted. The gateway addresses banks by
//! three-digit channel codes; [`bank_channel`] is the complete table.

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use log::{debug, info};
use lokapay_common::{Rupiah, IDR_CURRENCY_CODE};
use rand::Rng;
use reqwest::Client;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    config::{SnapConfig, DEFAULT_VA_EXPIRY_MINUTES},
    data_objects::{
        Acknowledgement,
        Bank,
        CallbackStatus,
        CanonicalCallbackEvent,
        InboundCallback,
        MethodKind,
        MethodSelection,
        PaymentInstructions,
        PaymentRequest,
        PaymentResult,
    },
    errors::GatewayError,
    gateway::PaymentGateway,
    signing,
};

pub const SNAP_CODE: &str = "snap";

const CREATE_VA_PATH: &str = "/v1.0/transfer-va/create-va";
const VA_STATUS_PATH: &str = "/v1.0/transfer-va/status";
const DELETE_VA_PATH: &str = "/v1.0/transfer-va/delete-va";
const QRIS_GENERATE_PATH: &str = "/v1.0/qr/qr-mpm-generate";
const QRIS_QUERY_PATH: &str = "/v1.0/qr/qr-mpm-query";

const METHODS: &[MethodKind] = &[MethodKind::VirtualAccount, MethodKind::Qris];

/// The gateway's three-digit channel code for each supported bank.
pub fn bank_channel(bank: Bank) -> &'static str {
    match bank {
        Bank::Bri => "002",
        Bank::Mandiri => "008",
        Bank::Bni => "009",
        Bank::Permata => "013",
        Bank::Bca => "014",
        Bank::Cimb => "022",
    }
}

/// Maps the gateway's two-digit payment flag onto the canonical status.
pub fn payment_status_from_flag(flag: &str) -> Result<CallbackStatus, GatewayError> {
    match flag {
        "00" => Ok(CallbackStatus::Success),
        "01" | "02" | "03" => Ok(CallbackStatus::Pending),
        "04" | "05" => Ok(CallbackStatus::Cancelled),
        "06" => Ok(CallbackStatus::Failed),
        other => Err(GatewayError::Protocol(format!("unknown payment flag status '{other}'"))),
    }
}

#[derive(Debug)]
pub struct SnapGateway {
    config: SnapConfig,
    signing_key: RsaPrivateKey,
    verifying_key: RsaPublicKey,
    tolerance: Duration,
    client: Arc<Client>,
}

impl SnapGateway {
    /// Builds the adapter, failing fast if either RSA key is missing or malformed. An adapter
    /// without the gateway's public key would have to take callbacks on faith, so both keys are
    /// mandatory.
    pub fn new(config: SnapConfig, tolerance: i64, timeout: StdDuration) -> Result<Self, GatewayError> {
        let signing_key = config.signing_key()?;
        let verifying_key = config.verifying_key()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("could not construct HTTP client: {e}")))?;
        Ok(Self { config, signing_key, verifying_key, tolerance: Duration::seconds(tolerance), client: Arc::new(client) })
    }

    /// The customer number half of the virtual account, derived from the customer's phone
    /// number in national format.
    fn customer_no(request: &PaymentRequest) -> Result<String, GatewayError> {
        let digits = request.customer.phone.chars().filter(|c| c.is_ascii_digit()).collect::<String>();
        let national = match digits.strip_prefix("62") {
            Some(rest) => format!("0{rest}"),
            None => digits,
        };
        if national.len() < 6 {
            return Err(GatewayError::Validation(format!(
                "a customer phone number is required to open a virtual account for {}",
                request.tx_id
            )));
        }
        Ok(national)
    }

    fn va_number(&self, customer_no: &str) -> String {
        format!("{}{customer_no}", self.config.partner_service_id)
    }

    /// POSTs a signed request to the gateway. 5xx answers and transport failures surface as
    /// `GatewayUnavailable`; other non-success answers carry the gateway's message.
    async fn post_signed<T, B>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let payload = serde_json::to_vec(body).map_err(|e| GatewayError::Protocol(e.to_string()))?;
        let timestamp = signing::rfc3339_now();
        let signature = signing::sign_request(&self.signing_key, "POST", path, &payload, &timestamp)?;
        debug!("🌐️ POST {url}");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-TIMESTAMP", &timestamp)
            .header("X-SIGNATURE", signature)
            .header("X-PARTNER-ID", &self.config.partner_id)
            .header("X-EXTERNAL-ID", external_id())
            .header("CHANNEL-ID", &self.config.channel_id)
            .body(payload)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(GatewayError::from_transport)?;
        if status.is_server_error() {
            return Err(GatewayError::GatewayUnavailable(format!("{url} answered {status}")));
        }
        if !status.is_success() {
            let message = serde_json::from_str::<SnapEnvelope>(&text)
                .map(|e| format!("{}: {}", e.response_code, e.response_message))
                .unwrap_or(text);
            return Err(GatewayError::UpstreamRejected { status: status.as_u16(), message });
        }
        serde_json::from_str::<T>(&text)
            .map_err(|e| GatewayError::Protocol(format!("unexpected response from {url}: {e}")))
    }

    async fn create_va(&self, request: &PaymentRequest, bank: Bank) -> Result<PaymentResult, GatewayError> {
        let channel = bank_channel(bank);
        let customer_no = Self::customer_no(request)?;
        let va_number = self.va_number(&customer_no);
        let expires_at =
            Utc::now() + request.expires_in.unwrap_or_else(|| Duration::minutes(DEFAULT_VA_EXPIRY_MINUTES));
        let body = CreateVaRequest {
            partner_service_id: self.config.partner_service_id.clone(),
            customer_no,
            virtual_account_no: va_number,
            virtual_account_name: request.customer.name.clone(),
            trx_id: request.tx_id.as_str().to_string(),
            total_amount: SnapAmount::idr(request.amount),
            expired_date: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            additional_info: serde_json::json!({ "channel": channel }),
        };
        let response: CreateVaResponse = self.post_signed(CREATE_VA_PATH, &body).await?;
        ensure_snap_success(&response.response_code, &response.response_message)?;
        let va = response
            .virtual_account_data
            .ok_or_else(|| GatewayError::Protocol("create-va response carried no virtualAccountData".into()))?;
        info!("🌐️ Virtual account {} opened at {bank} for {}", va.virtual_account_no.trim(), request.tx_id);
        Ok(PaymentResult {
            provider_ref: None,
            instructions: PaymentInstructions::VirtualAccount {
                number: va.virtual_account_no.trim().to_string(),
                holder: va.virtual_account_name.clone(),
                bank_code: channel.to_string(),
                bank_name: bank.to_string(),
            },
            expires_at,
            raw: serde_json::to_value(&va).unwrap_or(Value::Null),
        })
    }

    async fn create_qris(&self, request: &PaymentRequest) -> Result<PaymentResult, GatewayError> {
        let expires_at = Utc::now() + request.expires_in.unwrap_or_else(|| Duration::minutes(180));
        let body = QrisGenerateRequest {
            partner_reference_no: request.tx_id.as_str().to_string(),
            amount: SnapAmount::idr(request.amount),
            merchant_id: self.config.partner_id.clone(),
            validity_period: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let response: QrisGenerateResponse = self.post_signed(QRIS_GENERATE_PATH, &body).await?;
        ensure_snap_success(&response.response_code, &response.response_message)?;
        let qr_content = response
            .qr_content
            .ok_or_else(|| GatewayError::Protocol("qr-mpm-generate response carried no qrContent".into()))?;
        info!("🌐️ QRIS code issued for {} (ref {:?})", request.tx_id, response.reference_no);
        Ok(PaymentResult {
            provider_ref: response.reference_no.clone(),
            instructions: PaymentInstructions::QrCode { payload: qr_content },
            expires_at,
            raw: serde_json::json!({ "referenceNo": response.reference_no }),
        })
    }
}

#[async_trait]
impl PaymentGateway for SnapGateway {
    fn code(&self) -> &'static str {
        SNAP_CODE
    }

    fn available_methods(&self) -> &[MethodKind] {
        METHODS
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResult, GatewayError> {
        match request.method {
            MethodSelection::VirtualAccount { bank } => self.create_va(request, bank).await,
            MethodSelection::Qris => self.create_qris(request).await,
            other => Err(GatewayError::UnsupportedMethod(other.kind(), SNAP_CODE.into())),
        }
    }

    async fn check_status(
        &self,
        request: &PaymentRequest,
        provider_ref: Option<&str>,
    ) -> Result<CallbackStatus, GatewayError> {
        match request.method {
            MethodSelection::VirtualAccount { .. } => {
                let customer_no = Self::customer_no(request)?;
                let body = VaStatusRequest {
                    partner_service_id: self.config.partner_service_id.clone(),
                    customer_no: customer_no.clone(),
                    virtual_account_no: self.va_number(&customer_no),
                    inquiry_request_id: external_id(),
                };
                let response: VaStatusResponse = self.post_signed(VA_STATUS_PATH, &body).await?;
                ensure_snap_success(&response.response_code, &response.response_message)?;
                let flag = response
                    .virtual_account_data
                    .and_then(|d| d.payment_flag_status)
                    .ok_or_else(|| GatewayError::Protocol("status response carried no paymentFlagStatus".into()))?;
                payment_status_from_flag(&flag)
            },
            MethodSelection::Qris => {
                let body = QrisQueryRequest {
                    original_partner_reference_no: request.tx_id.as_str().to_string(),
                    original_reference_no: provider_ref.map(String::from),
                    service_code: "47".into(),
                };
                let response: QrisQueryResponse = self.post_signed(QRIS_QUERY_PATH, &body).await?;
                ensure_snap_success(&response.response_code, &response.response_message)?;
                let flag = response
                    .latest_transaction_status
                    .ok_or_else(|| GatewayError::Protocol("query response carried no latestTransactionStatus".into()))?;
                payment_status_from_flag(&flag)
            },
            other => Err(GatewayError::UnsupportedMethod(other.kind(), SNAP_CODE.into())),
        }
    }

    async fn cancel(&self, request: &PaymentRequest, _provider_ref: Option<&str>) -> Result<(), GatewayError> {
        match request.method {
            MethodSelection::VirtualAccount { .. } => {
                let customer_no = Self::customer_no(request)?;
                let body = DeleteVaRequest {
                    partner_service_id: self.config.partner_service_id.clone(),
                    customer_no: customer_no.clone(),
                    virtual_account_no: self.va_number(&customer_no),
                    trx_id: request.tx_id.as_str().to_string(),
                };
                let response: SnapEnvelope = self.post_signed(DELETE_VA_PATH, &body).await?;
                ensure_snap_success(&response.response_code, &response.response_message)?;
                info!("🌐️ Virtual account for {} deleted", request.tx_id);
                Ok(())
            },
            // The gateway offers no way to retract an issued QR code. It simply lapses.
            MethodSelection::Qris => Ok(()),
            other => Err(GatewayError::UnsupportedMethod(other.kind(), SNAP_CODE.into())),
        }
    }

    fn verify_callback(&self, callback: &InboundCallback) -> Result<(), GatewayError> {
        let timestamp = callback
            .header("x-timestamp")
            .ok_or_else(|| GatewayError::SignatureInvalid("X-TIMESTAMP header is missing".into()))?;
        let parsed = signing::parse_rfc3339_timestamp(timestamp)?;
        signing::check_freshness(parsed, self.tolerance)?;
        let signature = callback
            .header("x-signature")
            .ok_or_else(|| GatewayError::SignatureInvalid("X-SIGNATURE header is missing".into()))?;
        signing::verify_request(&self.verifying_key, "POST", callback.path(), callback.body(), timestamp, signature)?;
        Ok(())
    }

    fn parse_callback(&self, callback: &InboundCallback) -> Result<CanonicalCallbackEvent, GatewayError> {
        let notification: SnapPaymentNotification = serde_json::from_slice(callback.body())
            .map_err(|e| GatewayError::Protocol(format!("unparseable payment notification: {e}")))?;
        let status = payment_status_from_flag(notification.payment_flag_status.as_deref().unwrap_or("00"))?;
        let paid_amount = match &notification.paid_amount {
            Some(amount) => Some(
                Rupiah::from_provider_amount(&amount.value)
                    .map_err(|e| GatewayError::Protocol(format!("bad paidAmount: {e}")))?,
            ),
            None => None,
        };
        let paid_at = match &notification.trx_date_time {
            Some(ts) => Some(signing::parse_rfc3339_timestamp(ts).map_err(GatewayError::from)?),
            None => None,
        };
        let channel = notification
            .additional_info
            .as_ref()
            .and_then(|info| info.get("channel"))
            .and_then(Value::as_str)
            .map(String::from);
        let event_key = match &notification.payment_request_id {
            Some(id) => format!("snap:{id}"),
            None => format!("snap:sha256:{}", hex::encode(Sha256::digest(callback.body()))),
        };
        Ok(CanonicalCallbackEvent {
            tx_id: notification.trx_id.clone().into(),
            provider_ref: notification.payment_request_id.clone(),
            status,
            paid_amount,
            channel,
            reference: notification.reference_no.clone(),
            paid_at,
            event_key,
            raw: serde_json::from_slice(callback.body()).unwrap_or(Value::Null),
        })
    }

    fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::Json(serde_json::json!({ "responseCode": "2002500", "responseMessage": "Successful" }))
    }

    fn matches_callback(&self, callback: &InboundCallback) -> bool {
        callback
            .json()
            .map(|body| body.get("virtualAccountNo").is_some() && body.get("trxId").is_some())
            .unwrap_or(false)
    }
}

fn ensure_snap_success(code: &str, message: &str) -> Result<(), GatewayError> {
    if code.starts_with('2') {
        return Ok(());
    }
    let status = code.get(0..3).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);
    Err(GatewayError::UpstreamRejected { status, message: format!("{code}: {message}") })
}

/// A fresh numeric id for the `X-EXTERNAL-ID` header, unique per outbound request.
fn external_id() -> String {
    let mut rng = rand::thread_rng();
    (0..24).map(|_| char::from(b'0' + rng.gen_range(0u8..10))).collect()
}

//--------------------------------------   Wire types     ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapAmount {
    pub value: String,
    pub currency: String,
}

impl SnapAmount {
    fn idr(amount: Rupiah) -> Self {
        Self { value: amount.to_provider_amount(), currency: IDR_CURRENCY_CODE.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapEnvelope {
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    response_message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateVaRequest {
    partner_service_id: String,
    customer_no: String,
    virtual_account_no: String,
    virtual_account_name: String,
    trx_id: String,
    total_amount: SnapAmount,
    expired_date: String,
    additional_info: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVaResponse {
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    response_message: String,
    virtual_account_data: Option<CreatedVirtualAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedVirtualAccount {
    virtual_account_no: String,
    #[serde(default)]
    virtual_account_name: String,
    #[serde(default)]
    trx_id: String,
    #[serde(default)]
    expired_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VaStatusRequest {
    partner_service_id: String,
    customer_no: String,
    virtual_account_no: String,
    inquiry_request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaStatusResponse {
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    response_message: String,
    virtual_account_data: Option<VaStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaStatusData {
    #[serde(default)]
    payment_flag_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteVaRequest {
    partner_service_id: String,
    customer_no: String,
    virtual_account_no: String,
    trx_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QrisGenerateRequest {
    partner_reference_no: String,
    amount: SnapAmount,
    merchant_id: String,
    validity_period: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrisGenerateResponse {
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    response_message: String,
    #[serde(default)]
    reference_no: Option<String>,
    #[serde(default)]
    qr_content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QrisQueryRequest {
    original_partner_reference_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_reference_no: Option<String>,
    service_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrisQueryResponse {
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    response_message: String,
    #[serde(default)]
    latest_transaction_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapPaymentNotification {
    trx_id: String,
    #[serde(default)]
    payment_request_id: Option<String>,
    #[serde(default)]
    paid_amount: Option<SnapAmount>,
    #[serde(default)]
    trx_date_time: Option<String>,
    #[serde(default)]
    reference_no: Option<String>,
    #[serde(default)]
    payment_flag_status: Option<String>,
    #[serde(default)]
    additional_info: Option<Value>,
}
