use std::{collections::HashMap, fmt::Display, net::IpAddr, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use lokapay_common::{MethodKind, Rupiah, TxId};

//--------------------------------------       Bank        -----------------------------------------------------------

/// Indonesian banks the platform can address for virtual-account payments. Each adapter maps
/// these onto its own channel codes; an unmapped bank is a configuration error for that adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bank {
    Bri,
    Mandiri,
    Bni,
    Permata,
    Bca,
    Cimb,
}

impl Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bank::Bri => write!(f, "BRI"),
            Bank::Mandiri => write!(f, "Mandiri"),
            Bank::Bni => write!(f, "BNI"),
            Bank::Permata => write!(f, "Permata"),
            Bank::Bca => write!(f, "BCA"),
            Bank::Cimb => write!(f, "CIMB"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown bank: {0}")]
pub struct BankConversionError(String);

impl FromStr for Bank {
    type Err = BankConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BRI" => Ok(Self::Bri),
            "MANDIRI" => Ok(Self::Mandiri),
            "BNI" => Ok(Self::Bni),
            "PERMATA" => Ok(Self::Permata),
            "BCA" => Ok(Self::Bca),
            "CIMB" => Ok(Self::Cimb),
            s => Err(BankConversionError(s.to_string())),
        }
    }
}

//--------------------------------------      Wallet       -----------------------------------------------------------

/// E-wallet brands for the e-wallet flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Wallet {
    Ovo,
    Dana,
    Gopay,
    Shopeepay,
    Linkaja,
}

impl Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Wallet::Ovo => write!(f, "OVO"),
            Wallet::Dana => write!(f, "DANA"),
            Wallet::Gopay => write!(f, "GoPay"),
            Wallet::Shopeepay => write!(f, "ShopeePay"),
            Wallet::Linkaja => write!(f, "LinkAja"),
        }
    }
}

//--------------------------------------  MethodSelection  -----------------------------------------------------------

/// The caller's choice of payment method, with the channel payload (bank or wallet brand) where
/// one is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MethodSelection {
    Checkout,
    VirtualAccount { bank: Bank },
    Ewallet { wallet: Wallet },
    Qris,
    Manual,
}

impl MethodSelection {
    pub fn kind(&self) -> MethodKind {
        match self {
            MethodSelection::Checkout => MethodKind::Checkout,
            MethodSelection::VirtualAccount { .. } => MethodKind::VirtualAccount,
            MethodSelection::Ewallet { .. } => MethodKind::EWallet,
            MethodSelection::Qris => MethodKind::Qris,
            MethodSelection::Manual => MethodKind::Manual,
        }
    }
}

impl Display for MethodSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodSelection::VirtualAccount { bank } => write!(f, "virtual_account/{bank}"),
            MethodSelection::Ewallet { wallet } => write!(f, "ewallet/{wallet}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

//--------------------------------------  PaymentRequest   -----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub price: Rupiah,
}

/// A payment to be created against the active gateway. Built by the caller, completed with
/// configured defaults by the [`crate::PaymentFacade`], and immutable once sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub tx_id: TxId,
    pub customer_id: String,
    pub amount: Rupiah,
    pub method: MethodSelection,
    pub customer: CustomerInfo,
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// How long the payment stays payable. `None` means "use the configured default for this
    /// method type".
    #[serde(default, with = "optional_minutes")]
    pub expires_in: Option<Duration>,
    /// Where the customer lands after a hosted-checkout flow completes.
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl PaymentRequest {
    pub fn new(tx_id: impl Into<TxId>, customer_id: impl Into<String>, amount: Rupiah, method: MethodSelection) -> Self {
        Self {
            tx_id: tx_id.into(),
            customer_id: customer_id.into(),
            amount,
            method,
            customer: CustomerInfo { name: String::new(), email: None, phone: String::new() },
            items: Vec::new(),
            expires_in: None,
            redirect_url: None,
            metadata: Value::Null,
        }
    }

    pub fn with_customer(mut self, name: impl Into<String>, email: Option<String>, phone: impl Into<String>) -> Self {
        self.customer = CustomerInfo { name: name.into(), email, phone: phone.into() };
        self
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_expiry(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

/// Serde representation for `Option<chrono::Duration>` as whole minutes, matching the API shape
/// (`"expires_in": 1440`).
mod optional_minutes {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.num_minutes()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let mins = Option::<i64>::deserialize(de)?;
        Ok(mins.map(Duration::minutes))
    }
}

//--------------------------------------  PaymentResult    -----------------------------------------------------------

/// What the customer must do to complete the payment. Exactly one variant per created payment,
/// depending on the method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInstructions {
    Redirect { url: String },
    VirtualAccount { number: String, holder: String, bank_code: String, bank_name: String },
    QrCode { payload: String },
    Ewallet { deeplink: String },
    ManualTransfer { reference: String, bank_name: String, account_number: String, account_holder: String },
}

/// A successfully created payment. Failures are [`crate::GatewayError`] values, never encoded
/// inside this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    /// The id the provider assigned to this payment, when it assigns one.
    pub provider_ref: Option<String>,
    pub instructions: PaymentInstructions,
    pub expires_at: DateTime<Utc>,
    /// The provider's response verbatim, retained for audits.
    pub raw: Value,
}

//-------------------------------------- Callback types    -----------------------------------------------------------

/// Canonical, provider-independent status in a payment notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Cancelled,
}

impl Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackStatus::Pending => write!(f, "pending"),
            CallbackStatus::Success => write!(f, "success"),
            CallbackStatus::Failed => write!(f, "failed"),
            CallbackStatus::Expired => write!(f, "expired"),
            CallbackStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CallbackStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallbackStatus::Pending)
    }
}

/// The normalized form of a provider payment notification. Only adapter `parse_callback`
/// implementations construct this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalCallbackEvent {
    pub tx_id: TxId,
    pub provider_ref: Option<String>,
    pub status: CallbackStatus,
    pub paid_amount: Option<Rupiah>,
    /// The channel the customer actually paid through, in the provider's vocabulary.
    pub channel: Option<String>,
    /// The provider's settlement/reference number for the payment leg.
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Uniquely identifies this notification for replay detection. Derived from the provider's
    /// own notification id where it supplies one.
    pub event_key: String,
    /// The notification verbatim, retained for audits.
    pub raw: Value,
}

/// An inbound callback request reduced to what adapters need: the request path, headers
/// (ASCII-lowercased names), the raw body bytes and the caller's address. Keeps the HTTP
/// framework out of the adapter crate.
#[derive(Debug, Clone, Default)]
pub struct InboundCallback {
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    remote_addr: Option<IpAddr>,
}

impl InboundCallback {
    pub fn new<I, K, V>(path: impl Into<String>, headers: I, body: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.as_ref().to_string()))
            .collect::<HashMap<_, _>>();
        Self { path: path.into(), headers, body, remote_addr: None }
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// The path this callback was POSTed to, exactly as the provider signed it.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

//-------------------------------------- Acknowledgement   -----------------------------------------------------------

/// The exact response body a provider expects back from its callback endpoint. Getting this
/// wrong makes the provider retry the notification indefinitely, so each adapter produces its
/// own, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// A structured JSON object with fixed response-code/message strings.
    Json(Value),
    /// A literal short text token.
    Text(&'static str),
}

impl Acknowledgement {
    pub fn content_type(&self) -> &'static str {
        match self {
            Acknowledgement::Json(_) => "application/json",
            Acknowledgement::Text(_) => "text/plain; charset=utf-8",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Acknowledgement::Json(v) => v.to_string(),
            Acknowledgement::Text(t) => (*t).to_string(),
        }
    }
}
