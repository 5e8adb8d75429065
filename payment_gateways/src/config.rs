use std::{env, fmt::Display, net::IpAddr, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::warn;
use lokapay_common::{parse_boolean_flag, MethodKind, Rupiah, Secret};
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    RsaPrivateKey,
    RsaPublicKey,
};

use crate::{errors::GatewayError, signing::DEFAULT_TIMESTAMP_TOLERANCE};

pub const DEFAULT_GATEWAY: &str = "manual";
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_CHECKOUT_EXPIRY_MINUTES: i64 = 180;
pub const DEFAULT_VA_EXPIRY_MINUTES: i64 = 1440;
pub const DEFAULT_REDIRECT_URL: &str = "https://pay.lokapay.id/complete";

/// Configuration for every supported gateway, plus the cross-provider payment defaults.
///
/// Loaded once at startup from `LKP_*` environment variables. Missing optional values fall back
/// to defaults with a warning; missing *secrets* are only an error when the adapter that needs
/// them is actually constructed.
#[derive(Debug, Clone)]
pub struct GatewaysConfig {
    /// Code of the provider that payment creation routes to ("snap", "kiospay" or "manual").
    pub active_gateway: String,
    /// When false, the active gateway is bypassed and all payments fall back to manual
    /// bank-transfer instructions.
    pub gateway_enabled: bool,
    /// Maximum age, in seconds, of a signed timestamp before it is rejected as stale.
    pub timestamp_tolerance: i64,
    /// Hard deadline on every outbound provider call.
    pub http_timeout: StdDuration,
    pub defaults: PaymentDefaults,
    pub snap: SnapConfig,
    pub kiospay: KiospayConfig,
    pub manual: ManualConfig,
}

impl Default for GatewaysConfig {
    fn default() -> Self {
        Self {
            active_gateway: DEFAULT_GATEWAY.into(),
            gateway_enabled: true,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            defaults: PaymentDefaults::default(),
            snap: SnapConfig::default(),
            kiospay: KiospayConfig::default(),
            manual: ManualConfig::default(),
        }
    }
}

impl GatewaysConfig {
    pub fn from_env_or_default() -> Self {
        let active_gateway = env_or_default("LKP_GATEWAY", DEFAULT_GATEWAY);
        let gateway_enabled = parse_boolean_flag(env::var("LKP_GATEWAY_ENABLED").ok(), true);
        let timestamp_tolerance = env_parse_or("LKP_TIMESTAMP_TOLERANCE", DEFAULT_TIMESTAMP_TOLERANCE);
        let http_timeout = StdDuration::from_secs(env_parse_or("LKP_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECONDS));
        Self {
            active_gateway,
            gateway_enabled,
            timestamp_tolerance,
            http_timeout,
            defaults: PaymentDefaults::from_env_or_default(),
            snap: SnapConfig::from_env_or_default(),
            kiospay: KiospayConfig::from_env_or_default(),
            manual: ManualConfig::from_env_or_default(),
        }
    }
}

//--------------------------------------  PaymentDefaults  -----------------------------------------------------------

/// Defaults applied by the facade to every payment request that does not set its own values.
#[derive(Debug, Clone)]
pub struct PaymentDefaults {
    pub checkout_expiry: Duration,
    pub va_expiry: Duration,
    pub redirect_url: String,
    /// Paid-amount discrepancies up to this value are logged but still credited.
    pub amount_tolerance: Rupiah,
}

impl Default for PaymentDefaults {
    fn default() -> Self {
        Self {
            checkout_expiry: Duration::minutes(DEFAULT_CHECKOUT_EXPIRY_MINUTES),
            va_expiry: Duration::minutes(DEFAULT_VA_EXPIRY_MINUTES),
            redirect_url: DEFAULT_REDIRECT_URL.into(),
            amount_tolerance: Rupiah::new(0),
        }
    }
}

impl PaymentDefaults {
    pub fn from_env_or_default() -> Self {
        let checkout_expiry = Duration::minutes(env_parse_or("LKP_CHECKOUT_EXPIRY", DEFAULT_CHECKOUT_EXPIRY_MINUTES));
        let va_expiry = Duration::minutes(env_parse_or("LKP_VA_EXPIRY", DEFAULT_VA_EXPIRY_MINUTES));
        let redirect_url = env_or_default("LKP_DEFAULT_REDIRECT_URL", DEFAULT_REDIRECT_URL);
        let amount_tolerance = Rupiah::new(env_parse_or("LKP_AMOUNT_TOLERANCE", 0i64));
        Self { checkout_expiry, va_expiry, redirect_url, amount_tolerance }
    }

    /// The configured expiry window for a given method type. Offline methods (virtual accounts,
    /// manual transfers) get the long window; interactive ones the short.
    pub fn expiry_for(&self, kind: MethodKind) -> Duration {
        match kind {
            MethodKind::VirtualAccount | MethodKind::Manual => self.va_expiry,
            MethodKind::Checkout | MethodKind::EWallet | MethodKind::Qris => self.checkout_expiry,
        }
    }
}

//--------------------------------------    SnapConfig     -----------------------------------------------------------

/// Credentials and endpoints for the BI-SNAP bank gateway.
#[derive(Debug, Clone, Default)]
pub struct SnapConfig {
    pub base_url: String,
    /// Partner id issued by the gateway, sent as `X-PARTNER-ID`.
    pub partner_id: String,
    /// Device/channel id issued by the gateway, sent as `CHANNEL-ID`.
    pub channel_id: String,
    /// The 8-character partner service id that prefixes every virtual account number.
    pub partner_service_id: String,
    private_key: Option<Secret<String>>,
    gateway_public_key: Option<String>,
}

impl SnapConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env_or_default("LKP_SNAP_BASE_URL", "https://api.snap-gateway.example");
        let partner_id = env_or_default("LKP_SNAP_PARTNER_ID", "");
        let channel_id = env_or_default("LKP_SNAP_CHANNEL_ID", "95221");
        let partner_service_id = env_or_default("LKP_SNAP_PARTNER_SERVICE_ID", "");
        let private_key = env::var("LKP_SNAP_PRIVATE_KEY").ok().map(Secret::new);
        if private_key.is_none() {
            warn!("🪛️ LKP_SNAP_PRIVATE_KEY is not set. SNAP requests cannot be signed until it is.");
        }
        let gateway_public_key = env::var("LKP_SNAP_GATEWAY_PUBLIC_KEY").ok();
        if gateway_public_key.is_none() {
            warn!("🪛️ LKP_SNAP_GATEWAY_PUBLIC_KEY is not set. SNAP callbacks cannot be verified until it is.");
        }
        Self { base_url, partner_id, channel_id, partner_service_id, private_key, gateway_public_key }
    }

    pub fn with_private_key(mut self, pem_or_path: impl Into<String>) -> Self {
        self.private_key = Some(Secret::new(pem_or_path.into()));
        self
    }

    pub fn with_gateway_public_key(mut self, pem_or_path: impl Into<String>) -> Self {
        self.gateway_public_key = Some(pem_or_path.into());
        self
    }

    /// Our RSA signing key, parsed from the configured PEM (inline or a file path).
    pub fn signing_key(&self) -> Result<RsaPrivateKey, GatewayError> {
        let material = self
            .private_key
            .as_ref()
            .ok_or_else(|| GatewayError::Configuration("LKP_SNAP_PRIVATE_KEY is not set".into()))?;
        let pem = pem_material("LKP_SNAP_PRIVATE_KEY", material.reveal())?;
        RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| GatewayError::Configuration(format!("LKP_SNAP_PRIVATE_KEY is not a valid PKCS8 RSA key: {e}")))
    }

    /// The gateway's RSA public key, for authenticating its callbacks.
    pub fn verifying_key(&self) -> Result<RsaPublicKey, GatewayError> {
        let material = self
            .gateway_public_key
            .as_ref()
            .ok_or_else(|| GatewayError::Configuration("LKP_SNAP_GATEWAY_PUBLIC_KEY is not set".into()))?;
        let pem = pem_material("LKP_SNAP_GATEWAY_PUBLIC_KEY", material)?;
        RsaPublicKey::from_public_key_pem(&pem).map_err(|e| {
            GatewayError::Configuration(format!("LKP_SNAP_GATEWAY_PUBLIC_KEY is not a valid RSA public key: {e}"))
        })
    }
}

//--------------------------------------   KiospayConfig   -----------------------------------------------------------

/// Credentials for the KiosPay aggregator (hosted checkout + e-wallets).
#[derive(Debug, Clone, Default)]
pub struct KiospayConfig {
    pub base_url: String,
    api_key: Option<Secret<String>>,
    callback_secret: Option<Secret<String>>,
}

impl KiospayConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env_or_default("LKP_KIOSPAY_BASE_URL", "https://api.kiospay.example");
        let api_key = env::var("LKP_KIOSPAY_API_KEY").ok().map(Secret::new);
        if api_key.is_none() {
            warn!("🪛️ LKP_KIOSPAY_API_KEY is not set. KiosPay payments cannot be created until it is.");
        }
        let callback_secret = env::var("LKP_KIOSPAY_CALLBACK_SECRET").ok().map(Secret::new);
        if callback_secret.is_none() {
            warn!("🪛️ LKP_KIOSPAY_CALLBACK_SECRET is not set. KiosPay callbacks cannot be verified until it is.");
        }
        Self { base_url, api_key, callback_secret }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(key.into()));
        self
    }

    pub fn with_callback_secret(mut self, secret: impl Into<String>) -> Self {
        self.callback_secret = Some(Secret::new(secret.into()));
        self
    }

    pub fn api_key(&self) -> Result<&str, GatewayError> {
        self.api_key
            .as_ref()
            .map(|s| s.reveal().as_str())
            .ok_or_else(|| GatewayError::Configuration("LKP_KIOSPAY_API_KEY is not set".into()))
    }

    pub fn callback_secret(&self) -> Result<&str, GatewayError> {
        self.callback_secret
            .as_ref()
            .map(|s| s.reveal().as_str())
            .ok_or_else(|| GatewayError::Configuration("LKP_KIOSPAY_CALLBACK_SECRET is not set".into()))
    }
}

//--------------------------------------   ManualConfig    -----------------------------------------------------------

/// Static details for the manual bank-transfer fallback.
#[derive(Debug, Clone, Default)]
pub struct ManualConfig {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    confirm_token: Option<Secret<String>>,
    /// When set, manual confirmation callbacks are only accepted from these addresses.
    pub ip_allowlist: Option<Vec<IpAddr>>,
}

impl ManualConfig {
    pub fn from_env_or_default() -> Self {
        let bank_name = env_or_default("LKP_MANUAL_BANK_NAME", "BCA");
        let account_number = env_or_default("LKP_MANUAL_ACCOUNT_NUMBER", "");
        let account_holder = env_or_default("LKP_MANUAL_ACCOUNT_HOLDER", "PT Lokapay Indonesia");
        let confirm_token = env::var("LKP_MANUAL_CONFIRM_TOKEN").ok().map(Secret::new);
        if confirm_token.is_none() {
            warn!("🪛️ LKP_MANUAL_CONFIRM_TOKEN is not set. Manual payment confirmations will be rejected.");
        }
        let ip_allowlist = env::var("LKP_MANUAL_IP_ALLOWLIST").ok().map(|csv| {
            csv.split(',')
                .filter_map(|ip| match ip.trim().parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        warn!("🪛️ Ignoring invalid address in LKP_MANUAL_IP_ALLOWLIST: {ip}");
                        None
                    },
                })
                .collect::<Vec<IpAddr>>()
        });
        Self { bank_name, account_number, account_holder, confirm_token, ip_allowlist }
    }

    pub fn with_confirm_token(mut self, token: impl Into<String>) -> Self {
        self.confirm_token = Some(Secret::new(token.into()));
        self
    }

    pub fn confirm_token(&self) -> Result<&str, GatewayError> {
        self.confirm_token
            .as_ref()
            .map(|s| s.reveal().as_str())
            .ok_or_else(|| GatewayError::Configuration("LKP_MANUAL_CONFIRM_TOKEN is not set".into()))
    }
}

//--------------------------------------      Helpers      -----------------------------------------------------------

fn env_or_default(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| {
        warn!("🪛️ {var} is not set. Using the default, '{default}'.");
        default.to_string()
    })
}

fn env_parse_or<T>(var: &str, default: T) -> T
where T: FromStr + Display {
    match env::var(var) {
        Ok(v) => v.parse::<T>().unwrap_or_else(|_| {
            warn!("🪛️ {var} ('{v}') could not be parsed. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    }
}

/// Key material may be supplied inline as a PEM block, or as a path to a PEM file.
fn pem_material(var: &str, value: &str) -> Result<String, GatewayError> {
    if value.trim_start().starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }
    std::fs::read_to_string(value)
        .map_err(|e| GatewayError::Configuration(format!("{var} points at '{value}', which cannot be read: {e}")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inline_pem_is_used_verbatim() {
        let pem = "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n";
        assert_eq!(pem_material("LKP_TEST", pem).unwrap(), pem);
    }

    #[test]
    fn missing_key_file_is_a_configuration_error() {
        let err = pem_material("LKP_TEST", "/no/such/key.pem").unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn expiry_windows_follow_method_type() {
        let defaults = PaymentDefaults::default();
        assert_eq!(defaults.expiry_for(MethodKind::Checkout), Duration::minutes(180));
        assert_eq!(defaults.expiry_for(MethodKind::EWallet), Duration::minutes(180));
        assert_eq!(defaults.expiry_for(MethodKind::Qris), Duration::minutes(180));
        assert_eq!(defaults.expiry_for(MethodKind::VirtualAccount), Duration::minutes(1440));
        assert_eq!(defaults.expiry_for(MethodKind::Manual), Duration::minutes(1440));
    }

    #[test]
    fn missing_secrets_error_lazily() {
        let cfg = KiospayConfig::default();
        assert!(matches!(cfg.api_key(), Err(GatewayError::Configuration(_))));
        let cfg = cfg.with_api_key("kp_live_123");
        assert_eq!(cfg.api_key().unwrap(), "kp_live_123");
    }
}
