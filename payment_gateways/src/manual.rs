//! The manual bank-transfer fallback. No provider sits behind this adapter: payment "creation"
//! hands the customer our own account details with a fresh transfer reference, and settlement
//! happens when an operator (or back-office tool) confirms receipt through the confirmation
//! endpoint, authenticated by a static token and an optional caller allowlist.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use lokapay_common::Rupiah;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::{
    config::{ManualConfig, DEFAULT_VA_EXPIRY_MINUTES},
    data_objects::{
        Acknowledgement,
        CallbackStatus,
        CanonicalCallbackEvent,
        InboundCallback,
        MethodKind,
        PaymentInstructions,
        PaymentRequest,
        PaymentResult,
    },
    errors::GatewayError,
    gateway::PaymentGateway,
};

pub const MANUAL_CODE: &str = "manual";

pub const CONFIRM_TOKEN_HEADER: &str = "x-lokapay-confirm-token";

const METHODS: &[MethodKind] = &[MethodKind::Manual];

pub struct ManualGateway {
    config: ManualConfig,
}

impl ManualGateway {
    pub fn new(config: ManualConfig) -> Self {
        Self { config }
    }
}

/// A fresh transfer reference for the customer to quote, e.g. `LKP-7F3K2M9QX1`.
fn transfer_reference() -> String {
    let suffix =
        thread_rng().sample_iter(&Alphanumeric).take(10).map(char::from).collect::<String>().to_uppercase();
    format!("LKP-{suffix}")
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    fn code(&self) -> &'static str {
        MANUAL_CODE
    }

    fn available_methods(&self) -> &[MethodKind] {
        METHODS
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResult, GatewayError> {
        if self.config.account_number.is_empty() {
            return Err(GatewayError::Configuration("LKP_MANUAL_ACCOUNT_NUMBER is not set".into()));
        }
        let reference = transfer_reference();
        let expires_at =
            Utc::now() + request.expires_in.unwrap_or_else(|| Duration::minutes(DEFAULT_VA_EXPIRY_MINUTES));
        debug!("💵️ Issued manual transfer reference {reference} for {}", request.tx_id);
        Ok(PaymentResult {
            provider_ref: Some(reference.clone()),
            instructions: PaymentInstructions::ManualTransfer {
                reference: reference.clone(),
                bank_name: self.config.bank_name.clone(),
                account_number: self.config.account_number.clone(),
                account_holder: self.config.account_holder.clone(),
            },
            expires_at,
            raw: serde_json::json!({ "reference": reference }),
        })
    }

    async fn check_status(
        &self,
        request: &PaymentRequest,
        _provider_ref: Option<&str>,
    ) -> Result<CallbackStatus, GatewayError> {
        // There is nothing to poll. A manual payment stays pending until someone confirms it.
        debug!("💵️ Status poll for manual payment {} answered locally", request.tx_id);
        Ok(CallbackStatus::Pending)
    }

    async fn cancel(&self, _request: &PaymentRequest, _provider_ref: Option<&str>) -> Result<(), GatewayError> {
        Ok(())
    }

    fn verify_callback(&self, callback: &InboundCallback) -> Result<(), GatewayError> {
        if let Some(allowlist) = &self.config.ip_allowlist {
            let addr = callback
                .remote_addr()
                .ok_or_else(|| GatewayError::SignatureInvalid("caller address is unknown".into()))?;
            if !allowlist.contains(&addr) {
                return Err(GatewayError::SignatureInvalid(format!("caller address {addr} is not on the allowlist")));
            }
        }
        let presented = callback
            .header(CONFIRM_TOKEN_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid(format!("{CONFIRM_TOKEN_HEADER} header is missing")))?;
        let expected = self.config.confirm_token()?;
        if presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
            return Err(GatewayError::SignatureInvalid("confirmation token mismatch".into()));
        }
        Ok(())
    }

    fn parse_callback(&self, callback: &InboundCallback) -> Result<CanonicalCallbackEvent, GatewayError> {
        let confirmation: ManualConfirmation = serde_json::from_slice(callback.body())
            .map_err(|e| GatewayError::Protocol(format!("unparseable confirmation: {e}")))?;
        let status = match confirmation.status.as_deref() {
            None | Some("success") => CallbackStatus::Success,
            Some("failed") => CallbackStatus::Failed,
            Some("cancelled") => CallbackStatus::Cancelled,
            Some(other) => {
                return Err(GatewayError::Protocol(format!("unknown confirmation status '{other}'")));
            },
        };
        let event_key = format!("manual:{}:{status}", confirmation.tx_id);
        Ok(CanonicalCallbackEvent {
            tx_id: confirmation.tx_id.clone().into(),
            provider_ref: confirmation.reference.clone(),
            status,
            paid_amount: confirmation.amount.map(Rupiah::new),
            channel: Some(MANUAL_CODE.into()),
            reference: confirmation.reference.clone(),
            paid_at: confirmation.paid_at,
            event_key,
            raw: serde_json::from_slice(callback.body()).unwrap_or(Value::Null),
        })
    }

    fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::Json(serde_json::json!({ "success": true, "message": "Confirmation received" }))
    }

    /// Manual confirmations only ever arrive on their dedicated path.
    fn matches_callback(&self, _callback: &InboundCallback) -> bool {
        false
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ManualConfirmation {
    tx_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    paid_at: Option<chrono::DateTime<Utc>>,
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};

    use lokapay_common::TxId;

    use super::*;
    use crate::data_objects::MethodSelection;

    fn test_config() -> ManualConfig {
        let mut config = ManualConfig::default();
        config.bank_name = "BCA".into();
        config.account_number = "8720011223".into();
        config.account_holder = "PT Lokapay Indonesia".into();
        config.with_confirm_token("tok_manual_secret")
    }

    #[tokio::test]
    async fn instructions_carry_our_account_and_a_fresh_reference() {
        let gateway = ManualGateway::new(test_config());
        let request =
            PaymentRequest::new("tx-77", "cust-3", Rupiah::new(150_000), MethodSelection::Manual);
        let result = gateway.create_payment(&request).await.unwrap();
        match &result.instructions {
            PaymentInstructions::ManualTransfer { reference, bank_name, account_number, account_holder } => {
                assert!(reference.starts_with("LKP-"));
                assert_eq!(reference.len(), 14);
                assert_eq!(bank_name, "BCA");
                assert_eq!(account_number, "8720011223");
                assert_eq!(account_holder, "PT Lokapay Indonesia");
                assert_eq!(result.provider_ref.as_deref(), Some(reference.as_str()));
            },
            other => panic!("expected manual transfer instructions, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_account_number_is_a_configuration_error() {
        let gateway = ManualGateway::new(ManualConfig::default().with_confirm_token("t"));
        let request = PaymentRequest::new("tx-1", "c", Rupiah::new(1000), MethodSelection::Manual);
        assert!(matches!(gateway.create_payment(&request).await, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn confirmation_token_is_required_and_checked() {
        let gateway = ManualGateway::new(test_config());
        let body = br#"{"tx_id": "tx-77"}"#.to_vec();
        let good = InboundCallback::new("/callback/manual", vec![(CONFIRM_TOKEN_HEADER, "tok_manual_secret")], body.clone());
        gateway.verify_callback(&good).unwrap();
        let bad = InboundCallback::new("/callback/manual", vec![(CONFIRM_TOKEN_HEADER, "tok_wrong")], body.clone());
        assert!(matches!(gateway.verify_callback(&bad), Err(GatewayError::SignatureInvalid(_))));
        let missing = InboundCallback::new("/callback/manual", Vec::<(&str, &str)>::new(), body);
        assert!(matches!(gateway.verify_callback(&missing), Err(GatewayError::SignatureInvalid(_))));
    }

    #[test]
    fn allowlist_restricts_callers_when_configured() {
        let mut config = test_config();
        config.ip_allowlist = Some(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]);
        let gateway = ManualGateway::new(config);
        let body = br#"{"tx_id": "tx-77"}"#.to_vec();
        let from_allowed = InboundCallback::new("/callback/manual", vec![(CONFIRM_TOKEN_HEADER, "tok_manual_secret")], body.clone())
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        gateway.verify_callback(&from_allowed).unwrap();
        let from_elsewhere = InboundCallback::new("/callback/manual", vec![(CONFIRM_TOKEN_HEADER, "tok_manual_secret")], body.clone())
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
        assert!(gateway.verify_callback(&from_elsewhere).is_err());
        let anonymous =
            InboundCallback::new("/callback/manual", vec![(CONFIRM_TOKEN_HEADER, "tok_manual_secret")], body);
        assert!(gateway.verify_callback(&anonymous).is_err());
    }

    #[test]
    fn confirmations_parse_into_canonical_events() {
        let gateway = ManualGateway::new(test_config());
        let body = br#"{
            "tx_id": "tx-77",
            "amount": 150000,
            "reference": "LKP-AB12CD34EF",
            "paid_at": "2026-08-25T03:00:00Z"
        }"#;
        let callback = InboundCallback::new("/callback/manual", Vec::<(&str, &str)>::new(), body.to_vec());
        let event = gateway.parse_callback(&callback).unwrap();
        assert_eq!(event.tx_id, TxId::from("tx-77"));
        assert_eq!(event.status, CallbackStatus::Success);
        assert_eq!(event.paid_amount, Some(Rupiah::new(150_000)));
        assert_eq!(event.reference.as_deref(), Some("LKP-AB12CD34EF"));
        assert_eq!(event.event_key, "manual:tx-77:success");

        let rejected = br#"{"tx_id": "tx-78", "status": "failed"}"#;
        let callback = InboundCallback::new("/callback/manual", Vec::<(&str, &str)>::new(), rejected.to_vec());
        assert_eq!(gateway.parse_callback(&callback).unwrap().status, CallbackStatus::Failed);

        let nonsense = br#"{"tx_id": "tx-79", "status": "perhaps"}"#;
        let callback = InboundCallback::new("/callback/manual", Vec::<(&str, &str)>::new(), nonsense.to_vec());
        assert!(matches!(gateway.parse_callback(&callback), Err(GatewayError::Protocol(_))));
    }

    #[test]
    fn manual_never_claims_unattributed_callbacks() {
        let gateway = ManualGateway::new(test_config());
        let callback =
            InboundCallback::new("/callback", Vec::<(&str, &str)>::new(), br#"{"tx_id": "tx-1"}"#.to_vec());
        assert!(!gateway.matches_callback(&callback));
    }
}
