use async_trait::async_trait;

use crate::{
    data_objects::{
        Acknowledgement,
        CanonicalCallbackEvent,
        CallbackStatus,
        InboundCallback,
        MethodKind,
        PaymentRequest,
        PaymentResult,
    },
    errors::GatewayError,
};

/// The capability set every payment provider adapter implements.
///
/// Adapters are stateless beyond their configuration and HTTP client, so a single instance is
/// shared across the server (`Arc<dyn PaymentGateway>`). All network calls run under the
/// configured client timeout; a timed-out or unreachable provider surfaces as
/// [`GatewayError::GatewayUnavailable`], never as a hang.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The short stable code identifying this provider ("snap", "kiospay", "manual"). Used in
    /// configuration, logs and persisted transactions.
    fn code(&self) -> &'static str;

    /// The payment method types this adapter can create.
    fn available_methods(&self) -> &[MethodKind];

    /// Create a payment with the provider. The request has already been validated and completed
    /// with defaults by the facade.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResult, GatewayError>;

    /// Ask the provider for the current status of a payment it created.
    async fn check_status(&self, request: &PaymentRequest, provider_ref: Option<&str>) -> Result<CallbackStatus, GatewayError>;

    /// Cancel a payable payment at the provider. Succeeds silently if the provider has no
    /// cancel facility for the method.
    async fn cancel(&self, request: &PaymentRequest, provider_ref: Option<&str>) -> Result<(), GatewayError>;

    /// Authenticate an inbound callback before anything in it is trusted. Freshness is checked
    /// before the signature; failures map to [`GatewayError::TimestampStale`] and
    /// [`GatewayError::SignatureInvalid`].
    fn verify_callback(&self, callback: &InboundCallback) -> Result<(), GatewayError>;

    /// Translate a verified callback body into the canonical event form.
    fn parse_callback(&self, callback: &InboundCallback) -> Result<CanonicalCallbackEvent, GatewayError>;

    /// The exact response body this provider expects from a callback endpoint.
    fn acknowledgement(&self) -> Acknowledgement;

    /// Whether an unattributed callback (arriving on the shared endpoint) looks like this
    /// provider's format. Purely structural; never consults signatures.
    fn matches_callback(&self, callback: &InboundCallback) -> bool;
}
