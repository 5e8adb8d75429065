use thiserror::Error;

use crate::{data_objects::MethodKind, signing::SigningError};

/// The error taxonomy shared by every gateway adapter.
///
/// Callers need to distinguish retryable failures ([`GatewayError::GatewayUnavailable`]) from
/// terminal ones, and callback handlers need to tell authentication failures
/// ([`GatewayError::SignatureInvalid`] / [`GatewayError::TimestampStale`]) apart from everything
/// else, so the kinds are explicit variants rather than a stringly-typed catch-all.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway configuration error: {0}")]
    Configuration(String),
    #[error("Invalid payment request: {0}")]
    Validation(String),
    #[error("Callback signature is invalid: {0}")]
    SignatureInvalid(String),
    #[error("Callback timestamp is outside the accepted window: {0}")]
    TimestampStale(String),
    #[error("The payment gateway could not be reached: {0}")]
    GatewayUnavailable(String),
    #[error("The gateway rejected the request. Status {status}: {message}")]
    UpstreamRejected { status: u16, message: String },
    #[error("Payment method {0} is not offered by gateway {1}")]
    UnsupportedMethod(MethodKind, String),
    #[error("Unexpected gateway response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// True when retrying the same call later could succeed (the transaction stays `pending`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::GatewayUnavailable(_))
    }

    /// Maps a reqwest failure onto the taxonomy: anything that prevented a response from
    /// arriving (timeouts, connection resets, DNS) is `GatewayUnavailable`.
    pub fn from_transport(e: reqwest::Error) -> Self {
        GatewayError::GatewayUnavailable(e.to_string())
    }
}

impl From<SigningError> for GatewayError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::TimestampStale(msg) => GatewayError::TimestampStale(msg),
            SigningError::SignatureInvalid(msg) => GatewayError::SignatureInvalid(msg),
            SigningError::KeyRejected(msg) => GatewayError::Configuration(msg),
            SigningError::Malformed(msg) => GatewayError::SignatureInvalid(msg),
        }
    }
}
