//! # Lokapay payment gateways
//!
//! Provider-agnostic payment-gateway clients for the Lokapay payment server. Each supported
//! provider implements the [`PaymentGateway`] capability trait: creating a payment, polling its
//! status, cancelling it, verifying and parsing inbound callbacks, and producing the exact
//! acknowledgement body the provider requires from a callback endpoint.
//!
//! The crate is organised as:
//! * [`signing`] — the pure signature engine (RSA request signing, HMAC payload signing,
//!   timestamp freshness), shared by the adapters and by the webhook dispatcher upstream.
//! * [`snap`], [`kiospay`], [`manual`] — one module per provider.
//! * [`GatewayRegistry`] — builds and caches one adapter instance per configured provider.
//! * [`PaymentFacade`] — the single entry point for payment creation: validates the request,
//!   applies configured defaults and delegates to the selected adapter without any
//!   provider-specific branching.

mod config;
mod data_objects;
mod errors;
mod facade;
mod gateway;
mod registry;

pub mod kiospay;
pub mod manual;
pub mod signing;
pub mod snap;

pub use config::{GatewaysConfig, KiospayConfig, ManualConfig, PaymentDefaults, SnapConfig};
pub use data_objects::{
    Acknowledgement,
    Bank,
    CallbackStatus,
    CanonicalCallbackEvent,
    CustomerInfo,
    InboundCallback,
    LineItem,
    MethodKind,
    MethodSelection,
    PaymentInstructions,
    PaymentRequest,
    PaymentResult,
    Rupiah,
    TxId,
    Wallet,
};
pub use errors::GatewayError;
pub use facade::{CreatedPayment, PaymentFacade};
pub use gateway::PaymentGateway;
pub use registry::GatewayRegistry;
