//! # Lokapay payment engine public API
//!
//! The `lpe_api` module exposes the programmatic API for the Lokapay payment engine. The pattern
//! for using the APIs is the same everywhere: an API instance is created by supplying a database
//! backend that implements the backend traits the API requires.
//!
//! * [`reconciler_api`] applies canonical callback events to stored transactions. It is the only
//!   code path that moves a transaction out of `pending`, and it fires the settled/closed event
//!   hooks the server bridges into outbound webhooks.
//! * [`dispatch_api`] emits webhook events to subscriber endpoints and keeps the delivery/retry
//!   bookkeeping.
//!
//! The other submodules hold the support objects for those APIs.

pub mod dispatch_api;
pub mod dispatch_objects;
pub mod reconciler_api;
pub mod transaction_objects;

pub use dispatch_api::WebhookDispatcher;
pub use dispatch_objects::{DispatcherConfig, RetryPolicy, SubscriberEndpoint};
pub use reconciler_api::{ReconcileOutcome, ReconcilerApi};
pub use transaction_objects::TransactionFilter;
