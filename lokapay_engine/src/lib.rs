//! Lokapay Payment Engine
//!
//! The payment engine holds everything about a payment that outlives a single HTTP request:
//! transaction records, customer balances, the callback dedupe log, and webhook delivery
//! bookkeeping. It is provider-agnostic; gateway adapters normalise provider callbacks into
//! canonical events before anything in this crate sees them.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@traits`] and its SQLite implementation). You should
//!    never need to access the database directly. Instead, use the public API provided by the
//!    payment engine. The exception is the data types used in the database. These are defined in
//!    the [`mod@db_types`] module and are public.
//! 2. The payment engine public API ([`mod@lpe_api`]). The [`ReconcilerApi`] is the only code
//!    path that moves a transaction out of `pending` (and credits the matching account); the
//!    [`WebhookDispatcher`] fans events out to subscriber endpoints and owns the retry schedule.
//!
//! The engine also provides a set of events that can be subscribed to. When the reconciler
//! settles or closes a transaction it emits a [`events::PaymentSettledEvent`] or
//! [`events::PaymentClosedEvent`]; the server hooks into these to turn payment outcomes into
//! outbound webhooks.

pub mod db_types;
pub mod events;
pub mod lpe_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use lpe_api::{
    dispatch_api::WebhookDispatcher,
    dispatch_objects::{DispatcherConfig, RetryPolicy, SubscriberEndpoint},
    reconciler_api::{ReconcileOutcome, ReconcilerApi},
    transaction_objects::TransactionFilter,
};
pub use traits::{DeliveryManagement, PaymentEngineError, TransactionManagement};
