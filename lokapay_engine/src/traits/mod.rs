//! # Backend traits for the Lokapay payment engine
//!
//! Specific storage backends (SQLite today, Postgres-ready tomorrow) implement these traits to
//! act as the engine's persistence layer. The engine APIs ([`crate::ReconcilerApi`],
//! [`crate::WebhookDispatcher`]) are generic over them, which also makes the route handlers in
//! the server crate mockable.
//!
//! * [`TransactionManagement`] — transaction lifecycle, inbound-callback dedupe and account
//!   balances. The conditional-update settlement methods live here; they are the only code path
//!   that may move a transaction out of `pending`.
//! * [`DeliveryManagement`] — webhook delivery bookkeeping. Attempt-count-guarded updates keep
//!   a racing retry sweep and immediate attempt from double-recording a single attempt.

mod delivery_management;
mod transaction_management;

pub use delivery_management::DeliveryManagement;
pub use transaction_management::{PaymentEngineError, TransactionManagement};
