//! # Lokapay server
//! This module hosts the HTTP surface of the payment subsystem. It is responsible for:
//! Receiving payment callbacks from the configured providers, verifying and acknowledging them.
//! Exposing the internal REST API for creating, querying and cancelling payments.
//! Turning settled and closed payments into outbound webhooks, with a background retry sweep.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/callback/{provider}`: Callback ingress for each configured provider, plus a sniffing
//!   `/callback` route for providers that cannot be given a per-provider URL.
//! * `/api/...`: The key-guarded internal API (payments, payment methods, events, balances).

pub mod callback_routes;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod middleware;
pub mod retry_worker;
pub mod routes;
pub mod server;
