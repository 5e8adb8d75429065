//! Utilities for setting up integration-test databases. Only compiled with the `test_utils`
//! feature (or in this crate's own tests).

pub mod prepare_env;
