use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::TransactionStatus;

/// Search criteria for the transaction listing endpoint. All fields are optional; an empty
/// filter returns the most recent transactions up to the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub customer_id: Option<String>,
    pub gateway: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Only transactions created at or after this instant.
    pub after: Option<DateTime<Utc>>,
    /// Maximum number of rows to return. Defaults to 50.
    pub limit: Option<i64>,
}

impl TransactionFilter {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.gateway.is_none() && self.status.is_none() && self.after.is_none()
    }

    pub fn with_customer_id<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl Display for TransactionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(c) = &self.customer_id {
            parts.push(format!("customer_id={c}"));
        }
        if let Some(g) = &self.gateway {
            parts.push(format!("gateway={g}"));
        }
        if let Some(s) = &self.status {
            parts.push(format!("status={s}"));
        }
        if let Some(a) = &self.after {
            parts.push(format!("after={a}"));
        }
        if let Some(l) = &self.limit {
            parts.push(format!("limit={l}"));
        }
        write!(f, "{}", parts.join(","))
    }
}
