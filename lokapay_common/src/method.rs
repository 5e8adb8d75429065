use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// The closed set of payment-method flavours the platform offers. Which of them are actually
/// available depends on the active gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// A hosted checkout page the customer is redirected to.
    Checkout,
    /// A bank-assigned virtual account number dedicated to one transaction.
    VirtualAccount,
    /// An e-wallet charge (deep link or in-app confirmation).
    EWallet,
    /// A scan-to-pay QR code.
    Qris,
    /// An offline bank transfer confirmed by an operator.
    Manual,
}

impl Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodKind::Checkout => write!(f, "checkout"),
            MethodKind::VirtualAccount => write!(f, "virtual_account"),
            MethodKind::EWallet => write!(f, "ewallet"),
            MethodKind::Qris => write!(f, "qris"),
            MethodKind::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment method: {0}")]
pub struct MethodConversionError(String);

impl FromStr for MethodKind {
    type Err = MethodConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout" | "Checkout" => Ok(Self::Checkout),
            "virtual_account" | "VirtualAccount" => Ok(Self::VirtualAccount),
            "ewallet" | "EWallet" => Ok(Self::EWallet),
            "qris" | "Qris" => Ok(Self::Qris),
            "manual" | "Manual" => Ok(Self::Manual),
            s => Err(MethodConversionError(s.to_string())),
        }
    }
}
