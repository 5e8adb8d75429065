use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};
use lokapay_engine::db_types::Transaction;
use payment_gateways::{Bank, MethodKind, MethodSelection, PaymentRequest, Wallet};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The header may carry a proxy chain. The left-most entry is the original client.
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).unwrap();
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str())
            .and_then(|s| IpAddr::from_str(s.trim_matches('"')).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Rebuilds a gateway request from a stored transaction, for status polls and cancellations.
///
/// Only the method *kind* steers those calls; the concrete bank or wallet chosen at creation
/// is never consulted again, so a fixed placeholder fills that slot. Customer contact details
/// are not persisted either, which means provider calls that genuinely need them (the SNAP
/// virtual-account status inquiry derives the VA number from the customer's phone) answer with
/// a validation error rather than a fabricated number.
pub fn payment_request_for(tx: &Transaction) -> PaymentRequest {
    let method = match tx.method {
        MethodKind::Checkout => MethodSelection::Checkout,
        MethodKind::VirtualAccount => MethodSelection::VirtualAccount { bank: Bank::Bri },
        MethodKind::EWallet => MethodSelection::Ewallet { wallet: Wallet::Ovo },
        MethodKind::Qris => MethodSelection::Qris,
        MethodKind::Manual => MethodSelection::Manual,
    };
    PaymentRequest::new(tx.tx_id.clone(), tx.customer_id.clone(), tx.amount, method)
}
