//----------------------------------------------   Callbacks  ----------------------------------------------------
//! Inbound provider callback endpoints.
//!
//! Every handler in here answers with the provider's expected acknowledgement no matter what
//! happened internally: a forged signature, an unparseable body or a database error is logged
//! and swallowed, never surfaced as an HTTP error. Providers treat anything else as a delivery
//! failure and retry (or alert a human), and none of those conditions is theirs to fix.

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use log::*;
use lokapay_engine::{traits::TransactionManagement, ReconcileOutcome, ReconcilerApi};
use payment_gateways::{
    kiospay::KIOSPAY_CODE,
    manual::MANUAL_CODE,
    snap::SNAP_CODE,
    Acknowledgement,
    InboundCallback,
    PaymentFacade,
    PaymentGateway,
};

use crate::{config::ServerOptions, data_objects::JsonResponse, helpers::get_remote_ip, route};

route!(snap_callback => Post "/snap" impl TransactionManagement);
pub async fn snap_callback<B: TransactionManagement>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
    options: web::Data<ServerOptions>,
) -> HttpResponse {
    callback_for(SNAP_CODE, &req, body, api.as_ref(), facade.as_ref(), options.get_ref()).await
}

route!(kiospay_callback => Post "/kiospay" impl TransactionManagement);
pub async fn kiospay_callback<B: TransactionManagement>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
    options: web::Data<ServerOptions>,
) -> HttpResponse {
    callback_for(KIOSPAY_CODE, &req, body, api.as_ref(), facade.as_ref(), options.get_ref()).await
}

route!(manual_callback => Post "/manual" impl TransactionManagement);
/// Operator confirmations for manual bank transfers. The manual adapter checks the confirmation
/// token and the optional IP allowlist; the caller's address comes from the same
/// forwarded-header-aware resolution the rest of the server uses.
pub async fn manual_callback<B: TransactionManagement>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
    options: web::Data<ServerOptions>,
) -> HttpResponse {
    callback_for(MANUAL_CODE, &req, body, api.as_ref(), facade.as_ref(), options.get_ref()).await
}

route!(universal_callback => Post "" impl TransactionManagement);
/// The shared callback endpoint for providers that are only given one URL to notify. The
/// callback is attributed to a gateway by its structure before any verification runs.
pub async fn universal_callback<B: TransactionManagement>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
    options: web::Data<ServerOptions>,
) -> HttpResponse {
    trace!("📨️ Received a callback on the shared endpoint");
    let callback = inbound_callback(&req, &body, options.get_ref());
    match facade.detect_gateway(&callback) {
        Some(gateway) => {
            debug!("📨️ Attributed the callback to the {} gateway", gateway.code());
            process_callback(gateway, callback, api.as_ref()).await
        },
        None => {
            warn!("📨️ No configured gateway recognizes a callback on the shared endpoint. Answering with a failure.");
            HttpResponse::Ok().json(JsonResponse::failure("Unrecognized callback"))
        },
    }
}

async fn callback_for<B: TransactionManagement>(
    code: &str,
    req: &HttpRequest,
    body: web::Bytes,
    api: &ReconcilerApi<B>,
    facade: &PaymentFacade,
    options: &ServerOptions,
) -> HttpResponse {
    trace!("📨️ Received a {code} callback on {}", req.path());
    let gateway = match facade.gateway(code) {
        Ok(gateway) => gateway,
        Err(e) => {
            warn!("📨️ A callback arrived for the {code} gateway, which is not configured. {e}");
            return HttpResponse::Ok().json(JsonResponse::failure(format!("The {code} gateway is not available")));
        },
    };
    let callback = inbound_callback(req, &body, options);
    process_callback(gateway, callback, api).await
}

/// Verifies, parses and reconciles one callback, then acknowledges it. The acknowledgement is
/// identical on every path; only the logs tell success and rejection apart.
async fn process_callback<B: TransactionManagement>(
    gateway: Arc<dyn PaymentGateway>,
    callback: InboundCallback,
    api: &ReconcilerApi<B>,
) -> HttpResponse {
    let code = gateway.code();
    let ack = gateway.acknowledgement();
    if let Err(e) = gateway.verify_callback(&callback) {
        warn!("📨️ Rejected a {code} callback internally. {e}");
        return acknowledge(&ack);
    }
    let event = match gateway.parse_callback(&callback) {
        Ok(event) => event,
        Err(e) => {
            warn!("📨️ Could not parse a verified {code} callback. {e}");
            return acknowledge(&ack);
        },
    };
    match api.process_event(code, event).await {
        Ok(ReconcileOutcome::Settled(tx)) => info!("📨️ {code} callback settled [{}]", tx.tx_id),
        Ok(ReconcileOutcome::Closed(tx)) => info!("📨️ {code} callback closed [{}] as {}", tx.tx_id, tx.status),
        Ok(ReconcileOutcome::Duplicate) => debug!("📨️ A replayed {code} callback changed nothing"),
        Ok(ReconcileOutcome::Informational) => debug!("📨️ A {code} callback reported a still-pending payment"),
        Ok(ReconcileOutcome::Unknown(tx_id)) => {
            warn!("📨️ A {code} callback referenced the unknown transaction [{tx_id}]")
        },
        Err(e) => warn!("📨️ Could not process a {code} callback. {e}"),
    }
    acknowledge(&ack)
}

fn inbound_callback(req: &HttpRequest, body: &web::Bytes, options: &ServerOptions) -> InboundCallback {
    let headers = req.headers().iter().filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));
    let mut callback = InboundCallback::new(req.path(), headers, body.to_vec());
    if let Some(ip) = get_remote_ip(req, options.use_x_forwarded_for, options.use_forwarded) {
        callback = callback.with_remote_addr(ip);
    }
    callback
}

fn acknowledge(ack: &Acknowledgement) -> HttpResponse {
    HttpResponse::Ok().content_type(ack.content_type()).body(ack.body())
}
