use actix_web::{http::StatusCode, web, web::ServiceConfig};
use lokapay_common::Rupiah;
use lokapay_engine::{db_types::TransactionStatus, events::EventProducers, ReconcilerApi};

use super::helpers::{manual_transaction, post_callback, test_facade};
use crate::{
    callback_routes::{KiospayCallbackRoute, ManualCallbackRoute, UniversalCallbackRoute},
    config::ServerOptions,
    endpoint_tests::mocks::MockPaymentManager,
};

const TOKEN_HEADER: (&str, &str) = ("x-lokapay-confirm-token", "tok-123");

#[actix_web::test]
async fn manual_confirmation_settles_and_acknowledges() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_callback("/callback/manual", &[TOKEN_HEADER], r#"{"tx_id":"tx-1001","amount":250000}"#, configure_settle)
            .await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["message"], "Confirmation received");
}

// A bad token is rejected internally but acknowledged externally: the response is
// indistinguishable from a successful confirmation, and the database is never touched (the
// zero-expectation mock would panic on any call).
#[actix_web::test]
async fn manual_confirmation_with_bad_token_is_swallowed() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_callback(
        "/callback/manual",
        &[("x-lokapay-confirm-token", "tok-999")],
        r#"{"tx_id":"tx-1001","amount":250000}"#,
        configure_untouched,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["success"], true);
}

#[actix_web::test]
async fn replayed_confirmation_changes_nothing() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_callback("/callback/manual", &[TOKEN_HEADER], r#"{"tx_id":"tx-1001","amount":250000}"#, configure_replay)
            .await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["success"], true);
}

#[actix_web::test]
async fn callback_for_unconfigured_provider_is_reported() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_callback("/callback/kiospay", &[], r#"{"reference":"kp-1"}"#, configure_untouched).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":false,"message":"The kiospay gateway is not available"}"#);
}

#[actix_web::test]
async fn unrecognized_shared_callback_is_reported() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_callback("/callback", &[], "{}", configure_untouched).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":false,"message":"Unrecognized callback"}"#);
}

fn register(cfg: &mut ServiceConfig, manager: MockPaymentManager) {
    let api = ReconcilerApi::new(manager, EventProducers::default());
    cfg.service(
        web::scope("/callback")
            .service(KiospayCallbackRoute::<MockPaymentManager>::new())
            .service(ManualCallbackRoute::<MockPaymentManager>::new())
            .service(UniversalCallbackRoute::<MockPaymentManager>::new()),
    )
    .app_data(web::Data::new(api))
    .app_data(web::Data::new(test_facade()))
    .app_data(web::Data::new(ServerOptions { use_x_forwarded_for: false, use_forwarded: false }));
}

fn configure_settle(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_record_callback_event()
        .withf(|event_key, tx_id, gateway| {
            event_key == "manual:tx-1001:success" && tx_id.as_str() == "tx-1001" && gateway == "manual"
        })
        .returning(|_, _, _| Ok(true));
    manager
        .expect_fetch_transaction()
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Pending))));
    manager
        .expect_settle_transaction()
        .withf(|tx_id, paid_amount, _paid_at, _provider_ref| {
            tx_id.as_str() == "tx-1001" && *paid_amount == Some(Rupiah::new(250_000))
        })
        .returning(|_, _, _, _| Ok(Some(manual_transaction(TransactionStatus::Success))));
    register(cfg, manager);
}

fn configure_replay(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager.expect_record_callback_event().returning(|_, _, _| Ok(false));
    register(cfg, manager);
}

fn configure_untouched(cfg: &mut ServiceConfig) {
    register(cfg, MockPaymentManager::new());
}
