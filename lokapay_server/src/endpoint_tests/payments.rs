use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use lokapay_common::{MethodKind, Rupiah};
use lokapay_engine::{
    db_types::{CustomerBalance, Transaction, TransactionStatus},
    events::EventProducers,
    ReconcilerApi,
};
use serde_json::json;

use super::helpers::{get_request, manual_transaction, post_request, test_facade};
use crate::{
    endpoint_tests::mocks::MockPaymentManager,
    routes::{
        CancelPaymentRoute,
        CreatePaymentRoute,
        CustomerBalanceRoute,
        PaymentRoute,
        PaymentStatusRoute,
        PaymentsRoute,
    },
};

#[actix_web::test]
async fn create_manual_payment_records_transaction() {
    let _ = env_logger::try_init().ok();
    let body = json!({
        "tx_id": "tx-2001",
        "customer_id": "cust-7",
        "amount": 250_000,
        "method": {"type": "manual"},
        "customer": {"name": "Budi Santoso", "phone": "+628123456789"}
    });
    let (status, body) = post_request("/payments", body, configure_create).await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["gateway"], "manual");
    assert_eq!(v["transaction"]["tx_id"], "tx-2001");
    assert_eq!(v["transaction"]["status"], "pending");
    assert_eq!(v["payment"]["instructions"]["type"], "manual_transfer");
    assert_eq!(v["payment"]["instructions"]["account_number"], "8720011223");
    // The stored record carries the reference the adapter issued
    let provider_ref = v["payment"]["provider_ref"].as_str().unwrap();
    assert!(provider_ref.starts_with("LKP-"));
    assert_eq!(v["transaction"]["provider_ref"], provider_ref);
}

#[actix_web::test]
async fn create_replayed_tx_id_returns_stored_record() {
    let _ = env_logger::try_init().ok();
    let body = json!({
        "tx_id": "tx-1001",
        "customer_id": "cust-1",
        "amount": 250_000,
        "method": {"type": "manual"},
        "customer": {"name": "Budi Santoso", "phone": "+628123456789"}
    });
    let (status, body) = post_request("/payments", body, configure_create_replay).await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["transaction"]["tx_id"], "tx-1001");
    // The original record, not the replay's fresh reference
    assert_eq!(v["transaction"]["provider_ref"], "LKP-REF0001");
}

#[actix_web::test]
async fn fetch_payment() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payments/tx-1001", configure_pending).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PENDING_TX_JSON);
}

#[actix_web::test]
async fn fetch_unknown_payment_is_not_found() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payments/tx-9999", configure_missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. The requested transaction #tx-9999 does not exist"}"#);
}

#[actix_web::test]
async fn list_payments_passes_filters_through() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payments?customer_id=cust-1&status=success", configure_listing).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("[{SETTLED_TX_JSON}]"));
}

#[actix_web::test]
async fn status_refresh_on_manual_payment_stays_pending() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payments/tx-1001/status", configure_pending).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!(r#"{{"provider_status":"pending","transaction":{PENDING_TX_JSON}}}"#));
}

#[actix_web::test]
async fn cancel_pending_payment() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/payments/tx-1001/cancel", json!({}), configure_cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, CANCELLED_TX_JSON);
}

#[actix_web::test]
async fn cancel_settled_payment_is_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/payments/tx-1001/cancel", json!({}), configure_settled).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request. Transaction #tx-1001 is already success and cannot be cancelled"}"#);
}

// A callback settles the payment while the provider-side cancel is in flight. The conditional
// close comes back empty and the caller is told what actually happened.
#[actix_web::test]
async fn cancel_racing_a_settlement_reports_the_winner() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/payments/tx-1001/cancel", json!({}), configure_cancel_race).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        r#"{"error":"Invalid request. Transaction #tx-1001 reached success before the cancellation could be recorded"}"#
    );
}

#[actix_web::test]
async fn fetch_customer_balance() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/customers/cust-1/balance", configure_balance).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"customer_id":"cust-1","balance":750000,"created_at":"2024-03-10T08:00:00Z","updated_at":"2024-03-10T09:30:00Z"}"#
    );
}

#[actix_web::test]
async fn fetch_unknown_customer_balance_is_not_found() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/customers/ghost/balance", configure_balance).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. No account exists for customer ghost"}"#);
}

fn register(cfg: &mut ServiceConfig, manager: MockPaymentManager) {
    let api = ReconcilerApi::new(manager, EventProducers::default());
    cfg.service(CreatePaymentRoute::<MockPaymentManager>::new())
        .service(PaymentsRoute::<MockPaymentManager>::new())
        .service(PaymentRoute::<MockPaymentManager>::new())
        .service(PaymentStatusRoute::<MockPaymentManager>::new())
        .service(CancelPaymentRoute::<MockPaymentManager>::new())
        .service(CustomerBalanceRoute::<MockPaymentManager>::new())
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(test_facade()));
}

fn configure_create(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_insert_transaction()
        .withf(|tx| {
            tx.tx_id.as_str() == "tx-2001"
                && tx.customer_id == "cust-7"
                && tx.amount == Rupiah::new(250_000)
                && tx.method == MethodKind::Manual
                && tx.gateway == "manual"
                && tx.provider_ref.is_some()
                && tx.expires_at.is_some()
        })
        .returning(|tx| {
            let now = Utc::now();
            let transaction = Transaction {
                id: 42,
                tx_id: tx.tx_id,
                customer_id: tx.customer_id,
                amount: tx.amount,
                method: tx.method,
                gateway: tx.gateway,
                provider_ref: tx.provider_ref,
                status: TransactionStatus::Pending,
                paid_amount: None,
                paid_at: None,
                expires_at: tx.expires_at,
                created_at: now,
                updated_at: now,
            };
            Ok((transaction, true))
        });
    register(cfg, manager);
}

fn configure_create_replay(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_insert_transaction()
        .returning(|_| Ok((manual_transaction(TransactionStatus::Pending), false)));
    register(cfg, manager);
}

fn configure_pending(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_fetch_transaction()
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Pending))));
    register(cfg, manager);
}

fn configure_missing(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager.expect_fetch_transaction().returning(|_| Ok(None));
    register(cfg, manager);
}

fn configure_listing(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_search_transactions()
        .withf(|filter| {
            filter.customer_id.as_deref() == Some("cust-1")
                && filter.status == Some(TransactionStatus::Success)
                && filter.gateway.is_none()
                && filter.limit.is_none()
        })
        .returning(|_| Ok(vec![manual_transaction(TransactionStatus::Success)]));
    register(cfg, manager);
}

fn configure_settled(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_fetch_transaction()
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Success))));
    register(cfg, manager);
}

fn configure_cancel(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager
        .expect_fetch_transaction()
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Pending))));
    manager
        .expect_close_transaction()
        .withf(|tx_id, status| tx_id.as_str() == "tx-1001" && *status == TransactionStatus::Cancelled)
        .returning(|_, _| Ok(Some(manual_transaction(TransactionStatus::Cancelled))));
    register(cfg, manager);
}

fn configure_cancel_race(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    // First fetch sees the payment still pending; the conditional close then loses the race
    // and the re-fetch reveals the settlement that beat it.
    manager
        .expect_fetch_transaction()
        .times(1)
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Pending))));
    manager.expect_close_transaction().returning(|_, _| Ok(None));
    manager
        .expect_fetch_transaction()
        .returning(|_| Ok(Some(manual_transaction(TransactionStatus::Success))));
    register(cfg, manager);
}

fn configure_balance(cfg: &mut ServiceConfig) {
    let mut manager = MockPaymentManager::new();
    manager.expect_fetch_customer_balance().returning(|customer_id| {
        if customer_id == "cust-1" {
            Ok(Some(CustomerBalance {
                customer_id: customer_id.to_string(),
                balance: Rupiah::new(750_000),
                created_at: Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap(),
                updated_at: Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap(),
            }))
        } else {
            Ok(None)
        }
    });
    register(cfg, manager);
}

const PENDING_TX_JSON: &str = r#"{"id":1,"tx_id":"tx-1001","customer_id":"cust-1","amount":250000,"method":"manual","gateway":"manual","provider_ref":"LKP-REF0001","status":"pending","paid_amount":null,"paid_at":null,"expires_at":"2024-03-11T08:00:00Z","created_at":"2024-03-10T08:00:00Z","updated_at":"2024-03-10T08:00:00Z"}"#;

const SETTLED_TX_JSON: &str = r#"{"id":1,"tx_id":"tx-1001","customer_id":"cust-1","amount":250000,"method":"manual","gateway":"manual","provider_ref":"LKP-REF0001","status":"success","paid_amount":250000,"paid_at":"2024-03-10T09:30:00Z","expires_at":"2024-03-11T08:00:00Z","created_at":"2024-03-10T08:00:00Z","updated_at":"2024-03-10T08:00:00Z"}"#;

const CANCELLED_TX_JSON: &str = r#"{"id":1,"tx_id":"tx-1001","customer_id":"cust-1","amount":250000,"method":"manual","gateway":"manual","provider_ref":"LKP-REF0001","status":"cancelled","paid_amount":null,"paid_at":null,"expires_at":"2024-03-11T08:00:00Z","created_at":"2024-03-10T08:00:00Z","updated_at":"2024-03-10T08:00:00Z"}"#;
