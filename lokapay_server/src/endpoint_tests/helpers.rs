use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::{Duration, TimeZone, Utc};
use lokapay_common::{MethodKind, Rupiah, TxId};
use lokapay_engine::db_types::{DeliveryStatus, Transaction, TransactionStatus, WebhookDelivery};
use payment_gateways::{GatewaysConfig, PaymentFacade};
use serde_json::Value;

// A manual-only gateway configuration for tests. DO NOT re-use this token anywhere.
pub fn test_gateways_config() -> GatewaysConfig {
    let mut config = GatewaysConfig::default();
    config.manual.bank_name = "BCA".into();
    config.manual.account_number = "8720011223".into();
    config.manual.account_holder = "PT Lokapay Indonesia".into();
    config.manual = config.manual.with_confirm_token("tok-123");
    config
}

pub fn test_facade() -> PaymentFacade {
    PaymentFacade::new(&test_gateways_config()).unwrap()
}

/// A stored manual-transfer transaction in the given state. Settled states carry the paid
/// amount and timestamp a confirmation would have recorded.
pub fn manual_transaction(status: TransactionStatus) -> Transaction {
    let created_at = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
    let settled = status == TransactionStatus::Success;
    Transaction {
        id: 1,
        tx_id: TxId::from("tx-1001"),
        customer_id: "cust-1".to_string(),
        amount: Rupiah::new(250_000),
        method: MethodKind::Manual,
        gateway: "manual".to_string(),
        provider_ref: Some("LKP-REF0001".to_string()),
        status,
        paid_amount: settled.then(|| Rupiah::new(250_000)),
        paid_at: settled.then(|| Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap()),
        expires_at: Some(created_at + Duration::days(1)),
        created_at,
        updated_at: created_at,
    }
}

pub fn delivered_webhook() -> WebhookDelivery {
    let created_at = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 5).unwrap();
    WebhookDelivery {
        id: 1,
        event_id: "3e9a2f3c-9f2f-4c94-95b8-7a2d55f3f3a1".to_string(),
        event_type: "payment.completed".to_string(),
        payload: r#"{"event":"payment.completed"}"#.to_string(),
        target_url: "https://merchant.example.com/hooks/lokapay".to_string(),
        status: DeliveryStatus::Delivered,
        attempt_count: 1,
        max_attempts: 5,
        last_status: Some(200),
        last_error: None,
        next_retry_at: None,
        created_at,
        updated_at: created_at,
    }
}

pub async fn get_request(path: &str, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    send(TestRequest::get().uri(path), configure).await
}

pub async fn post_request(path: &str, body: Value, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    send(TestRequest::post().uri(path).set_json(&body), configure).await
}

/// Posts a raw callback body, as providers do, with whatever headers the test needs.
pub async fn post_callback(
    path: &str,
    headers: &[(&'static str, &'static str)],
    body: &'static str,
    configure: fn(&mut ServiceConfig),
) -> (StatusCode, String) {
    let mut req = TestRequest::post().uri(path).set_payload(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send(req, configure).await
}

// Handler errors render as responses, so every status lands here; only middleware failures
// need `try_call_service`, and those tests build their own app.
async fn send(req: TestRequest, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    let (_, res) = test::call_service(&service, req.to_request()).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
