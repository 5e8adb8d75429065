use actix_web::{http::StatusCode, web, web::ServiceConfig};
use lokapay_engine::{DispatcherConfig, WebhookDispatcher};
use serde_json::json;

use super::helpers::{delivered_webhook, get_request, post_request};
use crate::{
    endpoint_tests::mocks::MockDeliveryManager,
    routes::{EmitEventRoute, EventDeliveriesRoute},
};

// With nothing subscribed the emit is a no-op: no delivery rows, no database traffic (the
// mock would panic on any call).
#[actix_web::test]
async fn emit_without_subscribers_creates_no_deliveries() {
    let _ = env_logger::try_init().ok();
    let body = json!({"event": "user.verified", "data": {"user_id": 7}});
    let (status, body) = post_request("/events", body, configure_no_subscribers).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"event":"user.verified","deliveries":[]}"#);
}

#[actix_web::test]
async fn emit_rejects_a_blank_event_type() {
    let _ = env_logger::try_init().ok();
    let body = json!({"event": "  ", "data": {}});
    let (status, body) = post_request("/events", body, configure_no_subscribers).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request. The event type must not be empty"}"#);
}

#[actix_web::test]
async fn fetch_deliveries_for_event() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        get_request("/events/3e9a2f3c-9f2f-4c94-95b8-7a2d55f3f3a1/deliveries", configure_audit).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, DELIVERIES_JSON);
}

#[actix_web::test]
async fn fetch_deliveries_for_unknown_event_is_empty() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/events/no-such-event/deliveries", configure_empty_audit).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

fn register(cfg: &mut ServiceConfig, manager: MockDeliveryManager) {
    let dispatcher = WebhookDispatcher::new(manager, DispatcherConfig::default());
    cfg.service(EmitEventRoute::<MockDeliveryManager>::new())
        .service(EventDeliveriesRoute::<MockDeliveryManager>::new())
        .app_data(web::Data::new(dispatcher));
}

fn configure_no_subscribers(cfg: &mut ServiceConfig) {
    register(cfg, MockDeliveryManager::new());
}

fn configure_audit(cfg: &mut ServiceConfig) {
    let mut manager = MockDeliveryManager::new();
    manager
        .expect_fetch_deliveries_for_event()
        .withf(|event_id| event_id == "3e9a2f3c-9f2f-4c94-95b8-7a2d55f3f3a1")
        .returning(|_| Ok(vec![delivered_webhook()]));
    register(cfg, manager);
}

fn configure_empty_audit(cfg: &mut ServiceConfig) {
    let mut manager = MockDeliveryManager::new();
    manager.expect_fetch_deliveries_for_event().returning(|_| Ok(Vec::new()));
    register(cfg, manager);
}

const DELIVERIES_JSON: &str = r#"[{"id":1,"event_id":"3e9a2f3c-9f2f-4c94-95b8-7a2d55f3f3a1","event_type":"payment.completed","payload":"{\"event\":\"payment.completed\"}","target_url":"https://merchant.example.com/hooks/lokapay","status":"delivered","attempt_count":1,"max_attempts":5,"last_status":200,"last_error":null,"next_retry_at":null,"created_at":"2024-03-10T09:30:05Z","updated_at":"2024-03-10T09:30:05Z"}]"#;
