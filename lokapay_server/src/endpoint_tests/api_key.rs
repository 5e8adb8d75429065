use actix_web::{body::MessageBody, error::ResponseError, http::StatusCode, test, test::TestRequest, App};
use lokapay_common::Secret;

use crate::{
    middleware::{ApiTokenMiddlewareFactory, API_KEY_HEADER},
    routes::health,
};

#[actix_web::test]
async fn no_configured_key_lets_everything_through() {
    let _ = env_logger::try_init().ok();
    let (status, body) = call(None, None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn correct_key_is_accepted() {
    let _ = env_logger::try_init().ok();
    let (status, _) = call(Some("sk_test_123"), Some("sk_test_123")).await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn missing_key_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let err = call(Some("sk_test_123"), None).await.unwrap_err();
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "Authentication failed. No API key provided");
}

#[actix_web::test]
async fn wrong_key_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let err = call(Some("sk_test_123"), Some("sk_test_999")).await.unwrap_err();
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "Authentication failed. Invalid API key");
}

// The middleware short-circuits with an `Err`, so failures surface from the service call
// itself rather than as a rendered response.
async fn call(
    configured_key: Option<&'static str>,
    presented_key: Option<&'static str>,
) -> Result<(StatusCode, String), actix_web::Error> {
    let key = configured_key.map(|k| Secret::new(k.to_string()));
    let app = App::new().wrap(ApiTokenMiddlewareFactory::new(key)).service(health);
    let service = test::init_service(app).await;
    let mut req = TestRequest::get().uri("/health");
    if let Some(token) = presented_key {
        req = req.insert_header((API_KEY_HEADER, token));
    }
    let (_, res) = test::try_call_service(&service, req.to_request()).await?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
