//! API key middleware for Actix Web.
//!
//! Requests against the internal `/api` scope must carry the configured static key in the
//! [`API_KEY_HEADER`] header. The comparison is constant-time. When no key is configured the
//! middleware lets everything through; [`crate::config::ServerConfig`] warns loudly about that
//! at startup.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use lokapay_common::Secret;
use subtle::ConstantTimeEq;

use crate::errors::ServerError;

pub const API_KEY_HEADER: &str = "x-lokapay-api-key";

pub struct ApiTokenMiddlewareFactory {
    // None disables the check and the middleware waves every request through
    key: Option<Secret<String>>,
}

impl ApiTokenMiddlewareFactory {
    pub fn new(key: Option<Secret<String>>) -> Self {
        ApiTokenMiddlewareFactory { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiTokenMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiTokenMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiTokenMiddlewareService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct ApiTokenMiddlewareService<S> {
    key: Option<Secret<String>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiTokenMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let key = self.key.clone();
        Box::pin(async move {
            let Some(key) = key else {
                trace!("🔐️ No API key is configured. Allowing request.");
                return service.call(req).await;
            };
            let presented = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            match presented {
                Some(token) if token.as_bytes().ct_eq(key.reveal().as_bytes()).unwrap_u8() == 1 => {
                    trace!("🔐️ API key check for request ✅️");
                    service.call(req).await
                },
                Some(_) => {
                    warn!("🔐️ Invalid API key presented. Denying access.");
                    Err(ServerError::Unauthorized("Invalid API key".into()).into())
                },
                None => {
                    warn!("🔐️ No API key found in request. Denying access.");
                    Err(ServerError::Unauthorized("No API key provided".into()).into())
                },
            }
        })
    }
}
