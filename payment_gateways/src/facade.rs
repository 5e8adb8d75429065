use std::sync::Arc;

use log::info;

use crate::{
    config::{GatewaysConfig, PaymentDefaults},
    data_objects::{CallbackStatus, InboundCallback, MethodKind, MethodSelection, PaymentRequest, PaymentResult},
    errors::GatewayError,
    gateway::PaymentGateway,
    manual::MANUAL_CODE,
    registry::GatewayRegistry,
};

/// A payment the facade has created, tagged with the provider that took it.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub gateway: &'static str,
    pub result: PaymentResult,
}

/// The single entry point for payment flows.
///
/// The facade validates the request, resolves the provider through the [`GatewayRegistry`],
/// completes the request with configured defaults and delegates. Nothing in here branches on a
/// concrete provider: everything a provider needs to express goes through the
/// [`PaymentGateway`] trait.
pub struct PaymentFacade {
    registry: GatewayRegistry,
    defaults: PaymentDefaults,
}

impl PaymentFacade {
    pub fn new(config: &GatewaysConfig) -> Result<Self, GatewayError> {
        Ok(Self { registry: GatewayRegistry::new(config)?, defaults: config.defaults.clone() })
    }

    /// Wires a facade around ready-made adapters.
    pub fn with_registry(registry: GatewayRegistry, defaults: PaymentDefaults) -> Self {
        Self { registry, defaults }
    }

    pub fn is_gateway_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    pub fn active_gateway(&self) -> &str {
        self.registry.active_code()
    }

    pub fn defaults(&self) -> &PaymentDefaults {
        &self.defaults
    }

    /// The method types the caller can currently pay with, for the selected (or default)
    /// provider.
    pub fn list_methods(&self, gateway_override: Option<&str>) -> Result<Vec<MethodKind>, GatewayError> {
        Ok(self.registry.select(gateway_override)?.available_methods().to_vec())
    }

    /// Creates a payment. While the gateway switch is off, requests fall back to manual
    /// transfer instructions whatever method they asked for.
    pub async fn create_payment(
        &self,
        request: PaymentRequest,
        gateway_override: Option<&str>,
    ) -> Result<CreatedPayment, GatewayError> {
        validate(&request)?;
        let gateway = self.registry.select(gateway_override)?;
        let mut request = request;
        if gateway.code() == MANUAL_CODE && !matches!(request.method, MethodSelection::Manual) {
            info!("💵️ Falling back to manual transfer instructions for {}", request.tx_id);
            request.method = MethodSelection::Manual;
        }
        if !gateway.available_methods().contains(&request.method.kind()) {
            return Err(GatewayError::UnsupportedMethod(request.method.kind(), gateway.code().into()));
        }
        self.apply_defaults(&mut request);
        let result = gateway.create_payment(&request).await?;
        info!("🧩️ Payment {} created via {}", request.tx_id, gateway.code());
        Ok(CreatedPayment { gateway: gateway.code(), result })
    }

    /// Polls the provider that holds the payment for its current status.
    pub async fn check_status(
        &self,
        gateway_code: &str,
        request: &PaymentRequest,
        provider_ref: Option<&str>,
    ) -> Result<CallbackStatus, GatewayError> {
        self.registry.get(gateway_code)?.check_status(request, provider_ref).await
    }

    /// Cancels a payable payment at the provider that holds it.
    pub async fn cancel(
        &self,
        gateway_code: &str,
        request: &PaymentRequest,
        provider_ref: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.registry.get(gateway_code)?.cancel(request, provider_ref).await?;
        info!("🧩️ Payment {} cancelled at {gateway_code}", request.tx_id);
        Ok(())
    }

    /// Fetches the adapter for a provider code (callback endpoints route through this).
    pub fn gateway(&self, code: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.registry.get(code)
    }

    /// Attributes an unattributed callback to a provider by its shape.
    pub fn detect_gateway(&self, callback: &InboundCallback) -> Option<Arc<dyn PaymentGateway>> {
        self.registry.detect(callback)
    }

    fn apply_defaults(&self, request: &mut PaymentRequest) {
        if request.expires_in.is_none() {
            request.expires_in = Some(self.defaults.expiry_for(request.method.kind()));
        }
        if matches!(request.method, MethodSelection::Checkout) && request.redirect_url.is_none() {
            request.redirect_url = Some(self.defaults.redirect_url.clone());
        }
    }
}

fn validate(request: &PaymentRequest) -> Result<(), GatewayError> {
    if request.tx_id.as_str().trim().is_empty() {
        return Err(GatewayError::Validation("tx_id must not be empty".into()));
    }
    if request.customer_id.trim().is_empty() {
        return Err(GatewayError::Validation("customer_id must not be empty".into()));
    }
    if !request.amount.is_positive() {
        return Err(GatewayError::Validation(format!("amount must be positive, not {}", request.amount)));
    }
    if let Some(expiry) = request.expires_in {
        if expiry.num_minutes() <= 0 {
            return Err(GatewayError::Validation("expires_in must be at least one minute".into()));
        }
    }
    if request.items.iter().any(|item| item.quantity == 0) {
        return Err(GatewayError::Validation("line items must have a non-zero quantity".into()));
    }
    Ok(())
}
