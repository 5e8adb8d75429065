use std::{collections::HashMap, sync::Arc};

use log::warn;

use crate::{
    config::GatewaysConfig,
    data_objects::InboundCallback,
    errors::GatewayError,
    gateway::PaymentGateway,
    kiospay::{KiospayGateway, KIOSPAY_CODE},
    manual::{ManualGateway, MANUAL_CODE},
    snap::{SnapGateway, SNAP_CODE},
};

/// Builds one adapter instance per configured provider and hands out shared references.
///
/// The manual adapter is always present. The others are built if their credentials allow it; a
/// provider that cannot be built is only fatal when it is the active gateway, otherwise it is
/// logged and left out, and any later attempt to select it is a configuration error.
pub struct GatewayRegistry {
    active: String,
    enabled: bool,
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new(config: &GatewaysConfig) -> Result<Self, GatewayError> {
        let active = config.active_gateway.to_ascii_lowercase();
        let mut gateways: HashMap<String, Arc<dyn PaymentGateway>> = HashMap::new();
        gateways.insert(MANUAL_CODE.into(), Arc::new(ManualGateway::new(config.manual.clone())));
        match SnapGateway::new(config.snap.clone(), config.timestamp_tolerance, config.http_timeout) {
            Ok(gateway) => {
                gateways.insert(SNAP_CODE.into(), Arc::new(gateway));
            },
            Err(e) if active == SNAP_CODE && config.gateway_enabled => return Err(e),
            Err(e) => warn!("🧩️ The snap gateway is not available: {e}"),
        }
        match KiospayGateway::new(config.kiospay.clone(), config.timestamp_tolerance, config.http_timeout) {
            Ok(gateway) => {
                gateways.insert(KIOSPAY_CODE.into(), Arc::new(gateway));
            },
            Err(e) if active == KIOSPAY_CODE && config.gateway_enabled => return Err(e),
            Err(e) => warn!("🧩️ The kiospay gateway is not available: {e}"),
        }
        if config.gateway_enabled && !gateways.contains_key(&active) {
            return Err(GatewayError::Configuration(format!("LKP_GATEWAY names an unknown gateway '{active}'")));
        }
        Ok(Self { active, enabled: config.gateway_enabled, gateways })
    }

    /// Assembles a registry from ready-made adapters. Lets embedders (and tests) wire in their
    /// own [`PaymentGateway`] implementations.
    pub fn with_gateways(gateways: Vec<Arc<dyn PaymentGateway>>, active: &str, enabled: bool) -> Self {
        let gateways = gateways.into_iter().map(|g| (g.code().to_string(), g)).collect::<HashMap<_, _>>();
        Self { active: active.to_ascii_lowercase(), enabled, gateways }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn active_code(&self) -> &str {
        &self.active
    }

    /// The provider codes this registry can serve, sorted for stable output.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes = self.gateways.keys().map(String::as_str).collect::<Vec<_>>();
        codes.sort_unstable();
        codes
    }

    /// Fetches a provider by code.
    pub fn get(&self, code: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&code.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| GatewayError::Configuration(format!("unknown or unavailable gateway '{code}'")))
    }

    /// Resolves which provider should take a new payment: an explicit override wins, otherwise
    /// the active gateway, or the manual fallback while the gateway switch is off.
    pub fn select(&self, requested: Option<&str>) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        match requested {
            Some(code) => self.get(code),
            None if self.enabled => self.get(&self.active),
            None => self.get(MANUAL_CODE),
        }
    }

    /// Attributes an unattributed callback by asking each adapter whether the shape is theirs.
    pub fn detect(&self, callback: &InboundCallback) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.values().find(|g| g.matches_callback(callback)).cloned()
    }
}
