use super::gateway_trait::{GatewayClient, GatewayKind};
use crate::core::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the configured gateway clients, constructed once at startup and
/// shared as a dependency. No ambient global state.
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn GatewayClient>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(&mut self, gateway: Arc<dyn GatewayClient>) {
        self.gateways.insert(gateway.kind(), gateway);
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn GatewayClient>> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Gateway '{}' is not configured", kind)))
    }

    pub fn kinds(&self) -> Vec<GatewayKind> {
        self.gateways.keys().copied().collect()
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
