//! CapabilityProbe — fail-closed query of the device's security hardware

use super::bridge::HardwareBridge;
use super::capability::SecurityCapability;
use log::{debug, warn};
use std::sync::Arc;

/// Queries the hardware bridge and never propagates errors
#[derive(Clone)]
pub struct CapabilityProbe {
    bridge: Arc<dyn HardwareBridge>,
}

impl CapabilityProbe {
    pub fn new(bridge: Arc<dyn HardwareBridge>) -> Self {
        Self { bridge }
    }

    /// Take a fresh capability snapshot.
    ///
    /// Any bridge error yields [`SecurityCapability::unavailable`] with the
    /// failure reason, so callers can branch without error handling.
    pub async fn probe(&self) -> SecurityCapability {
        match self.bridge.probe_capability().await {
            Ok(capability) => {
                debug!(
                    "Capability probe: secure_hw={}, biometric={}, modality={}",
                    capability.has_secure_hardware,
                    capability.has_biometric_hardware,
                    capability.modality.name()
                );
                capability
            }
            Err(e) => {
                warn!("Capability probe failed, reporting no hardware: {}", e);
                SecurityCapability::unavailable(e.to_string())
            }
        }
    }
}
