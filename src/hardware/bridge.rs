//! Native hardware boundary — Secure Enclave / Keystore / BiometricPrompt
//!
//! The crate never talks to platform APIs directly. A native shim (Swift or
//! Kotlin, outside this crate) implements [`HardwareBridge`]; tests and the
//! CLI use [`super::SimulatedHardware`].
//!
//! Every method may fail with [`TrustError::Transport`] when the native call
//! itself breaks, which is distinct from an authorization-level failure.

use super::capability::{PresenceOutcome, SecurityCapability};
use crate::custody::ManagedKey;
use crate::error::TrustResult;
use async_trait::async_trait;

#[async_trait]
pub trait HardwareBridge: Send + Sync {
    /// Query available security hardware; never prompts the user
    async fn probe_capability(&self) -> TrustResult<SecurityCapability>;

    /// Show a biometric prompt and report success / dismissal / failure
    async fn authenticate_presence(
        &self,
        reason: &str,
        subtitle: Option<&str>,
    ) -> TrustResult<PresenceOutcome>;

    /// Create a key under `alias`, replacing any existing one
    async fn generate_key(&self, alias: &str, require_biometric: bool) -> TrustResult<ManagedKey>;

    /// Sign `data` with the key under `alias`; returns raw signature bytes
    async fn sign_with_key(&self, alias: &str, data: &[u8], reason: &str) -> TrustResult<Vec<u8>>;

    async fn has_key(&self, alias: &str) -> TrustResult<bool>;

    /// Returns `true` when the key is gone afterwards, including when it never existed
    async fn delete_key(&self, alias: &str) -> TrustResult<bool>;

    /// Sign an already-serialized governance action
    async fn sign_governance_action(&self, alias: &str, serialized_action: &[u8])
        -> TrustResult<Vec<u8>>;
}
