//! Enclave-backed custodian — keys held by secure hardware behind a bridge
//!
//! The key never leaves the hardware. When a key requires biometrics, every
//! `sign` runs a fresh presence challenge; governance signing always does,
//! and refuses outright on devices without biometric hardware rather than
//! producing a weaker signature.

use super::{CustodianVariant, CustodyCapabilities, KeyCustodian, ManagedKey};
use crate::error::{ErrorKind, TrustError, TrustResult};
use crate::hardware::{CapabilityProbe, HardwareBridge, SecurityCapability};
use crate::signing::{SignContext, SignatureResult, SigningState};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct EnclaveCustodian {
    bridge: Arc<dyn HardwareBridge>,
    probe: CapabilityProbe,
    /// Public metadata of keys generated through this custodian
    keys: Mutex<HashMap<String, ManagedKey>>,
}

fn short(alias: &str) -> &str {
    alias
        .char_indices()
        .nth(16)
        .map_or(alias, |(end, _)| &alias[..end])
}

impl EnclaveCustodian {
    pub fn new(bridge: Arc<dyn HardwareBridge>) -> Self {
        Self {
            probe: CapabilityProbe::new(bridge.clone()),
            bridge,
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn known(&self, alias: &str) -> Option<ManagedKey> {
        self.keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(alias)
            .cloned()
    }

    /// The request's capability snapshot, or a fresh one when driven directly
    async fn capability(&self, ctx: &SignContext) -> SecurityCapability {
        match ctx.capability() {
            Some(capability) => capability,
            None => self.probe.probe().await,
        }
    }

    /// Whether signing with `alias` must be preceded by a presence check.
    ///
    /// Keys generated in an earlier process have no metadata here; they are
    /// treated as biometric-protected whenever the device can prompt.
    async fn requires_presence(&self, alias: &str, ctx: &SignContext) -> bool {
        match self.known(alias) {
            Some(key) => key.requires_biometric,
            None => self.capability(ctx).await.can_authenticate_presence(),
        }
    }

    /// Run the presence challenge. `Err` carries the terminal result.
    async fn authorize(&self, ctx: &SignContext) -> Result<(), SignatureResult> {
        ctx.enter(SigningState::Authorizing);
        let outcome = self
            .bridge
            .authenticate_presence(&ctx.reason, ctx.subtitle.as_deref())
            .await
            .map_err(|e| SignatureResult::from_error(&e, ctx))?;

        if outcome.cancelled {
            info!("Presence challenge dismissed by user");
            return Err(SignatureResult::cancelled(ctx));
        }
        if !outcome.success {
            let message = outcome
                .error_message
                .unwrap_or_else(|| "Biometric authentication failed".to_string());
            warn!("Presence challenge failed: {}", message);
            return Err(SignatureResult::failed(
                ErrorKind::HardwareUnavailable,
                message,
                ctx,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyCustodian for EnclaveCustodian {
    fn variant(&self) -> CustodianVariant {
        CustodianVariant::Enclave
    }

    fn capabilities(&self) -> CustodyCapabilities {
        CustodyCapabilities {
            local_keys: true,
            governance_signing: true,
            transaction_signing: false,
        }
    }

    async fn generate(&self, alias: &str, require_biometric: bool) -> TrustResult<ManagedKey> {
        if alias.is_empty() {
            return Err(TrustError::Precondition("key alias must not be empty".into()));
        }
        if self.has_key(alias).await {
            warn!(
                "Re-enrolling key '{}': existing key will be replaced",
                short(alias)
            );
        }

        let key = self.bridge.generate_key(alias, require_biometric).await?;
        info!(
            "Generated key '{}': biometric={}, secure_hw={}, pk={}..",
            short(alias),
            key.requires_biometric,
            key.backed_by_secure_hardware,
            &key.public_key_hex()[..16.min(key.public_key.len() * 2)]
        );
        self.keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(alias.to_string(), key.clone());
        Ok(key)
    }

    async fn has_key(&self, alias: &str) -> bool {
        match self.bridge.has_key(alias).await {
            Ok(present) => present,
            Err(e) => {
                debug!("has_key('{}') degraded to false: {}", short(alias), e);
                false
            }
        }
    }

    async fn key(&self, alias: &str) -> Option<ManagedKey> {
        self.known(alias)
    }

    async fn public_key(&self, alias: &str) -> Option<Vec<u8>> {
        self.known(alias).map(|k| k.public_key)
    }

    async fn sign(&self, alias: &str, data: &[u8], ctx: &SignContext) -> SignatureResult {
        if self.requires_presence(alias, ctx).await {
            if let Err(result) = self.authorize(ctx).await {
                return result;
            }
        }

        ctx.enter(SigningState::Signing);
        match self.bridge.sign_with_key(alias, data, &ctx.reason).await {
            Ok(raw) => SignatureResult::signed(raw, ctx),
            Err(e) => {
                warn!("Signing with '{}' failed: {}", short(alias), e);
                SignatureResult::from_error(&e, ctx)
            }
        }
    }

    async fn delete(&self, alias: &str) -> TrustResult<bool> {
        let deleted = self.bridge.delete_key(alias).await?;
        if deleted {
            self.keys
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(alias);
            info!("Deleted key '{}'", short(alias));
        }
        Ok(deleted)
    }

    async fn sign_governance(
        &self,
        alias: &str,
        serialized_action: &[u8],
        ctx: &SignContext,
    ) -> SignatureResult {
        let capability = self.capability(ctx).await;
        if !capability.can_authenticate_presence() {
            warn!("Governance signing refused: no biometric hardware");
            return SignatureResult::failed(
                ErrorKind::HardwareUnavailable,
                "Biometric hardware required for governance signing",
                ctx,
            );
        }

        if let Err(result) = self.authorize(ctx).await {
            return result;
        }

        ctx.enter(SigningState::Signing);
        match self
            .bridge
            .sign_governance_action(alias, serialized_action)
            .await
        {
            Ok(raw) => SignatureResult::signed(raw, ctx),
            Err(e) => {
                warn!("Governance signing with '{}' failed: {}", short(alias), e);
                SignatureResult::from_error(&e, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{BiometricModality, PresenceOutcome, SecurityCapability, SimulatedHardware};
    use ed25519_dalek::{Signature, Verifier};

    fn setup(capability: SecurityCapability) -> (Arc<SimulatedHardware>, EnclaveCustodian) {
        let hw = Arc::new(SimulatedHardware::new(capability));
        let custodian = EnclaveCustodian::new(hw.clone());
        (hw, custodian)
    }

    fn face() -> SecurityCapability {
        SecurityCapability::secure_with(BiometricModality::Face)
    }

    #[tokio::test]
    async fn test_generate_has_delete() {
        let (_hw, custodian) = setup(face());
        assert!(!custodian.has_key("id").await);

        let key = custodian.generate("id", true).await.unwrap();
        assert!(key.requires_biometric);
        assert!(custodian.has_key("id").await);
        assert_eq!(custodian.key("id").await, Some(key.clone()));
        assert_eq!(custodian.public_key("id").await, Some(key.public_key));

        assert!(custodian.delete("id").await.unwrap());
        assert!(!custodian.has_key("id").await);
        assert!(custodian.key("id").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let (_hw, custodian) = setup(face());
        assert!(custodian.delete("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_alias() {
        let (_hw, custodian) = setup(face());
        let err = custodian.generate("", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionViolation);
    }

    #[tokio::test]
    async fn test_regenerate_replaces_key() {
        let (hw, custodian) = setup(face());
        let first = custodian.generate("id", false).await.unwrap();
        let second = custodian.generate("id", false).await.unwrap();
        assert_ne!(first.public_key, second.public_key);
        assert_eq!(
            hw.verifying_key("id").unwrap().to_bytes().to_vec(),
            second.public_key
        );
    }

    #[tokio::test]
    async fn test_sign_biometric_key_prompts_every_call() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", true).await.unwrap();

        for i in 0..3u8 {
            let ctx = SignContext::new("sign");
            let result = custodian.sign("id", &[i], &ctx).await;
            assert!(result.success);
            assert!(result.trace.contains(&SigningState::Authorizing));
        }
        assert_eq!(hw.prompts_shown(), 3);
    }

    #[tokio::test]
    async fn test_sign_plain_key_skips_prompt() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", false).await.unwrap();

        let ctx = SignContext::new("sign");
        let result = custodian.sign("id", b"msg", &ctx).await;
        assert!(result.success);
        assert!(!result.trace.contains(&SigningState::Authorizing));
        assert_eq!(hw.prompts_shown(), 0);

        let raw = result.signature_raw.unwrap();
        let sig = Signature::from_slice(&raw).unwrap();
        assert!(hw.verifying_key("id").unwrap().verify(b"msg", &sig).is_ok());
    }

    #[tokio::test]
    async fn test_sign_dismissed_is_cancelled() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", true).await.unwrap();
        hw.push_presence(PresenceOutcome::dismissed());

        let ctx = SignContext::new("sign");
        let result = custodian.sign("id", b"msg", &ctx).await;
        assert!(!result.success);
        assert!(result.cancelled);
        assert_eq!(hw.signatures_issued(), 0);
    }

    #[tokio::test]
    async fn test_sign_biometric_failure_is_not_cancel() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", true).await.unwrap();
        hw.push_presence(PresenceOutcome::failed("LOCKOUT", "Too many attempts"));

        let result = custodian.sign("id", b"msg", &SignContext::new("s")).await;
        assert!(!result.success);
        assert!(!result.cancelled);
        assert_eq!(result.error_kind, Some(ErrorKind::HardwareUnavailable));
        assert_eq!(result.error_message.as_deref(), Some("Too many attempts"));
    }

    #[tokio::test]
    async fn test_sign_missing_key_fails() {
        let (_hw, custodian) = setup(SecurityCapability::secure_with(BiometricModality::None));
        let result = custodian.sign("nope", b"msg", &SignContext::new("s")).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::PreconditionViolation));
    }

    #[tokio::test]
    async fn test_has_key_degrades_on_transport_error() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", false).await.unwrap();
        hw.set_transport_failure(true);
        assert!(!custodian.has_key("id").await);
    }

    #[tokio::test]
    async fn test_governance_always_prompts() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", false).await.unwrap();

        let result = custodian
            .sign_governance("id", b"{}", &SignContext::new("gov"))
            .await;
        assert!(result.success);
        assert_eq!(hw.prompts_shown(), 1);
    }

    #[tokio::test]
    async fn test_governance_refused_without_biometrics() {
        let (hw, custodian) = setup(SecurityCapability::secure_with(BiometricModality::None));
        custodian.generate("id", false).await.unwrap();

        let result = custodian
            .sign_governance("id", b"{}", &SignContext::new("gov"))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::HardwareUnavailable));
        assert_eq!(hw.signatures_issued(), 0);
    }

    #[tokio::test]
    async fn test_governance_uses_request_capability_snapshot() {
        let (hw, custodian) = setup(face());
        custodian.generate("id", false).await.unwrap();

        // Snapshot taken at request start says no biometrics
        let ctx = SignContext::new("gov");
        ctx.record_capability(SecurityCapability::secure_with(BiometricModality::None));
        let result = custodian.sign_governance("id", b"{}", &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::HardwareUnavailable));
        assert_eq!(hw.prompts_shown(), 0);
    }
}
