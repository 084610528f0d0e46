//! Simulated secure hardware — in-memory Ed25519 keys with scripted prompts
//!
//! Stands in for the native Secure Enclave / Keystore shim in tests and the
//! CLI. It behaves like the real thing where it matters to callers:
//! - keys never leave the store, only public keys and signatures do
//! - biometric-protected keys refuse to sign unless a presence challenge
//!   succeeded since the last signature
//! - prompts can be scripted to accept, dismiss or fail
//! - transport failures can be injected

use super::bridge::HardwareBridge;
use super::capability::{PresenceOutcome, SecurityCapability};
use crate::custody::ManagedKey;
use crate::error::{TrustError, TrustResult};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

struct SimulatedKey {
    signing_key: SigningKey,
    requires_biometric: bool,
}

/// In-memory hardware bridge
pub struct SimulatedHardware {
    capability: Mutex<SecurityCapability>,
    keys: Mutex<HashMap<String, SimulatedKey>>,
    /// Outcomes consumed one per prompt; falls back to `default_presence`
    presence_script: Mutex<VecDeque<PresenceOutcome>>,
    default_presence: Mutex<PresenceOutcome>,
    /// Set by a successful prompt, consumed by the next biometric signature
    presence_granted: AtomicBool,
    transport_failure: AtomicBool,
    prompts_shown: AtomicU32,
    signatures_issued: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedHardware {
    pub fn new(capability: SecurityCapability) -> Self {
        log::info!(
            "Simulated hardware initialized: secure_hw={}, modality={}",
            capability.has_secure_hardware,
            capability.modality.name()
        );
        Self {
            capability: Mutex::new(capability),
            keys: Mutex::new(HashMap::new()),
            presence_script: Mutex::new(VecDeque::new()),
            default_presence: Mutex::new(PresenceOutcome::accepted()),
            presence_granted: AtomicBool::new(false),
            transport_failure: AtomicBool::new(false),
            prompts_shown: AtomicU32::new(0),
            signatures_issued: AtomicU32::new(0),
        }
    }

    /// Queue the outcome of the next prompt
    pub fn push_presence(&self, outcome: PresenceOutcome) {
        lock(&self.presence_script).push_back(outcome);
    }

    /// Outcome used once the script is exhausted
    pub fn set_default_presence(&self, outcome: PresenceOutcome) {
        *lock(&self.default_presence) = outcome;
    }

    pub fn set_capability(&self, capability: SecurityCapability) {
        *lock(&self.capability) = capability;
    }

    /// Make every subsequent bridge call fail at the transport level
    pub fn set_transport_failure(&self, failing: bool) {
        self.transport_failure.store(failing, Ordering::SeqCst);
    }

    pub fn prompts_shown(&self) -> u32 {
        self.prompts_shown.load(Ordering::SeqCst)
    }

    pub fn signatures_issued(&self) -> u32 {
        self.signatures_issued.load(Ordering::SeqCst)
    }

    /// Public half of the key under `alias`, for verifying issued signatures
    pub fn verifying_key(&self, alias: &str) -> Option<VerifyingKey> {
        lock(&self.keys)
            .get(alias)
            .map(|k| k.signing_key.verifying_key())
    }

    fn check_transport(&self) -> TrustResult<()> {
        if self.transport_failure.load(Ordering::SeqCst) {
            return Err(TrustError::Transport(
                "simulated native bridge unreachable".into(),
            ));
        }
        Ok(())
    }

    fn sign_internal(&self, alias: &str, data: &[u8], gate_always: bool) -> TrustResult<Vec<u8>> {
        let keys = lock(&self.keys);
        let key = keys
            .get(alias)
            .ok_or_else(|| TrustError::KeyNotFound(alias.to_string()))?;

        if gate_always || key.requires_biometric {
            // One successful prompt authorizes exactly one signature
            if !self.presence_granted.swap(false, Ordering::SeqCst) {
                return Err(TrustError::HardwareUnavailable(
                    "user presence not established for biometric key".into(),
                ));
            }
        }

        let signature = key.signing_key.sign(data);
        self.signatures_issued.fetch_add(1, Ordering::SeqCst);
        Ok(signature.to_bytes().to_vec())
    }
}

#[async_trait]
impl HardwareBridge for SimulatedHardware {
    async fn probe_capability(&self) -> TrustResult<SecurityCapability> {
        self.check_transport()?;
        Ok(lock(&self.capability).clone())
    }

    async fn authenticate_presence(
        &self,
        reason: &str,
        subtitle: Option<&str>,
    ) -> TrustResult<PresenceOutcome> {
        self.check_transport()?;
        if !lock(&self.capability).can_authenticate_presence() {
            return Err(TrustError::HardwareUnavailable(
                "no biometric hardware enrolled".into(),
            ));
        }

        self.prompts_shown.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Presence prompt: reason='{}' subtitle={:?}",
            reason,
            subtitle
        );

        let outcome = lock(&self.presence_script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_presence).clone());
        self.presence_granted.store(outcome.success, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn generate_key(&self, alias: &str, require_biometric: bool) -> TrustResult<ManagedKey> {
        self.check_transport()?;
        let capability = lock(&self.capability).clone();
        if require_biometric && !capability.can_authenticate_presence() {
            return Err(TrustError::HardwareUnavailable(
                "biometric protection requested but no biometric hardware".into(),
            ));
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = signing_key.verifying_key().to_bytes().to_vec();
        lock(&self.keys).insert(
            alias.to_string(),
            SimulatedKey {
                signing_key,
                requires_biometric: require_biometric,
            },
        );

        Ok(ManagedKey {
            alias: alias.to_string(),
            public_key,
            requires_biometric: require_biometric,
            backed_by_secure_hardware: capability.has_secure_hardware,
        })
    }

    async fn sign_with_key(&self, alias: &str, data: &[u8], _reason: &str) -> TrustResult<Vec<u8>> {
        self.check_transport()?;
        self.sign_internal(alias, data, false)
    }

    async fn has_key(&self, alias: &str) -> TrustResult<bool> {
        self.check_transport()?;
        Ok(lock(&self.keys).contains_key(alias))
    }

    async fn delete_key(&self, alias: &str) -> TrustResult<bool> {
        self.check_transport()?;
        lock(&self.keys).remove(alias);
        Ok(true)
    }

    async fn sign_governance_action(
        &self,
        alias: &str,
        serialized_action: &[u8],
    ) -> TrustResult<Vec<u8>> {
        self.check_transport()?;
        self.sign_internal(alias, serialized_action, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::capability::BiometricModality;
    use ed25519_dalek::{Signature, Verifier};

    fn secure_face() -> SimulatedHardware {
        SimulatedHardware::new(SecurityCapability::secure_with(BiometricModality::Face))
    }

    #[tokio::test]
    async fn test_generate_and_sign_without_biometric() {
        let hw = secure_face();
        let key = hw.generate_key("plain", false).await.unwrap();
        assert_eq!(key.public_key.len(), 32);
        assert!(key.backed_by_secure_hardware);

        let sig = hw.sign_with_key("plain", b"payload", "test").await.unwrap();
        let sig = Signature::from_slice(&sig).unwrap();
        let vk = hw.verifying_key("plain").unwrap();
        assert!(vk.verify(b"payload", &sig).is_ok());
        assert_eq!(hw.prompts_shown(), 0);
    }

    #[tokio::test]
    async fn test_biometric_key_requires_fresh_presence() {
        let hw = secure_face();
        hw.generate_key("bio", true).await.unwrap();

        // No prompt yet
        assert!(hw.sign_with_key("bio", b"a", "r").await.is_err());

        let outcome = hw.authenticate_presence("r", None).await.unwrap();
        assert!(outcome.success);
        assert!(hw.sign_with_key("bio", b"a", "r").await.is_ok());

        // Grant was consumed by the previous signature
        assert!(hw.sign_with_key("bio", b"b", "r").await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_dismissal() {
        let hw = secure_face();
        hw.push_presence(PresenceOutcome::dismissed());
        let outcome = hw.authenticate_presence("r", Some("sub")).await.unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.success);

        // Script exhausted: default accept
        let outcome = hw.authenticate_presence("r", None).await.unwrap();
        assert!(outcome.success);
        assert_eq!(hw.prompts_shown(), 2);
    }

    #[tokio::test]
    async fn test_default_presence_after_script() {
        let hw = secure_face();
        hw.set_default_presence(PresenceOutcome::failed("LOCKOUT", "Too many attempts"));
        hw.push_presence(PresenceOutcome::accepted());

        assert!(hw.authenticate_presence("r", None).await.unwrap().success);
        for _ in 0..2 {
            let outcome = hw.authenticate_presence("r", None).await.unwrap();
            assert!(!outcome.success);
            assert_eq!(outcome.error_code.as_deref(), Some("LOCKOUT"));
        }
    }

    #[tokio::test]
    async fn test_capability_change_applies_to_later_calls() {
        let hw = secure_face();
        hw.generate_key("bio", true).await.unwrap();

        hw.set_capability(SecurityCapability::software_only());
        assert!(!hw.probe_capability().await.unwrap().has_secure_hardware);
        let err = hw.authenticate_presence("r", None).await.unwrap_err();
        assert!(matches!(err, TrustError::HardwareUnavailable(_)));
        assert!(hw.generate_key("bio2", true).await.is_err());
    }

    #[tokio::test]
    async fn test_generate_overwrites_alias() {
        let hw = secure_face();
        let first = hw.generate_key("id", false).await.unwrap();
        let second = hw.generate_key("id", false).await.unwrap();
        assert_ne!(first.public_key, second.public_key);
        assert_eq!(
            hw.verifying_key("id").unwrap().to_bytes().to_vec(),
            second.public_key
        );
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let hw = secure_face();
        assert!(hw.delete_key("never-created").await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_failure_injection() {
        let hw = secure_face();
        hw.set_transport_failure(true);
        let err = hw.has_key("x").await.unwrap_err();
        assert!(matches!(err, TrustError::Transport(_)));
    }
}
