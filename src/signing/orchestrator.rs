//! SigningOrchestrator — one signing contract over every custody model
//!
//! Three entry points share one invariant: exactly one signature per call,
//! over exactly the bytes the caller meant to sign. The only mutation is the
//! documented replay stamp on governance actions, applied strictly in the
//! order stamp -> serialize -> hash -> sign.
//!
//! The orchestrator reads the custodian's capability set once, at
//! construction. Everything else is written against the custody contract, so
//! a new platform means a new custodian, not a change here.

use super::governance::{action_hash, GovernanceAction};
use super::replay::ReplayGuard;
use super::request::{SignContext, SigningState};
use super::result::SignatureResult;
use crate::config::{PromptConfig, TrustConfig};
use crate::custody::{CustodyCapabilities, KeyCustodian, ManagedKey};
use crate::error::{ErrorKind, TrustError, TrustResult};
use crate::hardware::{CapabilityProbe, SecurityCapability};
use crate::trust::{self, AttestationEvidence, TrustLevel};
use log::{debug, info, warn};
use std::sync::Arc;

pub struct SigningOrchestrator {
    /// The identity key alias. No key material is ever held here.
    alias: String,
    custodian: Arc<dyn KeyCustodian>,
    capabilities: CustodyCapabilities,
    probe: CapabilityProbe,
    replay: ReplayGuard,
    prompts: PromptConfig,
}

impl SigningOrchestrator {
    pub fn new(
        alias: impl Into<String>,
        custodian: Arc<dyn KeyCustodian>,
        probe: CapabilityProbe,
        replay: ReplayGuard,
        prompts: PromptConfig,
    ) -> Self {
        let capabilities = custodian.capabilities();
        let alias = alias.into();
        info!(
            "Signing orchestrator ready: custodian={:?}, alias='{}', governance={}, transactions={}",
            custodian.variant(),
            alias,
            capabilities.governance_signing,
            capabilities.transaction_signing
        );
        Self {
            alias,
            custodian,
            capabilities,
            probe,
            replay,
            prompts,
        }
    }

    pub fn from_config(
        config: &TrustConfig,
        custodian: Arc<dyn KeyCustodian>,
        probe: CapabilityProbe,
    ) -> Self {
        Self::new(
            config.key_alias.clone(),
            custodian,
            probe,
            ReplayGuard::new(config.nonce_window),
            config.prompts.clone(),
        )
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn capabilities(&self) -> CustodyCapabilities {
        self.capabilities
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    // --- Key lifecycle ---

    /// Generate the identity key, replacing any existing one
    pub async fn enroll(&self, require_biometric: bool) -> TrustResult<ManagedKey> {
        if !self.capabilities.local_keys {
            return Err(TrustError::Unsupported(
                "this platform has no local identity key".into(),
            ));
        }
        self.custodian.generate(&self.alias, require_biometric).await
    }

    pub async fn has_identity_key(&self) -> bool {
        self.custodian.has_key(&self.alias).await
    }

    pub async fn identity_public_key(&self) -> Option<Vec<u8>> {
        self.custodian.public_key(&self.alias).await
    }

    pub async fn remove_identity_key(&self) -> TrustResult<bool> {
        self.custodian.delete(&self.alias).await
    }

    /// End the external wallet session; `Unsupported` without one
    pub async fn disconnect(&self) -> TrustResult<()> {
        self.custodian.disconnect().await
    }

    // --- Trust ---

    pub async fn capability(&self) -> SecurityCapability {
        self.probe.probe().await
    }

    pub async fn trust_level(&self) -> TrustLevel {
        let capability = self.probe.probe().await;
        let key = self.custodian.key(&self.alias).await;
        trust::resolve(&capability, key.as_ref())
    }

    pub async fn trust_level_attested(&self, evidence: &AttestationEvidence) -> TrustLevel {
        let capability = self.probe.probe().await;
        let key = self.custodian.key(&self.alias).await;
        trust::resolve_attested(&capability, key.as_ref(), Some(evidence))
    }

    // --- Signing ---

    /// Plain signature over `data`; no augmentation, no mandatory gate
    pub async fn sign_message(&self, data: &[u8]) -> SignatureResult {
        let ctx = SignContext::new(self.prompts.message_reason.clone());
        self.enter_probing(&ctx).await;

        if !self.capabilities.local_keys {
            return Self::finish("sign_message", SignatureResult::unsupported(&ctx));
        }
        let result = self.custodian.sign(&self.alias, data, &ctx).await;
        Self::finish("sign_message", result)
    }

    /// Biometric-gated signature over the replay-stamped action.
    ///
    /// Without governance support this returns `Unsupported`; it never
    /// falls back to an unauthenticated signature.
    pub async fn sign_governance_action(&self, action: GovernanceAction) -> SignatureResult {
        let ctx = SignContext::new(self.prompts.governance_reason.clone()).with_subtitle(format!(
            "{} / {}",
            action.action_type, action.operation
        ));
        self.enter_probing(&ctx).await;

        if !self.capabilities.governance_signing {
            warn!(
                "Governance action {}:{} refused: not supported by this custodian",
                action.action_type, action.operation
            );
            return Self::finish("sign_governance_action", SignatureResult::unsupported(&ctx));
        }

        let augmented = action.augment(self.replay.next_stamp());
        let serialized = match augmented.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                let result = SignatureResult::failed(ErrorKind::PreconditionViolation, e.to_string(), &ctx);
                return Self::finish("sign_governance_action", result);
            }
        };
        let hash = action_hash(&serialized);
        debug!(
            "Governance payload {}:{} hash={}.. nonce={}..",
            augmented.action.action_type,
            augmented.action.operation,
            &hash[..16],
            &augmented.nonce[..8]
        );

        let result = self
            .custodian
            .sign_governance(&self.alias, &serialized, &ctx)
            .await
            .with_action(hash, augmented);
        Self::finish("sign_governance_action", result)
    }

    /// Sign a serialized transaction through the external signer
    pub async fn sign_transaction(&self, tx: &[u8]) -> SignatureResult {
        let ctx = SignContext::new(self.prompts.transaction_reason.clone());
        self.enter_probing(&ctx).await;

        if !self.capabilities.transaction_signing {
            return Self::finish("sign_transaction", SignatureResult::unsupported(&ctx));
        }
        let result = self.custodian.sign_transaction(tx, &ctx).await;
        Self::finish("sign_transaction", result)
    }

    /// Sign and broadcast through the external signer
    pub async fn sign_and_send_transaction(&self, tx: &[u8]) -> SignatureResult {
        let ctx = SignContext::new(self.prompts.transaction_reason.clone());
        self.enter_probing(&ctx).await;

        if !self.capabilities.transaction_signing {
            return Self::finish("sign_and_send_transaction", SignatureResult::unsupported(&ctx));
        }
        let result = self.custodian.sign_and_send_transaction(tx, &ctx).await;
        Self::finish("sign_and_send_transaction", result)
    }

    // --- Internal helpers ---

    async fn enter_probing(&self, ctx: &SignContext) {
        ctx.enter(SigningState::Probing);
        let capability = self.probe.probe().await;
        debug!(
            "Request {}: trust tier {}",
            &ctx.request_id.to_string()[..8],
            trust::resolve(&capability, None).name()
        );
        ctx.record_capability(capability);
    }

    fn finish(operation: &str, result: SignatureResult) -> SignatureResult {
        if result.success {
            info!("{}: signed (request {})", operation, &result.request_id.to_string()[..8]);
        } else if result.cancelled {
            info!("{}: cancelled by user", operation);
        } else {
            warn!(
                "{}: failed ({})",
                operation,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }
}
