//! Key custody — a named asymmetric key, possibly protected by user presence
//!
//! One contract, two variants:
//! - **Enclave**: the key lives in secure hardware behind a [`HardwareBridge`]
//! - **Delegated**: there is no local key; an external wallet signs
//!
//! Callers branch on [`KeyCustodian::capabilities`], never on the platform.
//!
//! Keystore operations on one alias are not serialized here: at most one
//! in-flight `generate`/`sign`/`delete` per alias is a caller precondition.
//!
//! [`HardwareBridge`]: crate::hardware::HardwareBridge

pub mod delegated;
pub mod enclave;

pub use delegated::DelegatedCustodian;
pub use enclave::EnclaveCustodian;

use crate::error::{TrustError, TrustResult};
use crate::signing::{SignContext, SignatureResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A key owned by a custodian. Only the public half ever leaves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedKey {
    pub alias: String,
    pub public_key: Vec<u8>,
    pub requires_biometric: bool,
    pub backed_by_secure_hardware: bool,
}

impl ManagedKey {
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodianVariant {
    Enclave,
    Delegated,
}

/// What a custodian can do; read once by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyCapabilities {
    /// generate / delete / sign against a local key
    pub local_keys: bool,
    /// biometric-gated governance signing
    pub governance_signing: bool,
    /// transaction signing through an external wallet
    pub transaction_signing: bool,
}

#[async_trait]
pub trait KeyCustodian: Send + Sync {
    fn variant(&self) -> CustodianVariant;

    fn capabilities(&self) -> CustodyCapabilities;

    /// Create a key under `alias`.
    ///
    /// Every call attempts fresh generation and replaces an existing key for
    /// the alias (re-enroll). The old key is unrecoverable afterwards.
    async fn generate(&self, alias: &str, require_biometric: bool) -> TrustResult<ManagedKey>;

    /// Never fails; transport errors read as `false`
    async fn has_key(&self, alias: &str) -> bool;

    /// Metadata for a key this custodian generated, if known
    async fn key(&self, alias: &str) -> Option<ManagedKey>;

    async fn public_key(&self, alias: &str) -> Option<Vec<u8>>;

    /// Sign `data`; runs a presence challenge first when the key requires one
    async fn sign(&self, alias: &str, data: &[u8], ctx: &SignContext) -> SignatureResult;

    /// `Ok(true)` when the key is gone afterwards, including when it never existed
    async fn delete(&self, alias: &str) -> TrustResult<bool>;

    /// Sign a canonical governance payload behind a mandatory presence check
    async fn sign_governance(
        &self,
        _alias: &str,
        _serialized_action: &[u8],
        ctx: &SignContext,
    ) -> SignatureResult {
        SignatureResult::unsupported(ctx)
    }

    /// Have an external signer sign a serialized transaction
    async fn sign_transaction(&self, _tx: &[u8], ctx: &SignContext) -> SignatureResult {
        SignatureResult::unsupported(ctx)
    }

    /// Have an external signer sign and broadcast a serialized transaction
    async fn sign_and_send_transaction(&self, _tx: &[u8], ctx: &SignContext) -> SignatureResult {
        SignatureResult::unsupported(ctx)
    }
    /// End the session with the external signer
    async fn disconnect(&self) -> TrustResult<()> {
        Err(TrustError::Unsupported("no external signer session".into()))
    }
}
