//! Delegated custodian — no local key, an external wallet signs
//!
//! Key lifecycle operations answer `Unsupported` so callers can branch
//! gracefully. Message and governance signing are unsupported; transactions
//! go to the wallet, authorizing it first if it is not connected.

use super::{CustodianVariant, CustodyCapabilities, KeyCustodian, ManagedKey};
use crate::error::{TrustError, TrustResult};
use crate::signing::{SignContext, SignatureResult, SigningState};
use crate::wallet::WalletSigner;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

pub struct DelegatedCustodian {
    wallet: Arc<dyn WalletSigner>,
}

impl DelegatedCustodian {
    pub fn new(wallet: Arc<dyn WalletSigner>) -> Self {
        Self { wallet }
    }

    /// Make sure the wallet session exists. Entering `Authorizing` here: the
    /// wallet approval sheet is this variant's user-presence proof.
    async fn ensure_authorized(&self, ctx: &SignContext) -> Result<(), SignatureResult> {
        ctx.enter(SigningState::Authorizing);
        if self.wallet.is_connected().await {
            return Ok(());
        }
        match self.wallet.authorize().await {
            Ok(account) => {
                info!(
                    "Wallet authorized: {} ({}..)",
                    account.label.as_deref().unwrap_or("unnamed"),
                    &hex::encode(&account.public_key)[..8.min(account.public_key.len() * 2)]
                );
                Ok(())
            }
            Err(e) => {
                warn!("Wallet authorization failed: {}", e);
                Err(SignatureResult::from_error(&e, ctx))
            }
        }
    }
}

#[async_trait]
impl KeyCustodian for DelegatedCustodian {
    fn variant(&self) -> CustodianVariant {
        CustodianVariant::Delegated
    }

    fn capabilities(&self) -> CustodyCapabilities {
        CustodyCapabilities {
            local_keys: false,
            governance_signing: false,
            transaction_signing: true,
        }
    }

    async fn generate(&self, _alias: &str, _require_biometric: bool) -> TrustResult<ManagedKey> {
        Err(TrustError::Unsupported(
            "key generation is delegated to the external wallet".into(),
        ))
    }

    async fn has_key(&self, _alias: &str) -> bool {
        false
    }

    async fn key(&self, _alias: &str) -> Option<ManagedKey> {
        None
    }

    async fn public_key(&self, _alias: &str) -> Option<Vec<u8>> {
        if !self.wallet.is_connected().await {
            return None;
        }
        self.wallet.public_key().await.ok()
    }

    async fn sign(&self, _alias: &str, _data: &[u8], ctx: &SignContext) -> SignatureResult {
        info!("Message signing is not available through the external wallet");
        SignatureResult::unsupported(ctx)
    }

    async fn delete(&self, _alias: &str) -> TrustResult<bool> {
        Err(TrustError::Unsupported(
            "no local key to delete; keys live in the external wallet".into(),
        ))
    }

    async fn sign_transaction(&self, tx: &[u8], ctx: &SignContext) -> SignatureResult {
        if let Err(result) = self.ensure_authorized(ctx).await {
            return result;
        }
        ctx.enter(SigningState::Signing);
        match self.wallet.sign_transaction(tx).await {
            Ok(signed) => SignatureResult::signed(signed, ctx),
            Err(e) => SignatureResult::from_error(&e, ctx),
        }
    }

    async fn sign_and_send_transaction(&self, tx: &[u8], ctx: &SignContext) -> SignatureResult {
        if let Err(result) = self.ensure_authorized(ctx).await {
            return result;
        }
        ctx.enter(SigningState::Signing);
        match self.wallet.sign_and_send_transaction(tx).await {
            Ok(signature) => SignatureResult::signed(signature, ctx),
            Err(e) => SignatureResult::from_error(&e, ctx),
        }
    }

    async fn disconnect(&self) -> TrustResult<()> {
        if !self.wallet.is_connected().await {
            return Ok(());
        }
        self.wallet.deauthorize().await?;
        info!("Wallet session ended");
        Ok(())
    }
}
