//! Simulated wallet — Ed25519 account with scriptable user decisions

use super::{WalletAccount, WalletSigner};
use crate::error::{TrustError, TrustResult};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub struct SimulatedWallet {
    signing_key: SigningKey,
    label: String,
    connected: AtomicBool,
    /// The next user decision (authorize or approve) is a decline
    decline_next: AtomicBool,
    transport_failure: AtomicBool,
    /// Transactions "broadcast" via sign_and_send
    sent: Mutex<Vec<Vec<u8>>>,
}

impl SimulatedWallet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            label: label.into(),
            connected: AtomicBool::new(false),
            decline_next: AtomicBool::new(false),
            transport_failure: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn decline_next(&self) {
        self.decline_next.store(true, Ordering::SeqCst);
    }

    pub fn set_transport_failure(&self, failing: bool) {
        self.transport_failure.store(failing, Ordering::SeqCst);
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn check(&self) -> TrustResult<()> {
        if self.transport_failure.load(Ordering::SeqCst) {
            return Err(TrustError::Transport("wallet app unreachable".into()));
        }
        if self.decline_next.swap(false, Ordering::SeqCst) {
            return Err(TrustError::UserCancelled);
        }
        Ok(())
    }

    fn require_connected(&self) -> TrustResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TrustError::Precondition("wallet not authorized".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletSigner for SimulatedWallet {
    async fn authorize(&self) -> TrustResult<WalletAccount> {
        self.check()?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(WalletAccount {
            public_key: self.signing_key.verifying_key().to_bytes().to_vec(),
            label: Some(self.label.clone()),
            auth_token: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn public_key(&self) -> TrustResult<Vec<u8>> {
        self.require_connected()?;
        Ok(self.signing_key.verifying_key().to_bytes().to_vec())
    }

    async fn sign_transaction(&self, tx: &[u8]) -> TrustResult<Vec<u8>> {
        self.require_connected()?;
        self.check()?;
        // Signature first, then the message, like a single-signer wire tx
        let signature = self.signing_key.sign(tx);
        let mut signed = signature.to_bytes().to_vec();
        signed.extend_from_slice(tx);
        Ok(signed)
    }

    async fn sign_and_send_transaction(&self, tx: &[u8]) -> TrustResult<Vec<u8>> {
        let signed = self.sign_transaction(tx).await?;
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(signed.clone());
        Ok(signed[..64].to_vec())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn deauthorize(&self) -> TrustResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
