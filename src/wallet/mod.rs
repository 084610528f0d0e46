//! External wallet signer boundary
//!
//! On platforms where the signing model requires an external wallet (Android
//! with a Mobile Wallet Adapter app), transactions are authorized and signed
//! by the wallet, never by a local substitute key. Transaction construction
//! and the adapter protocol live outside this crate.

pub mod simulated;

pub use simulated::SimulatedWallet;

use crate::error::TrustResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Account handed back by a successful `authorize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub public_key: Vec<u8>,
    pub label: Option<String>,
    /// Opaque token for reauthorization
    pub auth_token: String,
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Prompt the user to connect; `UserCancelled` if they decline
    async fn authorize(&self) -> TrustResult<WalletAccount>;

    async fn public_key(&self) -> TrustResult<Vec<u8>>;

    /// Returns the signed transaction bytes
    async fn sign_transaction(&self, tx: &[u8]) -> TrustResult<Vec<u8>>;

    /// Sign and broadcast; returns the transaction signature
    async fn sign_and_send_transaction(&self, tx: &[u8]) -> TrustResult<Vec<u8>>;

    async fn is_connected(&self) -> bool;

    async fn deauthorize(&self) -> TrustResult<()>;
}
