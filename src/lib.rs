//! eStream mobile core — trust-tiered signing and device fingerprinting
//!
//! One signing contract over every custody model: keys in the platform
//! secure element, or delegated to an external wallet. Next to it, a
//! hardware timing fingerprint for device identity on the lattice.
//!
//! - **Hardware**: native bridge boundary, capability probe
//! - **Custody**: enclave and delegated key custodians
//! - **Signing**: orchestrator, governance augmentation, replay guard
//! - **Trust**: trust level resolution
//! - **Fingerprint**: timing battery, similarity, lattice submission

pub mod config;
pub mod context;
pub mod custody;
pub mod error;
pub mod fingerprint;
pub mod hardware;
pub mod signing;
pub mod trust;
pub mod wallet;

pub use config::{PromptConfig, TrustConfig};
pub use context::{ServiceContext, SignerBackend};
pub use custody::{KeyCustodian, ManagedKey};
pub use error::{ErrorKind, TrustError, TrustResult};
pub use fingerprint::{DeviceFingerprint, FingerprintEngine, LatticeRecord};
pub use hardware::{CapabilityProbe, HardwareBridge, SecurityCapability};
pub use signing::{GovernanceAction, SignatureResult, SigningOrchestrator};
pub use trust::TrustLevel;
pub use wallet::WalletSigner;
