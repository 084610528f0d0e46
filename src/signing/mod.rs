//! Signing — the trust-tiered signing contract
//!
//! - **Orchestrator**: message, governance and transaction entry points
//! - **Governance**: action augmentation, canonical JSON, content hash
//! - **Replay**: nonce + monotonic timestamp guard
//! - **Request**: per-request state machine
//! - **Result**: structured signing outcome

pub mod governance;
pub mod orchestrator;
pub mod replay;
pub mod request;
pub mod result;

pub use governance::{action_hash, canonical_json, AugmentedAction, GovernanceAction};
pub use orchestrator::SigningOrchestrator;
pub use replay::{ReplayGuard, ReplayStamp, NONCE_LEN};
pub use request::{SignContext, SigningState};
pub use result::SignatureResult;
