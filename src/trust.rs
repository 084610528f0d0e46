//! Trust tiers — how strongly a key's custody is backed
//!
//! Secure Enclave, TEE and StrongBox fold into one `Hardware` tier: a
//! verifying party only needs "hardware-isolated key material", not vendor
//! detail. `Certified` needs an attestation chain this crate does not model;
//! it is only reachable through externally produced [`AttestationEvidence`].

use crate::custody::ManagedKey;
use crate::hardware::SecurityCapability;
use serde::{Deserialize, Serialize};

/// Ordered: `Software < Hardware < Certified`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    Software,
    Hardware,
    Certified,
}

impl TrustLevel {
    pub fn name(&self) -> &str {
        match self {
            TrustLevel::Software => "software",
            TrustLevel::Hardware => "hardware",
            TrustLevel::Certified => "certified",
        }
    }
}

/// Result of an attestation performed outside this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationEvidence {
    /// Who vouched for the key (e.g. an attestation service identifier)
    pub issuer: String,
    /// Set by the producer after verifying the chain
    pub verified: bool,
}

/// `Hardware` iff the device reports secure hardware, else `Software`.
///
/// `key` is accepted for call-site symmetry with the custody model; the
/// capability snapshot alone decides the tier.
pub fn resolve(capability: &SecurityCapability, _key: Option<&ManagedKey>) -> TrustLevel {
    if capability.has_secure_hardware {
        TrustLevel::Hardware
    } else {
        TrustLevel::Software
    }
}

/// Like [`resolve`], promoted to `Certified` only on a hardware base with
/// verified external evidence.
pub fn resolve_attested(
    capability: &SecurityCapability,
    key: Option<&ManagedKey>,
    attestation: Option<&AttestationEvidence>,
) -> TrustLevel {
    let base = resolve(capability, key);
    match attestation {
        Some(evidence) if evidence.verified && base == TrustLevel::Hardware => {
            TrustLevel::Certified
        }
        _ => base,
    }
}
