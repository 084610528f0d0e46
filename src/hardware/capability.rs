//! Security capability snapshot reported by the host device

use serde::{Deserialize, Serialize};

/// Biometric modality available for user presence checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiometricModality {
    None,
    Fingerprint,
    Face,
    /// Apple Vision Pro iris authentication
    OpticId,
    /// Hardware reports biometrics but not which kind
    Unknown,
}

impl BiometricModality {
    pub fn name(&self) -> &str {
        match self {
            BiometricModality::None => "none",
            BiometricModality::Fingerprint => "fingerprint",
            BiometricModality::Face => "face",
            BiometricModality::OpticId => "optic-id",
            BiometricModality::Unknown => "unknown",
        }
    }
}

/// Immutable snapshot of what the device can do, produced fresh on every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityCapability {
    pub has_biometric_hardware: bool,
    pub modality: BiometricModality,
    /// Secure Enclave, TEE or StrongBox present
    pub has_secure_hardware: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl SecurityCapability {
    /// The fail-closed snapshot returned whenever probing itself fails
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            has_biometric_hardware: false,
            modality: BiometricModality::None,
            has_secure_hardware: false,
            error_code: Some("PROBE_FAILED".to_string()),
            error_message: Some(reason.into()),
        }
    }

    /// Secure hardware with the given biometric modality
    pub fn secure_with(modality: BiometricModality) -> Self {
        Self {
            has_biometric_hardware: modality != BiometricModality::None,
            modality,
            has_secure_hardware: true,
            error_code: None,
            error_message: None,
        }
    }

    /// Neither secure hardware nor biometrics
    pub fn software_only() -> Self {
        Self {
            has_biometric_hardware: false,
            modality: BiometricModality::None,
            has_secure_hardware: false,
            error_code: None,
            error_message: None,
        }
    }

    /// Whether a biometric presence challenge can be issued at all
    pub fn can_authenticate_presence(&self) -> bool {
        self.has_biometric_hardware && self.modality != BiometricModality::None
    }
}

/// Outcome of a user presence (biometric) challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceOutcome {
    pub success: bool,
    /// User dismissed the prompt. Distinct from a hardware failure.
    pub cancelled: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl PresenceOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            cancelled: false,
            error_code: None,
            error_message: None,
        }
    }

    pub fn dismissed() -> Self {
        Self {
            success: false,
            cancelled: true,
            error_code: Some("USER_CANCEL".to_string()),
            error_message: Some("User cancelled authentication".to_string()),
        }
    }

    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
        }
    }
}
