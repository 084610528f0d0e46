//! SignatureResult — structured outcome of every signing entry point
//!
//! Signing never returns `Err`: success, user cancellation, unsupported
//! operations and failures are all values a caller can branch on.

use super::governance::AugmentedAction;
use super::request::{SignContext, SigningState};
use crate::error::{ErrorKind, TrustError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResult {
    pub success: bool,
    /// Canonical encoding (standard base64)
    pub signature: Option<String>,
    /// Raw signature bytes as returned by the custodian
    pub signature_raw: Option<Vec<u8>>,
    /// Hex SHA-256 of the canonical augmented action (governance only)
    pub action_hash: Option<String>,
    /// The exact augmented action that was hashed and signed (governance only)
    pub signed_action: Option<AugmentedAction>,
    /// User dismissed the prompt; distinct from failure
    pub cancelled: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub request_id: Uuid,
    /// States the request went through
    pub trace: Vec<SigningState>,
}

impl SignatureResult {
    fn base(ctx: &SignContext) -> Self {
        Self {
            success: false,
            signature: None,
            signature_raw: None,
            action_hash: None,
            signed_action: None,
            cancelled: false,
            error_kind: None,
            error_message: None,
            request_id: ctx.request_id,
            trace: Vec::new(),
        }
    }

    pub fn signed(raw: Vec<u8>, ctx: &SignContext) -> Self {
        ctx.enter(SigningState::Signed);
        Self {
            success: true,
            signature: Some(STANDARD.encode(&raw)),
            signature_raw: Some(raw),
            trace: ctx.trace(),
            ..Self::base(ctx)
        }
    }

    pub fn cancelled(ctx: &SignContext) -> Self {
        ctx.enter(SigningState::Cancelled);
        Self {
            cancelled: true,
            error_kind: Some(ErrorKind::UserCancelled),
            error_message: Some("User cancelled".to_string()),
            trace: ctx.trace(),
            ..Self::base(ctx)
        }
    }

    /// The operation does not exist on this platform. `error_message` is
    /// exactly `"Unsupported"`.
    pub fn unsupported(ctx: &SignContext) -> Self {
        Self::failed(ErrorKind::Unsupported, ErrorKind::Unsupported.to_string(), ctx)
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, ctx: &SignContext) -> Self {
        ctx.enter(SigningState::Failed);
        Self {
            error_kind: Some(kind),
            error_message: Some(message.into()),
            trace: ctx.trace(),
            ..Self::base(ctx)
        }
    }

    pub fn from_error(err: &TrustError, ctx: &SignContext) -> Self {
        match err.kind() {
            ErrorKind::UserCancelled => Self::cancelled(ctx),
            ErrorKind::Unsupported => Self::unsupported(ctx),
            kind => Self::failed(kind, err.to_string(), ctx),
        }
    }

    /// Attach the governance hash and payload
    pub fn with_action(mut self, action_hash: String, action: AugmentedAction) -> Self {
        self.action_hash = Some(action_hash);
        self.signed_action = Some(action);
        self
    }

    pub fn is_unsupported(&self) -> bool {
        self.error_kind == Some(ErrorKind::Unsupported)
    }
}
