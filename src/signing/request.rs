//! Per-request signing state machine
//!
//! ```text
//! Idle -> Probing -> (Authorizing) -> Signing -> { Signed | Cancelled | Failed }
//! ```
//!
//! `Authorizing` is the single suspension point awaiting the user and is only
//! entered for biometric-gated operations. A custodian driven directly (without
//! the orchestrator) may skip `Probing`.

use crate::hardware::SecurityCapability;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningState {
    Idle,
    Probing,
    Authorizing,
    Signing,
    Signed,
    Cancelled,
    Failed,
}

impl SigningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SigningState::Signed | SigningState::Cancelled | SigningState::Failed
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_advance_to(&self, next: SigningState) -> bool {
        use SigningState::*;
        match (self, next) {
            (Idle, Probing | Authorizing | Signing | Failed) => true,
            (Probing, Authorizing | Signing | Failed) => true,
            (Authorizing, Signing | Cancelled | Failed) => true,
            (Signing, Signed | Cancelled | Failed) => true,
            _ => false,
        }
    }
}

/// Context carried through one signing request: prompt texts plus the
/// state history.
pub struct SignContext {
    pub request_id: Uuid,
    /// Shown in the biometric / wallet prompt
    pub reason: String,
    pub subtitle: Option<String>,
    trace: Mutex<Vec<SigningState>>,
    /// Capability snapshot taken while `Probing`
    capability: Mutex<Option<SecurityCapability>>,
}

impl SignContext {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            reason: reason.into(),
            subtitle: None,
            trace: Mutex::new(vec![SigningState::Idle]),
            capability: Mutex::new(None),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn state(&self) -> SigningState {
        let trace = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        trace.last().copied().unwrap_or(SigningState::Idle)
    }

    /// Advance to `next`. Illegal transitions are logged and ignored.
    pub fn enter(&self, next: SigningState) -> bool {
        let mut trace = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        let current = trace.last().copied().unwrap_or(SigningState::Idle);
        if current == next {
            return true;
        }
        if !current.can_advance_to(next) {
            log::warn!(
                "Request {}: illegal signing transition {:?} -> {:?}",
                &self.request_id.to_string()[..8],
                current,
                next
            );
            return false;
        }
        log::debug!(
            "Request {}: {:?} -> {:?}",
            &self.request_id.to_string()[..8],
            current,
            next
        );
        trace.push(next);
        true
    }

    /// Keep the capability result so custodians reuse it for this request
    pub fn record_capability(&self, capability: SecurityCapability) {
        *self.capability.lock().unwrap_or_else(|p| p.into_inner()) = Some(capability);
    }

    pub fn capability(&self) -> Option<SecurityCapability> {
        self.capability
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// States visited so far, in order
    pub fn trace(&self) -> Vec<SigningState> {
        self.trace.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
