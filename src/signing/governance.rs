//! Governance actions — augmentation, canonical serialization, content hash
//!
//! A governance action is signed as:
//! 1. augment with a replay stamp (`timestamp` ms + hex `nonce`)
//! 2. serialize canonically: compact JSON, object keys sorted at every depth
//! 3. hash the serialized bytes (SHA-256, hex)
//! 4. sign the serialized bytes
//!
//! The same logical action with the same stamp always hashes identically,
//! regardless of the order params were inserted in.

use super::replay::ReplayStamp;
use crate::error::TrustResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Caller-supplied privileged operation, e.g. `{type: "node", operation: "restart"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub operation: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl GovernanceAction {
    pub fn new(action_type: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            operation: operation.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Approval vote on a pending governance request
    pub fn approval(request_id: impl Into<String>, approve: bool) -> Self {
        let operation = if approve { "approve" } else { "reject" };
        Self::new("approval", operation).with_param("requestId", request_id.into())
    }

    /// Attach a replay stamp. Consumes the action: the augmented form is
    /// the only thing that gets signed.
    pub fn augment(self, stamp: ReplayStamp) -> AugmentedAction {
        AugmentedAction {
            action: self,
            timestamp: stamp.timestamp,
            nonce: stamp.nonce,
        }
    }
}

/// The action as actually signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedAction {
    #[serde(flatten)]
    pub action: GovernanceAction,
    /// Wall-clock milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Hex-encoded random nonce
    pub nonce: String,
}

impl AugmentedAction {
    /// Deterministic serialization covered by the signature
    pub fn canonical_bytes(&self) -> TrustResult<Vec<u8>> {
        let value = serde_json::to_value(self)?;
        Ok(canonical_json(&value)?.into_bytes())
    }

    /// Recompute the hash and compare, for verifiers holding the action
    pub fn matches_hash(&self, expected: &str) -> bool {
        self.canonical_bytes()
            .map(|bytes| action_hash(&bytes) == expected)
            .unwrap_or(false)
    }
}

/// Hex SHA-256 of serialized action bytes
pub fn action_hash(serialized: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(serialized);
    hex::encode(h.finalize())
}

/// Compact JSON with object keys sorted recursively
pub fn canonical_json(value: &Value) -> TrustResult<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> TrustResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(val, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        leaf => out.push_str(&serde_json::to_string(leaf)?),
    }
    Ok(())
}
