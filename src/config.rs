//! Configuration — JSON file with `ESTREAM_*` environment overrides

use crate::error::{TrustError, TrustResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prompt texts shown by the biometric sheet / wallet approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub message_reason: String,
    pub governance_reason: String,
    pub transaction_reason: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            message_reason: "Sign message".to_string(),
            governance_reason: "Authorize governance action".to_string(),
            transaction_reason: "Approve transaction".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Alias of the one identity key per device
    pub key_alias: String,
    /// Whether enrollment protects the key with biometrics
    pub require_biometric: bool,
    /// Base URL of the lattice; records go to `{endpoint}/etfa/fingerprints`
    pub lattice_endpoint: String,
    /// Samples per sub-measurement when the caller doesn't choose
    pub default_sample_count: u32,
    /// HTTP timeout for lattice submission
    pub request_timeout_secs: u64,
    /// How many recent nonces the replay guard remembers
    pub nonce_window: usize,
    pub prompts: PromptConfig,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            key_alias: "estream.identity".to_string(),
            require_biometric: true,
            lattice_endpoint: "http://127.0.0.1:8787".to_string(),
            default_sample_count: 500,
            request_timeout_secs: 10,
            nonce_window: 1024,
            prompts: PromptConfig::default(),
        }
    }
}

impl TrustConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> TrustResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// File config if present, defaults otherwise, then environment overrides
    pub fn load_or_default(path: impl AsRef<Path>) -> TrustResult<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::load(path)?
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TrustResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply `ESTREAM_*` variables from the process environment
    pub fn apply_env(self) -> TrustResult<Self> {
        self.apply_vars(std::env::vars())
    }

    fn apply_vars<I>(mut self, vars: I) -> TrustResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "ESTREAM_KEY_ALIAS" => self.key_alias = value,
                "ESTREAM_REQUIRE_BIOMETRIC" => {
                    self.require_biometric = parse_var(&key, &value)?;
                }
                "ESTREAM_LATTICE_ENDPOINT" => self.lattice_endpoint = value,
                "ESTREAM_SAMPLE_COUNT" => {
                    self.default_sample_count = parse_var(&key, &value)?;
                }
                "ESTREAM_REQUEST_TIMEOUT_SECS" => {
                    self.request_timeout_secs = parse_var(&key, &value)?;
                }
                "ESTREAM_NONCE_WINDOW" => self.nonce_window = parse_var(&key, &value)?,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> TrustResult<()> {
        if self.key_alias.trim().is_empty() {
            return Err(TrustError::Config("key_alias must not be empty".into()));
        }
        if self.default_sample_count == 0 {
            return Err(TrustError::Config(
                "default_sample_count must be at least 1".into(),
            ));
        }
        if self.nonce_window == 0 {
            return Err(TrustError::Config("nonce_window must be at least 1".into()));
        }
        if !(self.lattice_endpoint.starts_with("http://")
            || self.lattice_endpoint.starts_with("https://"))
        {
            return Err(TrustError::Config(format!(
                "lattice_endpoint must be an http(s) URL, got '{}'",
                self.lattice_endpoint
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> TrustResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TrustError::Config(format!("{} has invalid value '{}'", key, value)))
}
