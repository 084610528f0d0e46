//! Fingerprint sampler boundary — the timing battery runs natively
//!
//! The sampler measures; the engine canonicalizes, hashes and scores.
//! Progress flows back as `(operation, progress)` events on a channel.

use super::types::{DeviceInfo, FINGERPRINT_PHASE, RATIO_COUNT, RATIO_NAMES};
use crate::error::{TrustError, TrustResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::UnboundedSender;

/// One progress event from the native battery
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerEvent {
    /// Sub-measurement that just completed
    pub operation: String,
    /// Overall fraction of the battery done
    pub progress: f64,
}

/// Raw battery output before canonicalization
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerReport {
    pub phase: u32,
    pub sample_count: u32,
    pub stable_ratios: Vec<f64>,
}

#[async_trait]
pub trait FingerprintSampler: Send + Sync {
    async fn is_supported(&self) -> bool;

    async fn device_info(&self) -> TrustResult<DeviceInfo>;

    /// Run the battery with `sample_count` samples per sub-measurement.
    /// `events` is dropped when the battery finishes.
    async fn collect(
        &self,
        sample_count: u32,
        events: UnboundedSender<SamplerEvent>,
    ) -> TrustResult<SamplerReport>;
}

/// Deterministic per-device timing profile with measurement jitter
///
/// The profile is derived from the device model, so two samplers for the
/// same model behave like one physical device. Jitter shrinks as
/// `1/sqrt(sample_count)`, like averaging real timings.
pub struct SimulatedSampler {
    info: DeviceInfo,
    profile: [f64; RATIO_COUNT],
    /// Relative jitter at one sample
    jitter: f64,
    supported: bool,
}

impl SimulatedSampler {
    pub fn new(device_model: &str) -> Self {
        let info = DeviceInfo {
            platform: "simulated".to_string(),
            platform_version: env!("CARGO_PKG_VERSION").to_string(),
            device_model: device_model.to_string(),
            device_name: format!("{} (simulated)", device_model),
            is_emulator: true,
        };
        Self {
            profile: Self::profile_for(device_model),
            info,
            jitter: 0.2,
            supported: true,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Ratios in (0.5, 4.5], one per battery entry
    fn profile_for(device_model: &str) -> [f64; RATIO_COUNT] {
        let mut h = Sha256::new();
        h.update(device_model.as_bytes());
        h.update(b"estream-timing-profile-v1");
        let digest = h.finalize();

        let mut profile = [0.0; RATIO_COUNT];
        for (i, slot) in profile.iter_mut().enumerate() {
            *slot = 0.5 + 4.0 * (f64::from(digest[i]) + 1.0) / 256.0;
        }
        profile
    }
}

#[async_trait]
impl FingerprintSampler for SimulatedSampler {
    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn device_info(&self) -> TrustResult<DeviceInfo> {
        Ok(self.info.clone())
    }

    async fn collect(
        &self,
        sample_count: u32,
        events: UnboundedSender<SamplerEvent>,
    ) -> TrustResult<SamplerReport> {
        if !self.supported {
            return Err(TrustError::Unsupported(
                "timing battery not available on this device".into(),
            ));
        }

        let mut rng = StdRng::from_entropy();
        let spread = self.jitter / f64::from(sample_count.max(1)).sqrt();
        let mut ratios = Vec::with_capacity(RATIO_COUNT);

        for (i, name) in RATIO_NAMES.iter().enumerate() {
            let noise = if spread > 0.0 {
                rng.gen_range(-spread..spread)
            } else {
                0.0
            };
            ratios.push(self.profile[i] * (1.0 + noise));

            // Receiver may have gone away; measurement continues regardless
            let _ = events.send(SamplerEvent {
                operation: (*name).to_string(),
                progress: (i + 1) as f64 / RATIO_COUNT as f64,
            });
            tokio::task::yield_now().await;
        }

        Ok(SamplerReport {
            phase: FINGERPRINT_PHASE,
            sample_count,
            stable_ratios: ratios,
        })
    }
}
