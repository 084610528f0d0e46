//! Service context — the one place backends are chosen and wired
//!
//! Built once at startup from a `TrustConfig` and a `SignerBackend`; holds the
//! orchestrator, the fingerprint engine and the lattice client.

use crate::config::TrustConfig;
use crate::custody::{DelegatedCustodian, EnclaveCustodian, KeyCustodian};
use crate::error::TrustResult;
use crate::fingerprint::{
    to_lattice_record, DeviceFingerprint, EnvironmentContext, FingerprintEngine,
    FingerprintSampler, LatticeClient, ProgressSink, SimulatedSampler,
};
use crate::hardware::{
    BiometricModality, CapabilityProbe, HardwareBridge, SecurityCapability, SimulatedHardware,
};
use crate::signing::SigningOrchestrator;
use crate::wallet::{SimulatedWallet, WalletSigner};
use std::sync::Arc;

/// Which custody model signs on this device
pub enum SignerBackend {
    /// Keys live in the platform secure element
    Enclave { hardware: Arc<dyn HardwareBridge> },
    /// An external wallet holds the key; the bridge still answers probes
    Delegated {
        hardware: Arc<dyn HardwareBridge>,
        wallet: Arc<dyn WalletSigner>,
    },
}

impl SignerBackend {
    fn into_parts(self) -> (Arc<dyn HardwareBridge>, Arc<dyn KeyCustodian>) {
        match self {
            SignerBackend::Enclave { hardware } => {
                let custodian: Arc<dyn KeyCustodian> =
                    Arc::new(EnclaveCustodian::new(hardware.clone()));
                (hardware, custodian)
            }
            SignerBackend::Delegated { hardware, wallet } => {
                let custodian: Arc<dyn KeyCustodian> = Arc::new(DelegatedCustodian::new(wallet));
                (hardware, custodian)
            }
        }
    }
}

pub struct ServiceContext {
    config: TrustConfig,
    signer: SigningOrchestrator,
    fingerprints: FingerprintEngine,
    lattice: LatticeClient,
}

impl ServiceContext {
    pub fn new(
        config: TrustConfig,
        backend: SignerBackend,
        sampler: Arc<dyn FingerprintSampler>,
    ) -> TrustResult<Self> {
        config.validate()?;
        let (hardware, custodian) = backend.into_parts();
        let signer =
            SigningOrchestrator::from_config(&config, custodian, CapabilityProbe::new(hardware));
        let lattice = LatticeClient::from_config(&config)?;
        log::info!(
            "Service context ready: lattice={}, sample_count={}",
            config.lattice_endpoint,
            config.default_sample_count
        );
        Ok(Self {
            config,
            signer,
            fingerprints: FingerprintEngine::new(sampler),
            lattice,
        })
    }

    /// Secure hardware with fingerprint biometrics, every prompt accepted
    pub fn simulated(config: TrustConfig) -> TrustResult<Self> {
        let hardware = Arc::new(SimulatedHardware::new(SecurityCapability::secure_with(
            BiometricModality::Fingerprint,
        )));
        Self::new(
            config,
            SignerBackend::Enclave { hardware },
            Arc::new(SimulatedSampler::new("simulated-device")),
        )
    }

    /// Software-only device whose transactions go to a simulated wallet
    pub fn simulated_delegated(config: TrustConfig) -> TrustResult<Self> {
        let hardware = Arc::new(SimulatedHardware::new(SecurityCapability::software_only()));
        Self::new(
            config,
            SignerBackend::Delegated {
                hardware,
                wallet: Arc::new(SimulatedWallet::new("simulated-wallet")),
            },
            Arc::new(SimulatedSampler::new("simulated-device")),
        )
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn signer(&self) -> &SigningOrchestrator {
        &self.signer
    }

    pub fn fingerprints(&self) -> &FingerprintEngine {
        &self.fingerprints
    }

    pub fn lattice(&self) -> &LatticeClient {
        &self.lattice
    }

    /// Collect with the configured sample count unless one is given
    pub async fn collect_fingerprint(
        &self,
        sample_count: Option<u32>,
        progress: Option<&dyn ProgressSink>,
    ) -> TrustResult<DeviceFingerprint> {
        let samples = sample_count.unwrap_or(self.config.default_sample_count);
        self.fingerprints.collect(samples, progress).await
    }

    /// Map and POST a fingerprint; `Ok(false)` means the lattice didn't accept it
    pub async fn submit_fingerprint(
        &self,
        fingerprint: &DeviceFingerprint,
        context: Option<EnvironmentContext>,
    ) -> TrustResult<bool> {
        let record = to_lattice_record(fingerprint, context)?;
        Ok(self.lattice.submit(&record).await)
    }
}
