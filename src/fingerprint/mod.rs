//! Device fingerprint — hardware timing identity
//!
//! - **Sampler**: the native timing battery behind a trait
//! - **Engine**: collection with progress, canonicalization, similarity
//! - **Lattice**: record mapping and HTTP submission

pub mod engine;
pub mod lattice;
pub mod sampler;
pub mod types;

pub use engine::{
    canonicalize, compare, compare_ratios, CollectionProgress, FingerprintEngine, ProgressSink,
};
pub use lattice::{
    to_lattice_record, EnvironmentContext, LatticeClient, LatticeRecord, StableRatios,
    ThermalState,
};
pub use sampler::{FingerprintSampler, SamplerEvent, SamplerReport, SimulatedSampler};
pub use types::{
    canonical_ratio, fingerprint_hash, DeviceFingerprint, DeviceInfo, FINGERPRINT_PHASE,
    RATIO_COUNT, RATIO_NAMES,
};
