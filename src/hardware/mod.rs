//! Hardware — device security capabilities and the native key/biometric boundary
//!
//! - **Capability**: snapshot of secure hardware + biometric modality
//! - **Bridge**: async trait the native Secure Enclave / Keystore shim implements
//! - **Probe**: fail-closed capability query
//! - **Simulated**: in-memory bridge used by tests and the CLI

pub mod bridge;
pub mod capability;
pub mod probe;
pub mod simulated;

pub use bridge::HardwareBridge;
pub use capability::{BiometricModality, PresenceOutcome, SecurityCapability};
pub use probe::CapabilityProbe;
pub use simulated::SimulatedHardware;
