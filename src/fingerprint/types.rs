//! Device fingerprint data model and the fixed ratio battery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Measurement battery protocol version
pub const FINGERPRINT_PHASE: u32 = 1;

/// Number of stable ratios in the battery
pub const RATIO_COUNT: usize = 16;

/// Ratios are quantized to `1 / RATIO_SCALE` before hashing
pub const RATIO_SCALE: f64 = 1e6;

/// Stable ratio names, index-aligned with `DeviceFingerprint::stable_ratios`.
/// Reordering or removing an entry breaks cross-device comparability.
pub const RATIO_NAMES: [&str; RATIO_COUNT] = [
    "r0_int_float",
    "r1_int_memory",
    "r2_float_memory",
    "r3_seq_random_read",
    "r4_cache_l1_l2",
    "r5_cache_l2_dram",
    "r6_branch_predicted",
    "r7_alloc_free",
    "r8_atomic_plain",
    "r9_hash_int",
    "r10_simd_scalar",
    "r11_div_mul",
    "r12_syscall_int",
    "r13_thread_yield",
    "r14_timer_resolution",
    "r15_crypto_hash",
];

/// Host description reported by the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub platform_version: String,
    pub device_model: String,
    pub device_name: String,
    pub is_emulator: bool,
}

/// Timing fingerprint of one physical device; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub id: String,
    pub phase: u32,
    pub platform: String,
    pub platform_version: String,
    pub device_model: String,
    pub sample_count: u32,
    pub timestamp: DateTime<Utc>,
    /// `RATIO_COUNT` canonical ratios, ordered as `RATIO_NAMES`
    pub stable_ratios: Vec<f64>,
    /// Hex SHA-256 of `stable_ratios`
    pub fingerprint_hash: String,
}

impl DeviceFingerprint {
    /// Ratio by battery name
    pub fn ratio(&self, name: &str) -> Option<f64> {
        RATIO_NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(|i| self.stable_ratios.get(i).copied())
    }

    /// Whether the stored hash matches the ratios
    pub fn hash_is_consistent(&self) -> bool {
        fingerprint_hash(&self.stable_ratios) == self.fingerprint_hash
    }
}

/// Non-finite or negative measurements carry no information and become 0.
/// Everything else is quantized to six decimal places.
pub fn canonical_ratio(raw: f64) -> f64 {
    if !raw.is_finite() || raw < 0.0 {
        return 0.0;
    }
    let scaled = (raw * RATIO_SCALE).round();
    if !scaled.is_finite() {
        // Too large to carry a fractional part; already on the grid
        return raw;
    }
    scaled / RATIO_SCALE
}

/// Hex SHA-256 over the little-endian bytes of each ratio
pub fn fingerprint_hash(ratios: &[f64]) -> String {
    let mut h = Sha256::new();
    for ratio in ratios {
        h.update(ratio.to_le_bytes());
    }
    hex::encode(h.finalize())
}
