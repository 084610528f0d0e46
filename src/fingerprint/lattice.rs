//! Lattice record — wire form of a fingerprint for the verification lattice
//!
//! Records are JSON (camelCase) and POSTed to `{endpoint}/etfa/fingerprints`.
//! Submission is fire-and-report: a boolean outcome, no retry.

use super::types::{DeviceFingerprint, RATIO_COUNT};
use crate::config::TrustConfig;
use crate::error::{TrustError, TrustResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lattice record schema version
pub const LATTICE_SCHEMA_VERSION: u32 = 1;

/// Path the lattice accepts fingerprint records on
pub const SUBMISSION_PATH: &str = "/etfa/fingerprints";

/// The 16 ratios keyed by battery name
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StableRatios {
    pub r0_int_float: f64,
    pub r1_int_memory: f64,
    pub r2_float_memory: f64,
    pub r3_seq_random_read: f64,
    pub r4_cache_l1_l2: f64,
    pub r5_cache_l2_dram: f64,
    pub r6_branch_predicted: f64,
    pub r7_alloc_free: f64,
    pub r8_atomic_plain: f64,
    pub r9_hash_int: f64,
    pub r10_simd_scalar: f64,
    pub r11_div_mul: f64,
    pub r12_syscall_int: f64,
    pub r13_thread_yield: f64,
    pub r14_timer_resolution: f64,
    pub r15_crypto_hash: f64,
}

impl StableRatios {
    pub fn from_slice(ratios: &[f64]) -> TrustResult<Self> {
        let r: &[f64; RATIO_COUNT] = ratios.try_into().map_err(|_| {
            TrustError::Precondition(format!(
                "expected {} stable ratios, got {}",
                RATIO_COUNT,
                ratios.len()
            ))
        })?;
        Ok(Self {
            r0_int_float: r[0],
            r1_int_memory: r[1],
            r2_float_memory: r[2],
            r3_seq_random_read: r[3],
            r4_cache_l1_l2: r[4],
            r5_cache_l2_dram: r[5],
            r6_branch_predicted: r[6],
            r7_alloc_free: r[7],
            r8_atomic_plain: r[8],
            r9_hash_int: r[9],
            r10_simd_scalar: r[10],
            r11_div_mul: r[11],
            r12_syscall_int: r[12],
            r13_thread_yield: r[13],
            r14_timer_resolution: r[14],
            r15_crypto_hash: r[15],
        })
    }

    /// Ratios in battery order
    pub fn to_array(&self) -> [f64; RATIO_COUNT] {
        [
            self.r0_int_float,
            self.r1_int_memory,
            self.r2_float_memory,
            self.r3_seq_random_read,
            self.r4_cache_l1_l2,
            self.r5_cache_l2_dram,
            self.r6_branch_predicted,
            self.r7_alloc_free,
            self.r8_atomic_plain,
            self.r9_hash_int,
            self.r10_simd_scalar,
            self.r11_div_mul,
            self.r12_syscall_int,
            self.r13_thread_yield,
            self.r14_timer_resolution,
            self.r15_crypto_hash,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    Nominal,
    Fair,
    Serious,
    Critical,
}

/// Device conditions at collection time; timing ratios drift under load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentContext {
    /// Charge fraction in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_state: Option<ThermalState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

impl EnvironmentContext {
    fn validate(&self) -> TrustResult<()> {
        if let Some(level) = self.battery_level {
            if !(0.0..=1.0).contains(&level) {
                return Err(TrustError::Precondition(format!(
                    "battery_level must be in [0, 1], got {}",
                    level
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatticeRecord {
    pub schema_version: u32,
    /// Stable device identity: the fingerprint hash
    pub device_id: String,
    pub fingerprint_id: String,
    pub phase: u32,
    pub platform: String,
    pub platform_version: String,
    pub device_model: String,
    pub sample_count: u32,
    pub collected_at: DateTime<Utc>,
    pub fingerprint_hash: String,
    pub stable_ratios: StableRatios,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<EnvironmentContext>,
}

/// Map a fingerprint to its lattice record
pub fn to_lattice_record(
    fingerprint: &DeviceFingerprint,
    context: Option<EnvironmentContext>,
) -> TrustResult<LatticeRecord> {
    let stable_ratios = StableRatios::from_slice(&fingerprint.stable_ratios)?;
    if let Some(ctx) = &context {
        ctx.validate()?;
    }
    Ok(LatticeRecord {
        schema_version: LATTICE_SCHEMA_VERSION,
        device_id: fingerprint.fingerprint_hash.clone(),
        fingerprint_id: fingerprint.id.clone(),
        phase: fingerprint.phase,
        platform: fingerprint.platform.clone(),
        platform_version: fingerprint.platform_version.clone(),
        device_model: fingerprint.device_model.clone(),
        sample_count: fingerprint.sample_count,
        collected_at: fingerprint.timestamp,
        fingerprint_hash: fingerprint.fingerprint_hash.clone(),
        stable_ratios,
        context,
    })
}

/// HTTP client for the lattice endpoint
pub struct LatticeClient {
    endpoint: String,
    client: reqwest::Client,
}

impl LatticeClient {
    pub fn new(endpoint: &str, timeout: Duration) -> TrustResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrustError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &TrustConfig) -> TrustResult<Self> {
        Self::new(
            &config.lattice_endpoint,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn submission_url(&self) -> String {
        format!("{}{}", self.endpoint, SUBMISSION_PATH)
    }

    /// POST the record; true only on a 2xx response
    pub async fn submit(&self, record: &LatticeRecord) -> bool {
        let url = self.submission_url();
        match self.client.post(&url).json(record).send().await {
            Ok(resp) if resp.status().is_success() => {
                log::info!(
                    "Submitted fingerprint {} to lattice ({})",
                    record.fingerprint_id,
                    resp.status()
                );
                true
            }
            Ok(resp) => {
                log::warn!("Lattice rejected fingerprint {}: {}", record.fingerprint_id, resp.status());
                false
            }
            Err(e) => {
                log::warn!("Lattice submission to {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::sampler::SimulatedSampler;
    use crate::fingerprint::types::{fingerprint_hash, RATIO_NAMES};
    use crate::fingerprint::FingerprintEngine;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_fingerprint() -> DeviceFingerprint {
        let ratios: Vec<f64> = (0..RATIO_COUNT).map(|i| 1.0 + i as f64 * 0.125).collect();
        DeviceFingerprint {
            id: "fp-1".into(),
            phase: 1,
            platform: "android".into(),
            platform_version: "14".into(),
            device_model: "Pixel 8".into(),
            sample_count: 500,
            timestamp: Utc::now(),
            fingerprint_hash: fingerprint_hash(&ratios),
            stable_ratios: ratios,
        }
    }

    fn client(endpoint: &str) -> LatticeClient {
        LatticeClient::new(endpoint, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_record_carries_all_ratios_by_name() {
        let fp = sample_fingerprint();
        let record = to_lattice_record(&fp, None).unwrap();
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.device_id, fp.fingerprint_hash);
        assert_eq!(record.stable_ratios.to_array().to_vec(), fp.stable_ratios);

        let json = serde_json::to_value(&record).unwrap();
        let ratios = json["stableRatios"].as_object().unwrap();
        assert_eq!(ratios.len(), RATIO_COUNT);
        for (i, name) in RATIO_NAMES.iter().enumerate() {
            assert_eq!(ratios[*name].as_f64().unwrap(), fp.stable_ratios[i]);
        }
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["deviceModel"], "Pixel 8");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = to_lattice_record(&sample_fingerprint(), None).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        let back: LatticeRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn test_collected_fingerprint_maps_to_record() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("Pixel 8")));
        let fp = engine.collect(50, None).await.unwrap();
        let record = to_lattice_record(&fp, None).unwrap();
        assert_eq!(record.fingerprint_id, fp.id);
        assert_eq!(record.fingerprint_hash, fp.fingerprint_hash);
        assert_eq!(record.sample_count, 50);

        let json = serde_json::to_value(&record).unwrap();
        for name in RATIO_NAMES {
            assert_eq!(json["stableRatios"][name].as_f64(), fp.ratio(name), "{}", name);
        }

        let text = serde_json::to_string(&record).unwrap();
        let back: LatticeRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
        assert_eq!(fingerprint_hash(&back.stable_ratios.to_array()), fp.fingerprint_hash);
    }

    #[test]
    fn test_wrong_ratio_count_rejected() {
        let mut fp = sample_fingerprint();
        fp.stable_ratios.pop();
        let err = to_lattice_record(&fp, None).unwrap_err();
        assert!(matches!(err, TrustError::Precondition(_)));
    }

    #[test]
    fn test_context_serialization() {
        let ctx = EnvironmentContext {
            battery_level: Some(0.8),
            is_charging: Some(false),
            thermal_state: Some(ThermalState::Fair),
            app_version: None,
        };
        let record = to_lattice_record(&sample_fingerprint(), Some(ctx)).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["context"]["batteryLevel"], 0.8);
        assert_eq!(json["context"]["thermalState"], "fair");
        assert!(json["context"].get("appVersion").is_none());

        let bad = EnvironmentContext {
            battery_level: Some(1.5),
            ..Default::default()
        };
        assert!(to_lattice_record(&sample_fingerprint(), Some(bad)).is_err());
    }

    #[test]
    fn test_submission_url_trims_slash() {
        let c = client("http://lattice.test/");
        assert_eq!(c.submission_url(), "http://lattice.test/etfa/fingerprints");
    }

    #[tokio::test]
    async fn test_submit_success() {
        let server = MockServer::start().await;
        let fp = sample_fingerprint();
        Mock::given(method("POST"))
            .and(path("/etfa/fingerprints"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "deviceId": fp.fingerprint_hash,
                "schemaVersion": 1
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let record = to_lattice_record(&fp, None).unwrap();
        assert!(client(&server.uri()).submit(&record).await);
    }

    #[tokio::test]
    async fn test_submit_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/etfa/fingerprints"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let record = to_lattice_record(&sample_fingerprint(), None).unwrap();
        assert!(!client(&server.uri()).submit(&record).await);
    }

    #[tokio::test]
    async fn test_submit_unreachable() {
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let record = to_lattice_record(&sample_fingerprint(), None).unwrap();
        assert!(!client(&uri).submit(&record).await);
    }
}
