//! Fingerprint engine — collection, canonicalization and similarity
//!
//! One collection may be in flight per engine. Progress is forwarded from
//! the sampler to the caller's sink while the battery runs, clamped to
//! [0, 1] and never decreasing, and always finishes at exactly 1.0.

use super::sampler::{FingerprintSampler, SamplerEvent};
use super::types::{canonical_ratio, fingerprint_hash, DeviceFingerprint, RATIO_COUNT};
use crate::error::{TrustError, TrustResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Operation name reported with the final 1.0 progress event
pub const COMPLETE_OPERATION: &str = "complete";

/// Relative difference charged when two non-zero ratios average to zero
const MAX_RELATIVE_DIFF: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionProgress {
    pub operation: String,
    /// Overall fraction in [0, 1]
    pub fraction: f64,
}

/// Receives collection progress on the collecting task
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: CollectionProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(CollectionProgress) + Send + Sync,
{
    fn report(&self, progress: CollectionProgress) {
        self(progress)
    }
}

impl ProgressSink for mpsc::UnboundedSender<CollectionProgress> {
    fn report(&self, progress: CollectionProgress) {
        // A caller that stopped listening doesn't stop the collection
        let _ = self.send(progress);
    }
}

pub struct FingerprintEngine {
    sampler: Arc<dyn FingerprintSampler>,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag however collection ends
struct CollectionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CollectionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl FingerprintEngine {
    pub fn new(sampler: Arc<dyn FingerprintSampler>) -> Self {
        Self {
            sampler,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn is_supported(&self) -> bool {
        self.sampler.is_supported().await
    }

    pub fn is_collecting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> TrustResult<CollectionGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrustError::Precondition(
                "a fingerprint collection is already in progress".into(),
            ));
        }
        Ok(CollectionGuard {
            flag: &self.in_flight,
        })
    }

    /// Run the timing battery and produce a canonical fingerprint
    pub async fn collect(
        &self,
        sample_count: u32,
        progress: Option<&dyn ProgressSink>,
    ) -> TrustResult<DeviceFingerprint> {
        if sample_count == 0 {
            return Err(TrustError::Precondition(
                "sample_count must be at least 1".into(),
            ));
        }
        let _guard = self.begin()?;

        if !self.sampler.is_supported().await {
            return Err(TrustError::Unsupported(
                "device fingerprinting is not supported on this device".into(),
            ));
        }
        let info = self.sampler.device_info().await?;
        if info.is_emulator {
            log::warn!("Collecting fingerprint on an emulator ({})", info.device_model);
        }
        log::info!(
            "Collecting fingerprint: {} samples on {} {}",
            sample_count,
            info.platform,
            info.device_model
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<SamplerEvent>();
        let sampling = self.sampler.collect(sample_count, tx);
        let forwarding = async {
            let mut last = 0.0_f64;
            while let Some(event) = rx.recv().await {
                let fraction = clamp_fraction(event.progress).max(last);
                last = fraction;
                if let Some(sink) = progress {
                    sink.report(CollectionProgress {
                        operation: event.operation,
                        fraction,
                    });
                }
            }
        };
        let (report, ()) = futures::join!(sampling, forwarding);
        let report = report?;

        if report.stable_ratios.len() != RATIO_COUNT {
            return Err(TrustError::Precondition(format!(
                "sampler returned {} ratios, expected {}",
                report.stable_ratios.len(),
                RATIO_COUNT
            )));
        }
        let stable_ratios = canonicalize(&report.stable_ratios);
        let fingerprint = DeviceFingerprint {
            id: uuid::Uuid::new_v4().to_string(),
            phase: report.phase,
            platform: info.platform,
            platform_version: info.platform_version,
            device_model: info.device_model,
            sample_count: report.sample_count,
            timestamp: chrono::Utc::now(),
            fingerprint_hash: fingerprint_hash(&stable_ratios),
            stable_ratios,
        };

        if let Some(sink) = progress {
            sink.report(CollectionProgress {
                operation: COMPLETE_OPERATION.to_string(),
                fraction: 1.0,
            });
        }
        log::info!(
            "Fingerprint {} collected, hash {}",
            fingerprint.id,
            &fingerprint.fingerprint_hash[..16]
        );
        Ok(fingerprint)
    }

    pub fn compare(&self, a: &DeviceFingerprint, b: &DeviceFingerprint) -> f64 {
        compare(a, b)
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn canonicalize(raw: &[f64]) -> Vec<f64> {
    raw.iter().copied().map(canonical_ratio).collect()
}

/// Similarity of two fingerprints in [0, 1]
pub fn compare(a: &DeviceFingerprint, b: &DeviceFingerprint) -> f64 {
    compare_ratios(&a.stable_ratios, &b.stable_ratios)
}

/// `1 - mean relative difference`, floored at 0.
///
/// Pairs where both ratios are zero carry no signal and are left out of
/// the mean. Vectors of different length are incomparable and score 0.
pub fn compare_ratios(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut counted = 0usize;
    for (&ra, &rb) in a.iter().zip(b) {
        if ra == 0.0 && rb == 0.0 {
            continue;
        }
        // Halve first so two huge ratios don't overflow
        let mean = ra / 2.0 + rb / 2.0;
        let diff = if mean == 0.0 {
            MAX_RELATIVE_DIFF
        } else {
            ((ra - rb) / mean).abs()
        };
        total += diff;
        counted += 1;
    }

    if counted == 0 {
        return 1.0;
    }
    (1.0 - total / counted as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::sampler::{SamplerReport, SimulatedSampler};
    use crate::fingerprint::types::DeviceInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::{mpsc::UnboundedSender, Notify};

    fn fp(ratios: Vec<f64>) -> DeviceFingerprint {
        DeviceFingerprint {
            id: "t".into(),
            phase: 1,
            platform: "test".into(),
            platform_version: "1".into(),
            device_model: "m".into(),
            sample_count: 1,
            timestamp: chrono::Utc::now(),
            fingerprint_hash: fingerprint_hash(&ratios),
            stable_ratios: ratios,
        }
    }

    #[test]
    fn test_compare_self_is_one() {
        let a = fp((1..=16).map(|i| i as f64 * 0.25).collect());
        assert_eq!(compare(&a, &a), 1.0);
    }

    #[test]
    fn test_compare_symmetric() {
        let a = fp((1..=16).map(|i| i as f64).collect());
        let b = fp((1..=16).map(|i| i as f64 * 1.1 + 0.3).collect());
        assert_eq!(compare(&a, &b), compare(&b, &a));
        let s = compare(&a, &b);
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_compare_one_ratio_differs() {
        let a = fp(vec![1.0; 16]);
        let mut rb = vec![1.0; 15];
        rb.push(2.0);
        let b = fp(rb);
        let s = compare(&a, &b);
        assert!((s - 0.9583).abs() < 1e-3, "similarity {}", s);
    }

    #[test]
    fn test_compare_length_mismatch() {
        let a = fp(vec![1.0; 16]);
        let b = fp(vec![1.0; 15]);
        assert_eq!(compare(&a, &b), 0.0);
    }

    #[test]
    fn test_compare_zero_pairs_skipped() {
        assert_eq!(compare_ratios(&[0.0, 0.0], &[0.0, 0.0]), 1.0);
        assert_eq!(compare_ratios(&[0.0, 2.0], &[0.0, 2.0]), 1.0);
        // One side zero: mean is non-zero, diff is 2
        assert_eq!(compare_ratios(&[0.0], &[3.0]), 0.0);
    }

    #[test]
    fn test_compare_floors_at_zero() {
        let a = vec![1.0, 100.0];
        let b = vec![100.0, 1.0];
        assert_eq!(compare_ratios(&a, &b), 0.0);
    }

    #[test]
    fn test_compare_huge_ratios() {
        let a = [f64::MAX, 1.0];
        assert_eq!(compare_ratios(&a, &a), 1.0);
        let s = compare_ratios(&[f64::MAX, 1.0], &[f64::MAX / 2.0, 1.0]);
        assert!(s > 0.0 && s < 1.0, "similarity {}", s);
    }

    #[test]
    fn test_canonicalize() {
        let out = canonicalize(&[f64::NAN, -2.0, 0.1234567, 3.0]);
        assert_eq!(out, vec![0.0, 0.0, 0.123457, 3.0]);
    }

    #[tokio::test]
    async fn test_collect_produces_canonical_fingerprint() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("Pixel 8")));
        let fp = engine.collect(50, None).await.unwrap();
        assert_eq!(fp.stable_ratios.len(), RATIO_COUNT);
        assert!(fp.hash_is_consistent());
        assert_eq!(fp.sample_count, 50);
        assert_eq!(fp.device_model, "Pixel 8");
        assert!(fp
            .stable_ratios
            .iter()
            .all(|r| *r == canonical_ratio(*r)));
        assert!(!engine.is_collecting());
    }

    #[tokio::test]
    async fn test_same_device_scores_higher_than_other_device() {
        let a = FingerprintEngine::new(Arc::new(SimulatedSampler::new("Pixel 8")));
        let b = FingerprintEngine::new(Arc::new(SimulatedSampler::new("Galaxy S23")));
        let first = a.collect(500, None).await.unwrap();
        let again = a.collect(500, None).await.unwrap();
        let other = b.collect(500, None).await.unwrap();
        assert!(compare(&first, &again) > 0.95);
        assert!(compare(&first, &again) > compare(&first, &other));
    }

    #[tokio::test]
    async fn test_zero_sample_count_rejected() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("x")));
        let err = engine.collect(0, None).await.unwrap_err();
        assert!(matches!(err, TrustError::Precondition(_)));
        assert!(!engine.is_collecting());
    }

    #[tokio::test]
    async fn test_unsupported_device() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("x").unsupported()));
        assert!(!engine.is_supported().await);
        let err = engine.collect(10, None).await.unwrap_err();
        assert!(matches!(err, TrustError::Unsupported(_)));
        assert!(!engine.is_collecting());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_one() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("x")));
        let seen = Mutex::new(Vec::new());
        let sink = |p: CollectionProgress| seen.lock().unwrap().push(p);
        engine.collect(10, Some(&sink)).await.unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), RATIO_COUNT + 1);
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(&p.fraction)));
        assert!(seen.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        let last = seen.last().unwrap();
        assert_eq!(last.fraction, 1.0);
        assert_eq!(last.operation, COMPLETE_OPERATION);
    }

    #[tokio::test]
    async fn test_progress_over_channel() {
        let engine = FingerprintEngine::new(Arc::new(SimulatedSampler::new("x")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.collect(5, Some(&tx)).await.unwrap();
        drop(tx);
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, RATIO_COUNT + 1);
    }

    /// Reports out-of-range and backwards progress, then blocks until released
    struct UnrulySampler {
        release: Notify,
        started: Notify,
    }

    #[async_trait]
    impl FingerprintSampler for UnrulySampler {
        async fn is_supported(&self) -> bool {
            true
        }

        async fn device_info(&self) -> TrustResult<DeviceInfo> {
            Ok(DeviceInfo {
                platform: "test".into(),
                platform_version: "1".into(),
                device_model: "unruly".into(),
                device_name: "unruly".into(),
                is_emulator: false,
            })
        }

        async fn collect(
            &self,
            sample_count: u32,
            events: UnboundedSender<SamplerEvent>,
        ) -> TrustResult<SamplerReport> {
            for p in [-0.5, 0.6, 0.4, 7.0] {
                let _ = events.send(SamplerEvent {
                    operation: "step".into(),
                    progress: p,
                });
            }
            self.started.notify_one();
            self.release.notified().await;
            Ok(SamplerReport {
                phase: 1,
                sample_count,
                stable_ratios: vec![1.0; RATIO_COUNT],
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_collect_rejected() {
        let sampler = Arc::new(UnrulySampler {
            release: Notify::new(),
            started: Notify::new(),
        });
        let engine = Arc::new(FingerprintEngine::new(sampler.clone()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.collect(3, None).await })
        };
        sampler.started.notified().await;
        assert!(engine.is_collecting());

        let err = engine.collect(3, None).await.unwrap_err();
        assert!(matches!(err, TrustError::Precondition(_)));

        sampler.release.notify_one();
        let fp = first.await.unwrap().unwrap();
        assert_eq!(fp.stable_ratios, vec![1.0; RATIO_COUNT]);
        assert!(!engine.is_collecting());
    }

    /// Reports one ratio far beyond the quantization grid
    struct OversizedSampler;

    #[async_trait]
    impl FingerprintSampler for OversizedSampler {
        async fn is_supported(&self) -> bool {
            true
        }

        async fn device_info(&self) -> TrustResult<DeviceInfo> {
            Ok(DeviceInfo {
                platform: "test".into(),
                platform_version: "1".into(),
                device_model: "oversized".into(),
                device_name: "oversized".into(),
                is_emulator: false,
            })
        }

        async fn collect(
            &self,
            sample_count: u32,
            _events: UnboundedSender<SamplerEvent>,
        ) -> TrustResult<SamplerReport> {
            let mut stable_ratios = vec![1.5; RATIO_COUNT];
            stable_ratios[3] = 1e303;
            Ok(SamplerReport {
                phase: 1,
                sample_count,
                stable_ratios,
            })
        }
    }

    #[tokio::test]
    async fn test_oversized_ratio_survives_collection() {
        let engine = FingerprintEngine::new(Arc::new(OversizedSampler));
        let fp = engine.collect(4, None).await.unwrap();
        assert_eq!(fp.stable_ratios[3], 1e303);
        assert!(fp.stable_ratios.iter().all(|r| r.is_finite()));
        assert!(fp.hash_is_consistent());
        assert_eq!(engine.compare(&fp, &fp), 1.0);

        let record = crate::fingerprint::to_lattice_record(&fp, None).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        assert!(!text.contains("null"));
        let back: crate::fingerprint::LatticeRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn test_unruly_progress_is_clamped() {
        let sampler = Arc::new(UnrulySampler {
            release: Notify::new(),
            started: Notify::new(),
        });
        // Permit stored before collection starts
        sampler.release.notify_one();
        let engine = FingerprintEngine::new(sampler);
        let seen = Mutex::new(Vec::new());
        let sink = |p: CollectionProgress| seen.lock().unwrap().push(p.fraction);
        engine.collect(3, Some(&sink)).await.unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![0.0, 0.6, 0.6, 1.0, 1.0]);
    }
}
