//! Replay protection — fresh nonce and monotonic timestamp per signed payload
//!
//! Each governance signature covers a `(timestamp, nonce)` pair so that an
//! identical logical request never yields an identical payload. The guard
//! remembers the last `window` nonces it issued and regenerates on the
//! (astronomically unlikely) collision, so a nonce is never handed out twice
//! within the window.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 16;

/// Timestamp + nonce attached to one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStamp {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Hex-encoded `NONCE_LEN` random bytes
    pub nonce: String,
}

struct RecentNonces {
    order: VecDeque<[u8; NONCE_LEN]>,
    seen: HashSet<[u8; NONCE_LEN]>,
}

pub struct ReplayGuard {
    last_timestamp: AtomicI64,
    window: usize,
    recent: Mutex<RecentNonces>,
}

impl ReplayGuard {
    pub fn new(window: usize) -> Self {
        Self {
            last_timestamp: AtomicI64::new(0),
            window: window.max(1),
            recent: Mutex::new(RecentNonces {
                order: VecDeque::new(),
                seen: HashSet::new(),
            }),
        }
    }

    /// Issue a stamp for one payload
    pub fn next_stamp(&self) -> ReplayStamp {
        let timestamp = self.next_timestamp();
        let nonce = self.fresh_nonce();
        ReplayStamp {
            timestamp,
            nonce: hex::encode(nonce),
        }
    }

    /// Whether `nonce_hex` was issued by this guard and is still retained
    pub fn was_issued(&self, nonce_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(nonce_hex) else {
            return false;
        };
        let Ok(nonce) = <[u8; NONCE_LEN]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        recent.seen.contains(&nonce)
    }

    /// Wall-clock millis, never lower than a previously issued value
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    fn fresh_nonce(&self) -> [u8; NONCE_LEN] {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            if recent.seen.insert(nonce) {
                recent.order.push_back(nonce);
                while recent.order.len() > self.window {
                    if let Some(evicted) = recent.order.pop_front() {
                        recent.seen.remove(&evicted);
                    }
                }
                return nonce;
            }
            log::error!("Nonce collision detected, regenerating");
        }
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonces_are_unique_and_sized() {
        let guard = ReplayGuard::new(64);
        let a = guard.next_stamp();
        let b = guard.next_stamp();
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.nonce.len(), NONCE_LEN * 2);
        assert!(guard.was_issued(&a.nonce));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let guard = ReplayGuard::default();
        let mut last = 0;
        for _ in 0..100 {
            let stamp = guard.next_stamp();
            assert!(stamp.timestamp >= last);
            last = stamp.timestamp;
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let guard = ReplayGuard::new(2);
        let first = guard.next_stamp();
        guard.next_stamp();
        guard.next_stamp();
        assert!(!guard.was_issued(&first.nonce));
    }

    #[test]
    fn test_was_issued_rejects_garbage() {
        let guard = ReplayGuard::new(4);
        assert!(!guard.was_issued("zz"));
        assert!(!guard.was_issued("abcd"));
    }
}
